//! Tunnel lifecycle: open, fetch, close

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::forward::{forward_loop, PortDialer};
use super::{MetricsSnapshot, TunnelConfig};
use crate::error::{Error, Result};

/// Lifecycle state of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Idle,
    Establishing,
    Ready,
    Failed,
    Closed,
}

/// A live local-port-to-pod-port binding served by one background task
pub struct Tunnel {
    state: TunnelState,
    local_addr: SocketAddr,
    config: TunnelConfig,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Tunnel {
    /// Spawn the forwarding task and wait until it reports ready.
    ///
    /// On failure the task has already been joined when the error is returned.
    pub async fn open(dialer: Arc<dyn PortDialer>, config: &TunnelConfig) -> Result<Tunnel> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let bind = SocketAddr::from((Ipv4Addr::LOCALHOST, config.local_port));

        debug!(state = ?TunnelState::Establishing, %bind, "Opening tunnel");
        let task = tokio::spawn(forward_loop(bind, dialer, ready_tx, stop_rx));

        match tokio::time::timeout(config.ready_timeout, ready_rx).await {
            Ok(Ok(local_addr)) => {
                debug!(state = ?TunnelState::Ready, %local_addr, "Tunnel ready");
                Ok(Tunnel {
                    state: TunnelState::Ready,
                    local_addr,
                    config: config.clone(),
                    stop: Some(stop_tx),
                    task: Some(task),
                })
            }
            Ok(Err(_)) => {
                drop(stop_tx);
                let err = match task.await {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => {
                        Error::Transport("forward loop exited before becoming ready".to_string())
                    }
                    Err(e) => Error::Transport(format!("forward loop panicked: {e}")),
                };
                warn!(state = ?TunnelState::Failed, error = %err, "Tunnel failed to establish");
                Err(err)
            }
            Err(_) => {
                drop(stop_tx);
                task.abort();
                let _ = task.await;
                warn!(
                    state = ?TunnelState::Failed,
                    timeout = ?config.ready_timeout,
                    "Tunnel did not become ready"
                );
                Err(Error::Timeout {
                    operation: "tunnel readiness",
                    after: config.ready_timeout,
                })
            }
        }
    }

    /// Current state; a ready tunnel whose task has exited is reported as failed
    pub fn state(&self) -> TunnelState {
        match (&self.state, &self.task) {
            (TunnelState::Ready, Some(task)) if task.is_finished() => TunnelState::Failed,
            (state, _) => *state,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL of the metrics endpoint through the tunnel
    pub fn metrics_url(&self) -> Result<Url> {
        let base = Url::parse(&format!("http://{}", self.local_addr))
            .map_err(|e| Error::Fetch(format!("invalid tunnel address: {e}")))?;
        base.join(&self.config.metrics_path)
            .map_err(|e| Error::Fetch(format!("invalid metrics path: {e}")))
    }

    /// Issue one GET against the metrics endpoint
    pub async fn fetch(&self) -> Result<MetricsSnapshot> {
        let state = self.state();
        if state != TunnelState::Ready {
            return Err(Error::Transport(format!(
                "tunnel is not ready (state {state:?})"
            )));
        }

        let url = self.metrics_url()?;
        let timeout = self.config.fetch_timeout;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| Error::Fetch(format!("failed to create HTTP client: {e}")))?;

        let request_error = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::Timeout {
                    operation: "metrics fetch",
                    after: timeout,
                }
            } else {
                Error::Fetch(format!("GET {url}: {e}"))
            }
        };

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("GET {url} returned {status}")));
        }

        let body = response.bytes().await.map_err(request_error)?;
        info!(%url, bytes = body.len(), "Fetched metrics");
        Ok(MetricsSnapshot::new(body.to_vec()))
    }

    /// Signal stop and wait for the background task to exit.
    ///
    /// The wait is bounded by the ready timeout; a task that outlives it is
    /// aborted.
    pub async fn close(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        let limit = self.config.ready_timeout;
        let result = match self.task.take() {
            Some(mut task) => match tokio::time::timeout(limit, &mut task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(Error::Transport(format!("forward loop panicked: {e}"))),
                Err(_) => {
                    task.abort();
                    warn!(timeout = ?limit, "Forward loop did not stop, aborted");
                    Err(Error::Timeout {
                        operation: "tunnel close",
                        after: limit,
                    })
                }
            },
            None => Ok(()),
        };

        self.state = TunnelState::Closed;
        debug!(state = ?self.state, local_addr = %self.local_addr, "Tunnel closed");
        result
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
