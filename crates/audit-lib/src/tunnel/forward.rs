//! Background forwarding loop
//!
//! Accepts local TCP connections and pipes each one through an upstream
//! stream produced by a [`PortDialer`] until the stop signal fires.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::Portforwarder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Byte stream to the remote pod port
pub trait ForwardStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ForwardStream for T {}

/// One upstream connection, optionally owning the port-forward that carries it
pub struct Upstream {
    stream: Box<dyn ForwardStream>,
    forwarder: Option<Portforwarder>,
}

impl Upstream {
    pub fn new(stream: impl ForwardStream + 'static) -> Self {
        Self {
            stream: Box::new(stream),
            forwarder: None,
        }
    }

    pub fn forwarded(stream: impl ForwardStream + 'static, forwarder: Portforwarder) -> Self {
        Self {
            stream: Box::new(stream),
            forwarder: Some(forwarder),
        }
    }

    /// Close the stream and wait for the port-forward to wind down.
    ///
    /// Dropping the returned future detaches the port-forward task, which
    /// ends on its own once the websocket closes.
    async fn finish(self) -> Result<()> {
        let Upstream { stream, forwarder } = self;
        drop(stream);
        if let Some(forwarder) = forwarder {
            forwarder
                .join()
                .await
                .map_err(|e| Error::Transport(format!("port-forward ended with error: {e}")))?;
        }
        Ok(())
    }

    /// Tear the port-forward down without waiting for the remote side
    fn abandon(self) {
        if let Some(forwarder) = &self.forwarder {
            forwarder.abort();
        }
    }
}

/// Opens upstream streams to the tunnel target
#[async_trait]
pub trait PortDialer: Send + Sync {
    async fn dial(&self) -> Result<Upstream>;
}

/// Drive the tunnel until `stop` fires or dialing fails.
///
/// The first upstream is dialed before readiness is reported so that a
/// tunnel that never reaches the pod never reports ready.
pub(crate) async fn forward_loop(
    bind: SocketAddr,
    dialer: Arc<dyn PortDialer>,
    ready: oneshot::Sender<SocketAddr>,
    mut stop: oneshot::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let local_addr = listener.local_addr()?;
    let mut pending = Some(dialer.dial().await?);

    if ready.send(local_addr).is_err() {
        debug!("Tunnel opener went away before readiness");
        if let Some(upstream) = pending.take() {
            upstream.abandon();
        }
        return Ok(());
    }
    debug!(%local_addr, "Forward loop ready");

    loop {
        let (mut conn, peer) = tokio::select! {
            _ = &mut stop => break,
            accepted = listener.accept() => accepted?,
        };

        let mut upstream = match pending.take() {
            Some(upstream) => upstream,
            None => tokio::select! {
                _ = &mut stop => break,
                dialed = dialer.dial() => dialed?,
            },
        };
        debug!(%peer, "Forwarding connection");

        let copied = tokio::select! {
            _ = &mut stop => None,
            copied = tokio::io::copy_bidirectional(&mut conn, &mut upstream.stream) => Some(copied),
        };

        match copied {
            None => {
                upstream.abandon();
                break;
            }
            Some(Ok((sent, received))) => {
                debug!(%peer, sent, received, "Forwarded connection closed");
                let stopped = tokio::select! {
                    _ = &mut stop => true,
                    finished = upstream.finish() => {
                        finished?;
                        false
                    }
                };
                if stopped {
                    break;
                }
            }
            Some(Err(e)) => {
                warn!(%peer, error = %e, "Forwarded connection failed");
                upstream.abandon();
            }
        }
    }

    if let Some(upstream) = pending {
        upstream.abandon();
    }
    debug!(%local_addr, "Forward loop stopped");
    Ok(())
}
