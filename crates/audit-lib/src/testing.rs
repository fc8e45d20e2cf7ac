//! In-memory cluster and dialers for tests

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use kube::core::ErrorResponse;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::cluster::ClusterApi;
use crate::enumerator::Gateway;
use crate::error::{Error, Result};
use crate::kinds::ResourceKind;
use crate::tunnel::{EdgePodReference, PortDialer, Upstream};

#[derive(Default)]
pub struct MockCluster {
    namespaces: Vec<String>,
    services: HashMap<String, usize>,
    pods: HashMap<String, usize>,
    custom: HashMap<(ResourceKind, String), usize>,
    gateways: HashMap<String, Vec<Gateway>>,
    labeled_pods: HashMap<(String, String), Vec<String>>,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    dialer: Option<Arc<dyn PortDialer>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.namespaces = namespaces.iter().map(|ns| ns.to_string()).collect();
        self
    }

    pub fn with_services(mut self, namespace: &str, count: usize) -> Self {
        self.services.insert(namespace.to_string(), count);
        self
    }

    pub fn with_pods(mut self, namespace: &str, count: usize) -> Self {
        self.pods.insert(namespace.to_string(), count);
        self
    }

    pub fn with_custom(mut self, kind: ResourceKind, namespace: &str, count: usize) -> Self {
        self.custom.insert((kind, namespace.to_string()), count);
        self
    }

    pub fn with_gateway(mut self, namespace: &str, spec: serde_json::Value) -> Self {
        let gateways = self.gateways.entry(namespace.to_string()).or_default();
        gateways.push(Gateway {
            name: format!("gateway-{}", gateways.len()),
            spec: serde_json::from_value(spec).expect("valid gateway spec"),
        });
        self
    }

    pub fn with_labeled_pods(mut self, namespace: &str, selector: &str, names: &[&str]) -> Self {
        self.labeled_pods.insert(
            (namespace.to_string(), selector.to_string()),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn PortDialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    /// Every list call in `namespace` fails with a 403
    pub fn failing_namespace(mut self, namespace: &str) -> Self {
        self.failing.insert(namespace.to_string());
        self
    }

    /// Every list call in `namespace` never completes
    pub fn stalled_namespace(mut self, namespace: &str) -> Self {
        self.stalled.insert(namespace.to_string());
        self
    }

    async fn check(&self, namespace: &str) -> Result<()> {
        if self.stalled.contains(namespace) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(namespace) {
            return Err(Error::Kube(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: format!("access to namespace {namespace} is forbidden"),
                reason: "Forbidden".to_string(),
                code: 403,
            })));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.clone())
    }

    async fn count_services(&self, namespace: &str) -> Result<usize> {
        self.check(namespace).await?;
        Ok(self.services.get(namespace).copied().unwrap_or(0))
    }

    async fn count_pods(&self, namespace: &str) -> Result<usize> {
        self.check(namespace).await?;
        Ok(self.pods.get(namespace).copied().unwrap_or(0))
    }

    async fn count_custom(&self, kind: ResourceKind, namespace: &str) -> Result<usize> {
        self.check(namespace).await?;
        Ok(self
            .custom
            .get(&(kind, namespace.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn list_gateways(&self, namespace: &str) -> Result<Vec<Gateway>> {
        self.check(namespace).await?;
        Ok(self.gateways.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_pod_names(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        self.check(namespace).await?;
        Ok(self
            .labeled_pods
            .get(&(namespace.to_string(), selector.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn port_dialer(&self, _pod: &EdgePodReference, _port: u16) -> Arc<dyn PortDialer> {
        self.dialer
            .clone()
            .unwrap_or_else(|| Arc::new(FailingDialer))
    }
}

/// Dials a plain TCP address and counts streams that are still alive
#[derive(Clone, Default)]
pub struct TcpDialer {
    target: String,
    pub live: Arc<AtomicUsize>,
    pub dials: Arc<AtomicUsize>,
}

impl TcpDialer {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortDialer for TcpDialer {
    async fn dial(&self) -> Result<Upstream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let inner = TcpStream::connect(&self.target)
            .await
            .map_err(|e| Error::Transport(format!("connect {}: {e}", self.target)))?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Upstream::new(CountedStream {
            inner,
            live: self.live.clone(),
        }))
    }
}

/// Dialer whose upgrade is always rejected
pub struct FailingDialer;

#[async_trait]
impl PortDialer for FailingDialer {
    async fn dial(&self) -> Result<Upstream> {
        Err(Error::Transport("upgrade rejected".to_string()))
    }
}

/// Dialer that never completes
pub struct StalledDialer;

#[async_trait]
impl PortDialer for StalledDialer {
    async fn dial(&self) -> Result<Upstream> {
        std::future::pending().await
    }
}

/// Dialer that connects once and never completes afterwards
#[derive(Clone)]
pub struct StallAfterFirstDialer {
    pub inner: TcpDialer,
}

impl StallAfterFirstDialer {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            inner: TcpDialer::new(target),
        }
    }
}

#[async_trait]
impl PortDialer for StallAfterFirstDialer {
    async fn dial(&self) -> Result<Upstream> {
        if self.inner.dial_count() == 0 {
            return self.inner.dial().await;
        }
        self.inner.dials.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

struct CountedStream {
    inner: TcpStream,
    live: Arc<AtomicUsize>,
}

impl Drop for CountedStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncRead for CountedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for CountedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
