//! Edge pod metrics retrieval over a port-forward tunnel
//!
//! The sequence is: locate the edge pod, open the tunnel, wait for it to be
//! ready, fetch the metrics once and close the tunnel. The tunnel is closed
//! on every path out of the fetch, and closing waits for the forwarding
//! task to exit.

mod forward;
mod session;


pub use forward::{ForwardStream, PortDialer, Upstream};
pub use session::{Tunnel, TunnelState};

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::config::{AuditConfig, EdgePodSelection};
use crate::error::{within, Error, Result};

/// Tunnel settings
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Local port to listen on (0 picks a free port)
    pub local_port: u16,
    /// Pod port to forward to
    pub remote_port: u16,
    pub metrics_path: String,
    pub ready_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl From<&AuditConfig> for TunnelConfig {
    fn from(config: &AuditConfig) -> Self {
        Self {
            local_port: config.local_port,
            remote_port: config.remote_port,
            metrics_path: config.metrics_path.clone(),
            ready_timeout: config.ready_timeout(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// The pod serving the control-plane metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePodReference {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for EdgePodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Raw body of the metrics response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot(Vec<u8>);

impl MetricsSnapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Find the pod matching the edge selector
pub async fn find_edge_pod(
    cluster: &dyn ClusterApi,
    config: &AuditConfig,
) -> Result<EdgePodReference> {
    let names = within(
        "edge pod lookup",
        config.api_timeout(),
        cluster.list_pod_names(&config.edge_namespace, &config.edge_selector),
    )
    .await?;

    let matches = names.len();
    let chosen = match config.edge_pod_selection {
        EdgePodSelection::FirstListed => names.into_iter().next(),
        EdgePodSelection::ByName => names.into_iter().min(),
    };
    let name = chosen.ok_or_else(|| {
        Error::NotFound(format!(
            "no pod matching {} in namespace {}",
            config.edge_selector, config.edge_namespace
        ))
    })?;

    if matches > 1 {
        warn!(
            matches,
            selected = %name,
            selection = ?config.edge_pod_selection,
            "Multiple edge pods matched"
        );
    }

    Ok(EdgePodReference {
        namespace: config.edge_namespace.clone(),
        name,
    })
}

/// Open a tunnel to `pod`, fetch the metrics once and close the tunnel
pub async fn fetch_metrics(
    cluster: &dyn ClusterApi,
    pod: &EdgePodReference,
    config: &TunnelConfig,
) -> Result<MetricsSnapshot> {
    let dialer = cluster.port_dialer(pod, config.remote_port);
    let tunnel = Tunnel::open(dialer, config).await?;
    info!(
        pod = %pod,
        local_addr = %tunnel.local_addr(),
        remote_port = config.remote_port,
        "Tunnel to edge pod ready"
    );

    let fetched = tunnel.fetch().await;
    let closed = tunnel.close().await;

    match (fetched, closed) {
        (Ok(snapshot), Ok(())) => Ok(snapshot),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "Tunnel close failed after fetch error");
            }
            Err(e)
        }
    }
}
