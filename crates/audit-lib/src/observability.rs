//! Observability infrastructure for the audit
//!
//! Provides:
//! - Tracing subscriber setup (text or JSON, always on stderr)
//! - Structured events for the audit steps

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::enumerator::ResourceTally;
use crate::tunnel::{EdgePodReference, TunnelState};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` when verbose.
pub fn init_tracing(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

/// Structured logger for audit events
#[derive(Clone)]
pub struct AuditLogger {
    cluster: String,
}

impl AuditLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_start(&self, destination: &str) {
        info!(
            event = "audit_started",
            cluster = %self.cluster,
            destination = %destination,
            "Starting mesh audit"
        );
    }

    pub fn log_namespace(&self, tally: &ResourceTally) {
        info!(
            event = "namespace_tallied",
            cluster = %self.cluster,
            namespace = %tally.namespace,
            services = tally.services,
            pods = tally.pods,
            gateways = tally.gateways,
            gateway_hostnames = tally.gateway_hostnames,
            virtual_services = tally.virtual_services,
            destination_rules = tally.destination_rules,
            service_entries = tally.service_entries,
            tier1_gateways = tally.tier1_gateways,
            ingress_gateways = tally.ingress_gateways,
            "Counted namespace resources"
        );
    }

    pub fn log_multicluster(&self, namespace: &str, service_entries: usize) {
        info!(
            event = "multicluster_counted",
            cluster = %self.cluster,
            namespace = %namespace,
            service_entries,
            "Counted multicluster service entries"
        );
    }

    pub fn log_tunnel_state(&self, pod: &EdgePodReference, state: TunnelState) {
        info!(
            event = "tunnel_state",
            cluster = %self.cluster,
            pod = %pod,
            state = ?state,
            "Tunnel state changed"
        );
    }

    pub fn log_metrics_fetched(&self, pod: &EdgePodReference, bytes: usize) {
        info!(
            event = "metrics_fetched",
            cluster = %self.cluster,
            pod = %pod,
            bytes,
            "Fetched edge metrics"
        );
    }

    pub fn log_complete(&self, namespaces: usize, elapsed_ms: u64) {
        info!(
            event = "audit_complete",
            cluster = %self.cluster,
            namespaces,
            elapsed_ms,
            "Mesh audit complete"
        );
    }
}
