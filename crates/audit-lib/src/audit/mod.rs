//! The audit run
//!
//! Namespaces are tallied one at a time, then the multicluster service
//! entries are counted and finally the edge metrics are fetched. Each line
//! is written as soon as it is known; the first error ends the run.

#[cfg(test)]
mod tests;

use std::io::Write;
use std::time::Instant;

use tracing::warn;

use crate::cluster::ClusterApi;
use crate::config::AuditConfig;
use crate::enumerator::Enumerator;
use crate::error::Result;
use crate::observability::AuditLogger;
use crate::report::ReportSink;
use crate::tunnel::{self, TunnelConfig, TunnelState};

/// What a completed run wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    pub namespaces: usize,
    pub multicluster_service_entries: usize,
    pub metrics_bytes: usize,
}

/// Run the full audit against `cluster`, writing the report to `sink`
pub async fn run_audit<W: Write>(
    cluster: &dyn ClusterApi,
    config: &AuditConfig,
    sink: &mut ReportSink<W>,
    logger: &AuditLogger,
) -> Result<AuditSummary> {
    let started = Instant::now();
    logger.log_start(sink.destination());

    let enumerator = Enumerator::new(cluster, config);
    let namespaces = enumerator.list_namespaces().await?;

    for namespace in &namespaces {
        let tally = enumerator.count_resources(namespace).await?;
        logger.log_namespace(&tally);
        sink.write_line(&tally)?;
    }

    let multicluster_service_entries = enumerator.count_multicluster_service_entries().await?;
    logger.log_multicluster(&config.multicluster_namespace, multicluster_service_entries);
    sink.write_line(format_args!(
        "{multicluster_service_entries} multicluster service entries"
    ))?;

    let pod = tunnel::find_edge_pod(cluster, config).await?;
    logger.log_tunnel_state(&pod, TunnelState::Establishing);

    let snapshot = match tunnel::fetch_metrics(cluster, &pod, &TunnelConfig::from(config)).await {
        Ok(snapshot) => {
            logger.log_tunnel_state(&pod, TunnelState::Closed);
            snapshot
        }
        Err(e) => {
            logger.log_tunnel_state(&pod, TunnelState::Failed);
            return Err(e);
        }
    };
    logger.log_metrics_fetched(&pod, snapshot.len());
    if snapshot.is_empty() {
        warn!(pod = %pod, "Edge metrics endpoint returned an empty body");
    }
    sink.write_bytes(snapshot.as_bytes())?;
    sink.flush()?;

    logger.log_complete(namespaces.len(), started.elapsed().as_millis() as u64);

    Ok(AuditSummary {
        namespaces: namespaces.len(),
        multicluster_service_entries,
        metrics_bytes: snapshot.len(),
    })
}
