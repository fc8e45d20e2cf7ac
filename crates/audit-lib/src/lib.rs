//! Audit library for service-mesh control planes
//!
//! This crate provides the core functionality for:
//! - Loading cluster credentials and building API clients
//! - Counting workload and mesh resources per namespace
//! - Fetching a metrics snapshot from the edge pod through a port-forward tunnel
//! - Writing the flat text report
//! - Logging and configuration

pub mod audit;
pub mod cluster;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod kinds;
pub mod observability;
pub mod report;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{run_audit, AuditSummary};
pub use cluster::{ClusterApi, ClusterConnection, ConnectOptions, KubeCluster};
pub use config::{AuditConfig, EdgePodSelection, HostnameCounting};
pub use enumerator::{Enumerator, NamespaceSelector, ResourceTally};
pub use error::{Error, Result};
pub use kinds::ResourceKind;
pub use observability::{init_tracing, AuditLogger, LogFormat};
pub use report::ReportSink;
pub use tunnel::{EdgePodReference, MetricsSnapshot, Tunnel, TunnelConfig, TunnelState};
