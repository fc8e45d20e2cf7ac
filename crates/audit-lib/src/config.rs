//! Audit configuration
//!
//! Values are layered from built-in defaults, an optional TOML file and
//! `MESH_AUDIT_*` environment variables. The binary applies command line
//! overrides on top of the loaded value.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// How gateway hostnames are counted within a namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostnameCounting {
    /// The last server not on the cross-cluster port sets the count
    #[default]
    LastServer,
    /// Hosts of every server not on the cross-cluster port are summed
    Sum,
}

/// Tie-break when more than one pod matches the edge selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgePodSelection {
    /// First pod in the order the API server returned them
    #[default]
    FirstListed,
    /// Lexicographically smallest pod name
    ByName,
}

/// Audit configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Namespaces skipped in addition to the built-in system namespaces
    #[serde(default)]
    pub extra_excluded_namespaces: Vec<String>,

    /// Namespace holding the multicluster service entries
    #[serde(default = "default_multicluster_namespace")]
    pub multicluster_namespace: String,

    /// Namespace of the edge pod
    #[serde(default = "default_edge_namespace")]
    pub edge_namespace: String,

    /// Label selector of the edge pod
    #[serde(default = "default_edge_selector")]
    pub edge_selector: String,

    /// Local port the tunnel listens on (0 picks a free port)
    #[serde(default = "default_port")]
    pub local_port: u16,

    /// Pod port the tunnel forwards to
    #[serde(default = "default_port")]
    pub remote_port: u16,

    /// HTTP path of the metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Timeout for each Kubernetes API call in seconds
    #[serde(default = "default_timeout_secs")]
    pub api_timeout_secs: u64,

    /// Timeout for the tunnel to become ready in seconds
    #[serde(default = "default_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Timeout for the metrics request in seconds
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default)]
    pub hostname_counting: HostnameCounting,

    #[serde(default)]
    pub edge_pod_selection: EdgePodSelection,
}

fn default_multicluster_namespace() -> String {
    "xcp-multicluster".to_string()
}

fn default_edge_namespace() -> String {
    "istio-system".to_string()
}

fn default_edge_selector() -> String {
    "app=edge".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            extra_excluded_namespaces: Vec::new(),
            multicluster_namespace: default_multicluster_namespace(),
            edge_namespace: default_edge_namespace(),
            edge_selector: default_edge_selector(),
            local_port: default_port(),
            remote_port: default_port(),
            metrics_path: default_metrics_path(),
            api_timeout_secs: default_timeout_secs(),
            ready_timeout_secs: default_timeout_secs(),
            fetch_timeout_secs: default_timeout_secs(),
            hostname_counting: HostnameCounting::default(),
            edge_pod_selection: EdgePodSelection::default(),
        }
    }
}

impl AuditConfig {
    /// Load configuration from an optional file and the environment.
    ///
    /// A missing file is an error only when `required` is set.
    pub fn load(file: Option<&Path>, required: bool) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(required));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("MESH_AUDIT")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("extra_excluded_namespaces"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
