//! Configuration management for the CLI

use anyhow::{Context, Result};
use audit_lib::{AuditConfig, EdgePodSelection, HostnameCounting, LogFormat};
use clap::ValueEnum;
use std::path::{Path, PathBuf};

/// Hostname counting mode
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HostnameCountingArg {
    /// Last server outside the cross-cluster port sets the count
    LastServer,
    /// Hosts of all servers outside the cross-cluster port are added
    Sum,
}

impl From<HostnameCountingArg> for HostnameCounting {
    fn from(arg: HostnameCountingArg) -> Self {
        match arg {
            HostnameCountingArg::LastServer => HostnameCounting::LastServer,
            HostnameCountingArg::Sum => HostnameCounting::Sum,
        }
    }
}

/// Edge pod tie-break
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EdgePodSelectionArg {
    /// First pod returned by the API server
    FirstListed,
    /// Lexicographically smallest pod name
    ByName,
}

impl From<EdgePodSelectionArg> for EdgePodSelection {
    fn from(arg: EdgePodSelectionArg) -> Self {
        match arg {
            EdgePodSelectionArg::FirstListed => EdgePodSelection::FirstListed,
            EdgePodSelectionArg::ByName => EdgePodSelection::ByName,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormatArg {
    #[default]
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Command line values that take precedence over the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub exclude: Vec<String>,
    pub hostname_counting: Option<HostnameCountingArg>,
    pub edge_pod_selection: Option<EdgePodSelectionArg>,
    pub local_port: Option<u16>,
    pub timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AuditConfig) {
        config
            .extra_excluded_namespaces
            .extend(self.exclude.iter().cloned());
        if let Some(counting) = self.hostname_counting {
            config.hostname_counting = counting.into();
        }
        if let Some(selection) = self.edge_pod_selection {
            config.edge_pod_selection = selection.into();
        }
        if let Some(port) = self.local_port {
            config.local_port = port;
        }
        if let Some(secs) = self.timeout_secs {
            config.api_timeout_secs = secs;
            config.ready_timeout_secs = secs;
            config.fetch_timeout_secs = secs;
        }
    }
}

/// Load the audit configuration and apply command line overrides
///
/// An explicitly named file must exist; the default one is optional.
pub fn load(override_path: Option<&Path>, overrides: &Overrides) -> Result<AuditConfig> {
    let path = config_path(override_path)?;
    let mut config = AuditConfig::load(Some(&path), override_path.is_some())
        .with_context(|| format!("error loading the configuration from {}", path.display()))?;
    overrides.apply(&mut config);
    Ok(config)
}

/// Get the configuration file path
fn config_path(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("mesh-audit").join("config.toml"))
}

/// Report file for a cluster name
pub fn report_path(cluster: &str) -> PathBuf {
    PathBuf::from(format!("{cluster}.txt"))
}
