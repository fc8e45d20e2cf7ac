//! Mesh Audit CLI
//!
//! A command-line tool that counts workload and mesh resources per
//! namespace, tallies multicluster service entries and captures the
//! control-plane edge metrics into a flat report.

mod config;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use audit_lib::{
    init_tracing, run_audit, AuditLogger, ClusterConnection, ConnectOptions, KubeCluster,
    ReportSink,
};
use clap::Parser;
use config::{EdgePodSelectionArg, HostnameCountingArg, LogFormatArg, Overrides};
use output::{print_error, print_success, print_warning};

/// Mesh Audit CLI
#[derive(Parser)]
#[command(name = "mesh-audit")]
#[command(author, version, about = "Audit a service-mesh control plane", long_about = None)]
pub struct Cli {
    /// Cluster name; the report is written to <CLUSTER>.txt (stdout if omitted)
    pub cluster: Option<String>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Configuration file (defaults to ~/.config/mesh-audit/config.toml)
    #[arg(long, env = "MESH_AUDIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Additional namespace to skip (repeatable)
    #[arg(long, value_name = "NAMESPACE")]
    pub exclude: Vec<String>,

    /// How gateway hostnames are counted
    #[arg(long, value_enum)]
    pub hostname_counting: Option<HostnameCountingArg>,

    /// Which edge pod to use when several match
    #[arg(long, value_enum)]
    pub edge_pod_selection: Option<EdgePodSelectionArg>,

    /// Local port for the metrics tunnel
    #[arg(long)]
    pub local_port: Option<u16>,

    /// Timeout in seconds for API calls, tunnel readiness and the metrics fetch
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormatArg,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            exclude: self.exclude.clone(),
            hostname_counting: self.hostname_counting,
            edge_pod_selection: self.edge_pod_selection,
            local_port: self.local_port,
            timeout_secs: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format.into());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let audit_config = config::load(cli.config.as_deref(), &cli.overrides())?;

    let options = ConnectOptions {
        kubeconfig: cli.kubeconfig.clone(),
        context: cli.context.clone(),
    };
    let connection = ClusterConnection::connect(&options)
        .await
        .context("error creating the k8s clients")?;
    let cluster = KubeCluster::new(&connection);

    let (mut sink, label) = match &cli.cluster {
        Some(name) => (ReportSink::file(&config::report_path(name)), name.clone()),
        None => {
            print_warning("No cluster name given, writing the report to stdout");
            (ReportSink::stdout(), connection.config().cluster_url.to_string())
        }
    };
    let logger = AuditLogger::new(label);

    let summary = tokio::select! {
        result = run_audit(&cluster, &audit_config, &mut sink, &logger) => {
            result.context("error auditing the cluster")?
        }
        _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
    };

    if cli.cluster.is_some() {
        print_success(&format!(
            "Report written to {} ({} namespaces, {} multicluster service entries, {} bytes \
             of metrics)",
            sink.destination(),
            summary.namespaces,
            summary.multicluster_service_entries,
            summary.metrics_bytes
        ));
    }

    Ok(())
}
