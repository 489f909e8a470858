//! Operator configuration.
//!
//! Built once at startup from command-line flags and the pod environment,
//! then threaded through [`crate::controller::context::Context`].

use std::path::Path;

use clap::Parser;
use tracing::warn;

/// Environment variable listing namespaces to watch (comma separated).
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
/// Fallback for the operator namespace when the service account mount is absent.
pub const POD_NAMESPACE_ENV: &str = "POD_NAMESPACE";
/// Pod name, used as the lease holder identity.
pub const POD_NAME_ENV: &str = "POD_NAME";
/// Namespace file mounted with the service account token.
pub const SERVICE_ACCOUNT_NAMESPACE_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Command-line flags.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "zookeeper-operator", about = "Kubernetes operator for ZooKeeper ensembles")]
pub struct Args {
    /// Print build information and exit
    #[arg(long)]
    pub version: bool,

    /// Do not attach the PVC cleanup finalizer to clusters
    #[arg(long)]
    pub disable_finalizer: bool,

    /// Port for health probes and metrics
    #[arg(long, default_value_t = DEFAULT_HEALTH_PORT)]
    pub health_port: u16,
}

/// Runtime configuration of the operator.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub disable_finalizer: bool,
    /// Namespaces to watch. Empty means cluster-wide.
    pub watch_namespaces: Vec<String>,
    pub operator_namespace: String,
    pub pod_name: String,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            disable_finalizer: false,
            watch_namespaces: Vec::new(),
            operator_namespace: "default".to_string(),
            pod_name: "zookeeper-operator".to_string(),
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl OperatorConfig {
    /// Build the configuration from parsed flags and the process environment.
    pub fn from_args(args: &Args) -> Self {
        Self {
            disable_finalizer: args.disable_finalizer,
            watch_namespaces: parse_watch_namespaces(
                std::env::var(WATCH_NAMESPACE_ENV).ok().as_deref(),
            ),
            operator_namespace: operator_namespace(),
            pod_name: pod_name(),
            health_port: args.health_port,
        }
    }

    /// Whether the operator watches every namespace.
    pub fn is_cluster_wide(&self) -> bool {
        self.watch_namespaces.is_empty()
    }
}

/// Split `WATCH_NAMESPACE` into namespaces. Absent or blank means cluster-wide.
pub fn parse_watch_namespaces(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string)
        .collect()
}

fn operator_namespace() -> String {
    if let Ok(ns) = std::fs::read_to_string(Path::new(SERVICE_ACCOUNT_NAMESPACE_PATH)) {
        let ns = ns.trim();
        if !ns.is_empty() {
            return ns.to_string();
        }
    }
    std::env::var(POD_NAMESPACE_ENV).unwrap_or_else(|_| {
        warn!("Operator namespace not found, using 'default'");
        "default".to_string()
    })
}

fn pod_name() -> String {
    std::env::var(POD_NAME_ENV).unwrap_or_else(|_| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    })
}

/// Build metadata printed by `--version`.
pub fn version_info() -> String {
    format!(
        "{} {} ({}/{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
