//! zookeeper-operator binary.
//!
//! Startup order: flags, logging, Kubernetes client, health server, lease,
//! then the controllers. Only the lease holder reconciles.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use zookeeper_operator::config::{Args, OperatorConfig, version_info};
use zookeeper_operator::health::{HealthState, run_health_server};
use zookeeper_operator::run_controller;

const LEASE_NAME: &str = "zookeeper-operator-lock";
const LEASE_TTL: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to in-flight reconciles after SIGTERM.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    if args.version {
        println!("{}", version_info());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zookeeper_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    let config = OperatorConfig::from_args(&args);
    info!(version = %version_info(), "Starting zookeeper-operator");
    if config.disable_finalizer {
        warn!("Finalizers are disabled: PVCs will not be removed when a cluster is deleted");
    }
    match config.is_cluster_wide() {
        true => info!("Watching all namespaces"),
        false => info!(namespaces = ?config.watch_namespaces, "Watching namespaces"),
    }

    let client = Client::try_default().await?;
    let health_state = Arc::new(HealthState::new());

    // Probes must answer while this replica is still on standby.
    let health_handle = {
        let state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(state, port).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    let lease = lease_lock(&client, &config);
    info!(
        holder_id = %config.pod_name,
        namespace = %config.operator_namespace,
        lease_name = LEASE_NAME,
        "Waiting for leadership"
    );
    acquire_leadership(&lease).await;
    let renewal_handle = spawn_lease_renewal(lease);

    let controller_handle = {
        let state = health_state.clone();
        tokio::spawn(async move {
            run_controller(client, config, Some(state)).await;
        })
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!(error = %e, "Controller task panicked");
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!(error = %e, "Health server task panicked");
            }
        }
        Err(e) = renewal_handle => {
            error!(error = %e, "Lease renewal task panicked");
        }
        _ = shutdown_signal() => {
            info!("Shutdown requested");
            health_state.set_ready(false).await;
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn lease_lock(client: &Client, config: &OperatorConfig) -> LeaseLock {
    LeaseLock::new(
        client.clone(),
        &config.operator_namespace,
        LeaseLockParams {
            holder_id: config.pod_name.clone(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    )
}

/// Block until this replica holds the lease.
async fn acquire_leadership(lease: &LeaseLock) {
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(LeaseLockResult::Acquired(_)) => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another replica holds the lease"),
            Err(e) => warn!(error = %e, "Failed to acquire lease, retrying"),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Renew the lease forever. Losing it exits the process so Kubernetes
/// restarts the pod into a fresh election.
#[allow(clippy::exit)]
fn spawn_lease_renewal(lease: LeaseLock) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
            match lease.try_acquire_or_renew().await {
                Ok(LeaseLockResult::Acquired(_)) => {}
                Ok(_) => {
                    error!("Lost leadership, exiting");
                    std::process::exit(1);
                }
                Err(e) => {
                    error!(error = %e, "Failed to renew lease, exiting");
                    std::process::exit(1);
                }
            }
        }
    })
}

/// Resolves on SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
