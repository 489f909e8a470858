//! Reconciliation loop for ZookeeperCluster.
//!
//! This module contains the main reconcile function: it defaults the spec,
//! handles the rolling-restart trigger, then runs the fixed stage pipeline
//! and persists whatever status the stages produced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use jiff::tz::TimeZone;
use kube::{ResourceExt, runtime::controller::Action};
use tracing::{debug, error, info, warn};

use crate::controller::cluster_status::reconcile_cluster_status;
use crate::controller::context::Context;
use crate::controller::error::Error;
use crate::controller::stages::{
    reconcile_admin_server_service, reconcile_client_service, reconcile_config_map,
    reconcile_headless_service, reconcile_pod_disruption_budget, reconcile_statefulset,
};
use crate::controller::storage::{StageOutcome, StorageLifecycle};
use crate::controller::validation::validate_spec;
use crate::controller::{persist_cluster, persist_status};
use crate::crd::ZookeeperCluster;
use crate::resources::statefulset::RESTART_TIME_ANNOTATION;

/// Requeue interval after a successful cycle
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Layout of the restart annotation (Go's RFC 850 layout).
const RESTART_TIME_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S %Z";

/// Render `now` for the restart annotation, in UTC.
pub fn restart_timestamp(now: Timestamp) -> String {
    now.to_zoned(TimeZone::UTC)
        .strftime(RESTART_TIME_FORMAT)
        .to_string()
}

/// Consume a pending rolling-restart request. Returns true if one was pending.
pub fn apply_restart_trigger(cluster: &mut ZookeeperCluster, now: Timestamp) -> bool {
    if !cluster.spec.trigger_rolling_restart {
        return false;
    }
    cluster
        .spec
        .pod
        .annotations
        .insert(RESTART_TIME_ANNOTATION.to_string(), restart_timestamp(now));
    cluster.spec.trigger_rolling_restart = false;
    true
}

/// Reconcile a ZookeeperCluster
///
/// This is the main reconciliation function called by the controller.
pub async fn reconcile(obj: Arc<ZookeeperCluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start_time = Instant::now();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    debug!(name = %name, namespace = %namespace, "Reconciling ZookeeperCluster");

    let Some(mut cluster) = ctx.stores.clusters.get(&namespace, &name).await? else {
        debug!(name = %name, "ZookeeperCluster not found (likely deleted)");
        return Ok(Action::await_change());
    };

    let defaulted = cluster.with_defaults();
    let restarted = apply_restart_trigger(&mut cluster, Timestamp::now());
    if defaulted || restarted {
        info!(name = %name, defaulted, restarted, "Updating ZookeeperCluster spec");
        persist_cluster(&mut cluster, &ctx).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    if let Err(e) = validate_spec(&cluster) {
        ctx.publish_warning_event(&cluster, "ValidationFailed", "Validating", Some(e.to_string()))
            .await;
        return Err(e);
    }

    let action = run_pipeline(&mut cluster, &ctx).await?;

    if let Some(ref health_state) = ctx.health_state {
        let status = cluster.status_or_default();
        health_state.metrics.record_reconcile(
            &namespace,
            &name,
            start_time.elapsed().as_secs_f64(),
        );
        health_state.metrics.set_cluster_replicas(
            &namespace,
            &name,
            i64::from(cluster.spec.replicas),
            i64::from(status.ready_replicas),
        );
    }

    Ok(action)
}

/// Run the stage pipeline in order. The first failing stage aborts it.
pub async fn run_pipeline(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<Action, Error> {
    let observed_status = cluster.status.clone();

    let storage = StorageLifecycle::new(ctx.config.disable_finalizer);
    if storage.reconcile(cluster, ctx).await? == StageOutcome::Stop {
        return Ok(Action::await_change());
    }

    reconcile_config_map(cluster, ctx).await?;
    reconcile_statefulset(cluster, ctx).await?;
    reconcile_client_service(cluster, ctx).await?;
    reconcile_headless_service(cluster, ctx).await?;
    reconcile_admin_server_service(cluster, ctx).await?;
    reconcile_pod_disruption_budget(cluster, ctx).await?;
    reconcile_cluster_status(cluster, ctx).await?;

    persist_status(cluster, ctx, observed_status.as_ref()).await?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Error policy for the controller
pub fn error_policy(obj: Arc<ZookeeperCluster>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    // Record error metric
    if let Some(ref health_state) = ctx.health_state {
        health_state.metrics.record_error(&namespace, &name);
    }

    if error.is_not_found() {
        debug!(name = %name, "Resource not found (likely deleted)");
        return Action::await_change();
    }

    if error.is_retryable() {
        warn!(name = %name, error = %error, "Retryable error, will retry");
    } else {
        error!(name = %name, error = %error, "Non-retryable error");
    }
    Action::requeue(error.requeue_after())
}
