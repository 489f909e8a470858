//! Reconcile stages for owned child objects.
//!
//! Each stage converges one child kind through [`sync_child`] and records
//! what it learned in the in-memory cluster status. The dispatcher persists
//! the status once the pipeline finishes.

use std::cmp::Ordering;

use jiff::Timestamp;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::sync::{sync_child, update_child};
use crate::controller::upgrade_state_machine::{
    RolloutObservation, UpgradeEvent, UpgradeTransition, advance_upgrade,
};
use crate::controller::version::{OWNER_RV_LABEL, compare_resource_version};
use crate::crd::ZookeeperCluster;
use crate::metadata::{cluster_size_payload, metadata_path, service_uri};
use crate::resources::configmap::{generate_configmap, sync_configmap};
use crate::resources::pdb::{generate_pod_disruption_budget, sync_pod_disruption_budget};
use crate::resources::service_account::{
    generate_service_account, needs_service_account, sync_service_account,
};
use crate::resources::services::{
    client_endpoints, generate_admin_server_service, generate_client_service,
    generate_headless_service, sync_service,
};
use crate::resources::statefulset::{generate_statefulset, stamp_owner_rv, sync_statefulset};

pub async fn reconcile_config_map(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let desired = generate_configmap(cluster);
    sync_child(ctx.stores.config_maps.as_ref(), &namespace, &desired, sync_configmap).await?;
    Ok(())
}

async fn reconcile_service_account(cluster: &ZookeeperCluster, ctx: &Context) -> Result<()> {
    if !needs_service_account(cluster) {
        return Ok(());
    }
    let namespace = cluster.namespace().unwrap_or_default();
    let desired = generate_service_account(cluster);
    sync_child(
        ctx.stores.service_accounts.as_ref(),
        &namespace,
        &desired,
        sync_service_account,
    )
    .await?;
    Ok(())
}

/// Converge the StatefulSet and drive the upgrade state machine.
pub async fn reconcile_statefulset(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    let store = ctx.stores.stateful_sets.as_ref();

    if cluster.status_or_default().conditions.is_upgrade_failed() {
        recover_failed_upgrade(cluster, ctx).await?;
        if cluster.status_or_default().conditions.is_upgrade_failed() {
            return Ok(());
        }
    }

    reconcile_service_account(cluster, ctx).await?;

    let mut desired = generate_statefulset(cluster);
    let Some(found) = store.get(&namespace, &name).await? else {
        info!(name = %name, namespace = %namespace, "Creating StatefulSet");
        stamp_owner_rv(&mut desired, cluster);
        store.create(&namespace, &desired).await?;
        return Ok(());
    };

    let rollout = RolloutObservation::from_statefulset(&found);
    update_statefulset(cluster, ctx, found, &desired).await?;

    let status = cluster.status_mut();
    status.replicas = rollout.replicas;
    status.ready_replicas = rollout.ready_replicas;

    run_upgrade(cluster, &rollout, ctx).await;
    Ok(())
}

/// Re-apply the desired StatefulSet while an upgrade is failed and confirm
/// recovery once every member runs the target revision.
async fn recover_failed_upgrade(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    let store = ctx.stores.stateful_sets.as_ref();

    let Some(found) = store.get(&namespace, &name).await? else {
        return Ok(());
    };
    let rollout = RolloutObservation::from_statefulset(&found);
    let desired = generate_statefulset(cluster);
    update_statefulset(cluster, ctx, found, &desired).await?;

    if !rollout.settled() {
        info!(
            name = %name,
            target_version = %cluster.status_or_default().target_version,
            "Unable to recover failed upgrade, make sure all nodes are running the target version"
        );
        return Ok(());
    }
    run_upgrade(cluster, &rollout, ctx).await;
    Ok(())
}

/// Merge `desired` into the live StatefulSet.
///
/// A cluster read older than the one that last wrote the set aborts the
/// cycle. A replica change is announced to the ensemble before the write.
async fn update_statefulset(
    cluster: &ZookeeperCluster,
    ctx: &Context,
    found: StatefulSet,
    desired: &StatefulSet,
) -> Result<()> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();

    let restamp = match compare_resource_version(cluster, &found) {
        Ordering::Less => {
            return Err(Error::Staleness {
                name,
                cluster_rv: cluster.resource_version().unwrap_or_default(),
                owner_rv: found
                    .labels()
                    .get(OWNER_RV_LABEL)
                    .cloned()
                    .unwrap_or_default(),
            });
        }
        Ordering::Greater => true,
        Ordering::Equal => false,
    };

    let found_replicas = found.spec.as_ref().and_then(|s| s.replicas).unwrap_or_default();
    if found_replicas != cluster.spec.replicas {
        notify_cluster_size(cluster, ctx).await?;
    }

    let synced = update_child(
        ctx.stores.stateful_sets.as_ref(),
        &namespace,
        found,
        desired,
        |live, desired| {
            sync_statefulset(live, desired);
            if restamp {
                stamp_owner_rv(live, cluster);
            }
        },
    )
    .await?;
    debug!(name = %name, outcome = ?synced.outcome, "StatefulSet synced");
    Ok(())
}

async fn run_upgrade(cluster: &mut ZookeeperCluster, rollout: &RolloutObservation, ctx: &Context) {
    let tag = cluster.spec.image.tag.clone();
    let transitions = advance_upgrade(cluster.status_mut(), &tag, rollout, Timestamp::now());
    for transition in &transitions {
        report_transition(cluster, transition, ctx).await;
    }
}

async fn report_transition(cluster: &ZookeeperCluster, transition: &UpgradeTransition, ctx: &Context) {
    let name = cluster.name_any();
    let status = cluster.status_or_default();
    info!(
        name = %name,
        from = %transition.from,
        to = %transition.to,
        event = %transition.event,
        current_version = %status.current_version,
        target_version = %status.target_version,
        "Upgrade transition"
    );

    match transition.event {
        UpgradeEvent::RolloutDetected => {
            ctx.publish_normal_event(
                cluster,
                "UpgradeStarted",
                "Upgrading",
                Some(format!(
                    "Upgrading from {} to {}",
                    status.current_version, status.target_version
                )),
            )
            .await;
        }
        UpgradeEvent::RevisionsConverged | UpgradeEvent::RecoveryConfirmed => {
            ctx.publish_normal_event(
                cluster,
                "UpgradeCompleted",
                "Upgrading",
                Some(format!("Running version {}", status.current_version)),
            )
            .await;
        }
        UpgradeEvent::StallTimeout => {
            warn!(name = %name, "Upgrade stalled past the progress deadline");
            if let Some(health) = &ctx.health_state {
                health
                    .metrics
                    .record_upgrade_failed(&cluster.namespace().unwrap_or_default(), &name);
            }
            ctx.publish_warning_event(
                cluster,
                "UpgradeFailed",
                "Upgrading",
                Some(format!(
                    "Upgrade to {} made no progress within the deadline",
                    status.target_version
                )),
            )
            .await;
        }
        _ => {}
    }
}

/// Tell the ensemble its new size before the StatefulSet changes.
/// Connection and lookup failures abort the cycle; a failed write does not.
async fn notify_cluster_size(cluster: &ZookeeperCluster, ctx: &Context) -> Result<()> {
    let name = cluster.name_any();
    let uri = service_uri(cluster);
    let path = metadata_path(&name);
    let payload = cluster_size_payload(cluster.spec.replicas);

    let mut session = ctx.metadata.connect(&uri).await?;
    info!(name = %name, uri = %uri, "Connected to ZooKeeper");

    let version = match session.node_exists(&path).await {
        Ok(version) => version,
        Err(e) => {
            session.close().await;
            return Err(e.into());
        }
    };

    info!(name = %name, path = %path, data = %payload, version, "Updating cluster size");
    if let Err(e) = session.update_node(&path, &payload, version).await {
        warn!(name = %name, path = %path, error = %e, "Failed to update cluster size");
    }
    session.close().await;
    Ok(())
}

/// Converge the client Service and record its endpoints.
pub async fn reconcile_client_service(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let desired = generate_client_service(cluster);
    let synced = sync_child(ctx.stores.services.as_ref(), &namespace, &desired, sync_service).await?;

    let (internal, external) = client_endpoints(&synced.current, cluster.spec.zookeeper_ports().client);
    let status = cluster.status_mut();
    status.internal_client_endpoint = internal;
    status.external_client_endpoint = external;
    Ok(())
}

pub async fn reconcile_headless_service(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let desired = generate_headless_service(cluster);
    sync_child(ctx.stores.services.as_ref(), &namespace, &desired, sync_service).await?;
    Ok(())
}

pub async fn reconcile_admin_server_service(
    cluster: &mut ZookeeperCluster,
    ctx: &Context,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let desired = generate_admin_server_service(cluster);
    sync_child(ctx.stores.services.as_ref(), &namespace, &desired, sync_service).await?;
    Ok(())
}

pub async fn reconcile_pod_disruption_budget(
    cluster: &mut ZookeeperCluster,
    ctx: &Context,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let desired = generate_pod_disruption_budget(cluster);
    sync_child(
        ctx.stores.pod_disruption_budgets.as_ref(),
        &namespace,
        &desired,
        sync_pod_disruption_budget,
    )
    .await?;
    Ok(())
}

