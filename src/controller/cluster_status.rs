//! Cluster status aggregation.
//!
//! Derives membership and readiness from the ensemble's pods, and creates
//! the metadata root the first time the ensemble is fully ready.

use jiff::Timestamp;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::crd::{MembersStatus, ZookeeperCluster};
use crate::metadata::{metadata_path, service_uri};
use crate::resources::common::pod_selector_labels;

/// A pod is ready when every container reports ready. Pods without
/// container statuses count as ready.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .is_none_or(|statuses| statuses.iter().all(|c| c.ready))
}

/// Split pods into ready and unready member names, each sorted.
pub fn observe_members(pods: &[Pod]) -> MembersStatus {
    let mut members = MembersStatus::default();
    for pod in pods {
        if is_pod_ready(pod) {
            members.ready.push(pod.name_any());
        } else {
            members.unready.push(pod.name_any());
        }
    }
    members.ready.sort();
    members.unready.sort();
    members
}

/// Refresh the cluster status in memory. Skipped while an upgrade is running
/// or has failed; the upgrade state machine owns the status then.
pub async fn reconcile_cluster_status(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    {
        let conditions = &cluster.status_or_default().conditions;
        if conditions.is_upgrading() || conditions.is_upgrade_failed() {
            debug!(name = %name, "Upgrade in progress, skipping status aggregation");
            return Ok(());
        }
    }

    let now = Timestamp::now();
    cluster.status_mut().conditions.init_at(now);

    let pods = ctx
        .stores
        .pods
        .list(&namespace, &pod_selector_labels(cluster))
        .await?;
    let members = observe_members(&pods);
    debug!(
        name = %name,
        ready = members.ready.len(),
        unready = members.unready.len(),
        "Observed members"
    );
    cluster.status_mut().members = members;

    let replicas = cluster.spec.replicas;
    let ready_replicas = cluster.status_or_default().ready_replicas;
    let fully_ready = replicas == ready_replicas;

    if fully_ready && !cluster.status_or_default().meta_root_created {
        create_meta_root(cluster, ctx).await?;
        cluster.status_mut().meta_root_created = true;
        ctx.publish_normal_event(
            cluster,
            "MetadataRootCreated",
            "Reconciling",
            Some(format!("Created {}", metadata_path(&name))),
        )
        .await;
    }

    let tag = cluster.spec.image.tag.clone();
    let status = cluster.status_mut();
    status.conditions.set_pods_ready_at(fully_ready, now);
    if status.current_version.is_empty() && status.conditions.is_ready() {
        status.current_version = tag;
    }
    Ok(())
}

async fn create_meta_root(cluster: &ZookeeperCluster, ctx: &Context) -> Result<()> {
    let name = cluster.name_any();
    let uri = service_uri(cluster);
    let path = metadata_path(&name);
    info!(name = %name, uri = %uri, path = %path, "Cluster is ready, creating metadata root");

    let mut session = ctx.metadata.connect(&uri).await?;
    let created = session.create_node(cluster, &path).await;
    session.close().await;
    created?;

    info!(name = %name, path = %path, "Metadata node created");
    Ok(())
}
