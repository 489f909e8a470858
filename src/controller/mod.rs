//! Controller module for zookeeper-operator.
//!
//! Contains the reconciliation dispatcher, the per-kind stages, the upgrade
//! state machine, storage lifecycle, error handling and validation.

pub mod cluster_status;
pub mod context;
pub mod error;
pub mod reconciler;
pub mod stages;
pub mod storage;
pub mod sync;
pub mod upgrade_state_machine;
pub mod validation;
pub mod version;

use kube::ResourceExt;

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::crd::{ZookeeperCluster, ZookeeperClusterStatus};

/// Replace the cluster object, keeping the in-memory status.
///
/// The API server ignores status on a plain update, so the stored copy
/// comes back with the old status while stages may have moved on.
pub async fn persist_cluster(cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let status = cluster.status.clone();
    let mut stored = ctx.stores.clusters.replace(&namespace, cluster).await?;
    stored.status = status;
    *cluster = stored;
    Ok(())
}

/// Write the status subresource if it differs from `observed`.
pub async fn persist_status(
    cluster: &mut ZookeeperCluster,
    ctx: &Context,
    observed: Option<&ZookeeperClusterStatus>,
) -> Result<()> {
    if cluster.status.as_ref() == observed {
        return Ok(());
    }
    let namespace = cluster.namespace().unwrap_or_default();
    tracing::debug!(name = %cluster.name_any(), "Updating ZookeeperCluster status");
    *cluster = ctx.stores.clusters.replace_status(&namespace, cluster).await?;
    Ok(())
}
