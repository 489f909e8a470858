//! Finalizer-driven storage cleanup.
//!
//! With reclaim policy `Delete` the cluster carries the
//! `cleanUpZookeeperPVC` finalizer. While the cluster lives, claims left
//! behind by a scale-down are removed once the ensemble is back at full
//! strength; when the cluster is deleted every claim goes before the
//! finalizer is released.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result, Severity};
use crate::controller::persist_cluster;
use crate::crd::{VolumeReclaimPolicy, ZookeeperCluster};
use crate::resources::common::pvc_selector_labels;

/// Finalizer token guarding PVC cleanup.
pub const PVC_FINALIZER: &str = "cleanUpZookeeperPVC";

/// Whether the pipeline continues after the storage stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    Stop,
}

/// True if the claim's ordinal (digits after the last `-`) is at or beyond
/// `replicas`. Names without a numeric suffix are never orphans.
pub fn is_pvc_orphan(pvc_name: &str, replicas: i32) -> bool {
    pvc_name
        .rsplit_once('-')
        .and_then(|(_, ordinal)| ordinal.parse::<i64>().ok())
        .is_some_and(|ordinal| ordinal >= i64::from(replicas))
}

pub fn has_finalizer(cluster: &ZookeeperCluster) -> bool {
    cluster.finalizers().iter().any(|f| f == PVC_FINALIZER)
}

/// Finalizer and PVC lifecycle manager.
#[derive(Debug, Clone, Copy)]
pub struct StorageLifecycle {
    disable_finalizer: bool,
}

impl StorageLifecycle {
    pub fn new(disable_finalizer: bool) -> Self {
        Self { disable_finalizer }
    }

    /// Run the storage stage for one reconcile cycle.
    pub async fn reconcile(&self, cluster: &mut ZookeeperCluster, ctx: &Context) -> Result<StageOutcome> {
        let name = cluster.name_any();
        let deleting = cluster.metadata.deletion_timestamp.is_some();

        if cluster.spec.reclaim_policy() != VolumeReclaimPolicy::Delete {
            if has_finalizer(cluster) {
                info!(name = %name, "Reclaim policy is not Delete, removing stale finalizer");
                remove_finalizer(cluster);
                persist_cluster(cluster, ctx).await?;
            }
            return Ok(if deleting {
                StageOutcome::Stop
            } else {
                StageOutcome::Continue
            });
        }

        if !deleting {
            if !has_finalizer(cluster) && !self.disable_finalizer {
                info!(name = %name, finalizer = PVC_FINALIZER, "Adding finalizer");
                cluster
                    .metadata
                    .finalizers
                    .get_or_insert_with(Vec::new)
                    .push(PVC_FINALIZER.to_string());
                persist_cluster(cluster, ctx).await?;
                ctx.publish_normal_event(
                    cluster,
                    "FinalizerAdded",
                    "Reconciling",
                    Some("PVCs will be deleted with the cluster".to_string()),
                )
                .await;
            }
            self.cleanup_orphan_pvcs(cluster, ctx).await?;
            return Ok(StageOutcome::Continue);
        }

        if has_finalizer(cluster) {
            info!(name = %name, "Cluster is being deleted, removing all PVCs");
            self.cleanup_all_pvcs(cluster, ctx).await?;
            remove_finalizer(cluster);
            persist_cluster(cluster, ctx).await?;
            info!(name = %name, "PVC cleanup complete, finalizer removed");
        }
        Ok(StageOutcome::Stop)
    }

    async fn list_pvcs(&self, cluster: &ZookeeperCluster, ctx: &Context) -> Result<Vec<PersistentVolumeClaim>> {
        let namespace = cluster.namespace().unwrap_or_default();
        ctx.stores
            .pvcs
            .list(&namespace, &pvc_selector_labels(cluster))
            .await
    }

    /// Delete claims beyond the current size. Waits until the ensemble is
    /// at full strength so a scale-down has finished before storage goes.
    async fn cleanup_orphan_pvcs(&self, cluster: &ZookeeperCluster, ctx: &Context) -> Result<()> {
        let name = cluster.name_any();
        let replicas = cluster.spec.replicas;
        let ready = cluster
            .status
            .as_ref()
            .map(|s| s.ready_replicas)
            .unwrap_or_default();
        if ready != replicas {
            return Ok(());
        }

        let pvcs = self.list_pvcs(cluster, ctx).await?;
        debug!(name = %name, pvc_count = pvcs.len(), ready_replicas = ready, "Checking for orphan PVCs");
        if pvcs.len() <= usize::try_from(replicas).unwrap_or_default() {
            return Ok(());
        }

        let namespace = cluster.namespace().unwrap_or_default();
        for pvc in pvcs {
            let pvc_name = pvc.name_any();
            if !is_pvc_orphan(&pvc_name, replicas) {
                continue;
            }
            info!(name = %name, pvc = %pvc_name, "Deleting orphan PVC");
            // Best effort: the next cycle retries whatever is left.
            match ctx.stores.pvcs.delete(&namespace, &pvc_name).await {
                Ok(()) => {}
                Err(e) if e.severity() == Severity::Ignorable => {
                    debug!(name = %name, pvc = %pvc_name, "Orphan PVC already gone");
                }
                Err(e) => {
                    warn!(name = %name, pvc = %pvc_name, error = %e, "Failed to delete orphan PVC");
                }
            }
        }
        Ok(())
    }

    /// Delete every claim of the cluster. Any failure other than NotFound
    /// fails the stage so the finalizer stays and cleanup is retried.
    async fn cleanup_all_pvcs(&self, cluster: &ZookeeperCluster, ctx: &Context) -> Result<()> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_default();
        let mut failed = Vec::new();

        for pvc in self.list_pvcs(cluster, ctx).await? {
            let pvc_name = pvc.name_any();
            info!(name = %name, pvc = %pvc_name, "Deleting PVC");
            if let Err(e) = ctx.stores.pvcs.delete(&namespace, &pvc_name).await {
                if e.severity() == Severity::Ignorable {
                    continue;
                }
                warn!(name = %name, pvc = %pvc_name, error = %e, "Failed to delete PVC");
                failed.push(pvc_name);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Transient(format!(
                "failed to delete PVCs: {}",
                failed.join(", ")
            )))
        }
    }
}

fn remove_finalizer(cluster: &mut ZookeeperCluster) {
    if let Some(finalizers) = cluster.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != PVC_FINALIZER);
    }
}
