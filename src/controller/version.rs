//! Staleness check between a cluster and the StatefulSet it owns.
//!
//! The StatefulSet is stamped with the cluster's resourceVersion under the
//! `owner-rv` label whenever the operator writes it. A cluster object read
//! from a lagging cache carries a smaller resourceVersion than the label.

use std::cmp::Ordering;

use k8s_openapi::api::apps::v1::StatefulSet;
use tracing::warn;

use crate::crd::ZookeeperCluster;

/// Label holding the cluster resourceVersion on the StatefulSet.
pub const OWNER_RV_LABEL: &str = "owner-rv";

/// Compare raw resource versions.
///
/// `Less` means the cluster is older than what the StatefulSet was last
/// written from, `Greater` means the StatefulSet needs restamping.
pub fn compare_versions(cluster_rv: Option<&str>, owner_rv: Option<&str>) -> Ordering {
    let cluster = cluster_rv.and_then(|v| v.parse::<u64>().ok());
    let owner = owner_rv.and_then(|v| v.parse::<u64>().ok());

    match (cluster, owner) {
        (Some(cluster), Some(owner)) => cluster.cmp(&owner),
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
        (None, Some(_)) => {
            warn!(
                cluster_rv = ?cluster_rv,
                owner_rv = ?owner_rv,
                "Cluster resourceVersion is not numeric, skipping staleness check"
            );
            Ordering::Equal
        }
    }
}

/// Compare a cluster against the StatefulSet it owns.
pub fn compare_resource_version(cluster: &ZookeeperCluster, sts: &StatefulSet) -> Ordering {
    let owner_rv = sts
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(OWNER_RV_LABEL))
        .map(String::as_str);
    compare_versions(cluster.metadata.resource_version.as_deref(), owner_rv)
}
