//! Common test fixtures and helpers.
//!
//! This module provides shared utilities for integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Client, ResourceExt};

use zookeeper_operator::crd::{VolumeReclaimPolicy, ZookeeperCluster};
use zookeeper_operator::resources::common::{pvc_name, pvc_selector_labels};

use crate::common::fixtures::ZookeeperClusterBuilder;
use crate::{SharedTestCluster, ensure_cluster_crd_installed};

/// Short timeout for quick operations.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for most operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Long timeout for an ensemble to become ready.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// Initialize tracing and ensure the ZookeeperCluster CRD is installed.
///
/// Returns the shared test cluster and a fresh client.
pub async fn init_test() -> (Arc<SharedTestCluster>, Client) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,kube=warn,zookeeper_operator=debug")
        .with_test_writer()
        .try_init();

    let cluster = SharedTestCluster::get().await;

    ensure_cluster_crd_installed(&cluster)
        .await
        .expect("Failed to install ZookeeperCluster CRD");

    let client = cluster.new_client().await;
    (cluster, client)
}

/// A single-member ensemble, enough for most lifecycle checks.
pub fn small_cluster(name: &str) -> ZookeeperCluster {
    ZookeeperClusterBuilder::new(name).replicas(1).build()
}

/// An ensemble whose claims are deleted along with it.
pub fn deletable_cluster(name: &str, replicas: i32) -> ZookeeperCluster {
    ZookeeperClusterBuilder::new(name)
        .replicas(replicas)
        .reclaim_policy(VolumeReclaimPolicy::Delete)
        .build()
}

/// Create claims labelled the way the StatefulSet's claim template labels
/// them, so tests can exercise cleanup without a storage provisioner.
pub async fn create_member_claims(client: Client, cluster: &ZookeeperCluster, count: i32) {
    let namespace = cluster.namespace().unwrap_or_default();
    let api: Api<PersistentVolumeClaim> = Api::namespaced(client, &namespace);
    let labels: BTreeMap<String, String> = pvc_selector_labels(cluster);

    for ordinal in 0..count {
        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(pvc_name(&cluster.name_any(), ordinal)),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(
                        [("storage".to_string(), Quantity("1Gi".to_string()))]
                            .into_iter()
                            .collect(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let _ = api.create(&PostParams::default(), &pvc).await;
    }
}
