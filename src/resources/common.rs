//! Common resource generation utilities.
//!
//! Names, labels and owner references shared by every object generated for
//! a ZookeeperCluster.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::ZookeeperCluster;

/// Value of `app.kubernetes.io/managed-by` on managed resources.
pub const MANAGED_BY: &str = "zookeeper-operator";

/// Name of the data volume and PVC template.
pub const DATA_VOLUME: &str = "data";

/// Client Service name.
pub fn client_service_name(cluster_name: &str) -> String {
    format!("{cluster_name}-client")
}

/// Headless Service name (StatefulSet governing service).
pub fn headless_service_name(cluster_name: &str) -> String {
    format!("{cluster_name}-headless")
}

/// Admin server Service name.
pub fn admin_server_service_name(cluster_name: &str) -> String {
    format!("{cluster_name}-admin-server")
}

/// ConfigMap name.
pub fn config_map_name(cluster_name: &str) -> String {
    format!("{cluster_name}-configmap")
}

/// Name of the data claim for one ordinal.
pub fn pvc_name(cluster_name: &str, ordinal: i32) -> String {
    format!("{DATA_VOLUME}-{cluster_name}-{ordinal}")
}

/// Selector matching the ensemble's pods.
pub fn pod_selector_labels(resource: &ZookeeperCluster) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), resource.name_any())])
}

/// Selector matching the cluster's data claims.
pub fn pvc_selector_labels(resource: &ZookeeperCluster) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), resource.name_any()),
        ("uid".to_string(), resource.uid().unwrap_or_default()),
    ])
}

/// Standard labels applied to all managed resources
pub fn standard_labels(resource: &ZookeeperCluster) -> BTreeMap<String, String> {
    let name = resource.name_any();
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), name.clone());
    labels.insert("release".to_string(), name);
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );

    // Merge user-defined labels
    for (key, value) in &resource.spec.labels {
        labels.insert(key.clone(), value.clone());
    }

    labels
}

/// Create owner reference for a ZookeeperCluster
pub fn owner_reference(resource: &ZookeeperCluster) -> OwnerReference {
    OwnerReference {
        api_version: ZookeeperCluster::api_version(&()).to_string(),
        kind: ZookeeperCluster::kind(&()).to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Metadata for a child object: name, namespace, standard labels and the
/// controller owner reference.
pub fn child_metadata(resource: &ZookeeperCluster, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: resource.namespace(),
        labels: Some(standard_labels(resource)),
        owner_references: Some(vec![owner_reference(resource)]),
        ..Default::default()
    }
}

/// `Some(map)` unless the map is empty.
pub fn non_empty<V: Clone>(map: &BTreeMap<String, V>) -> Option<BTreeMap<String, V>> {
    if map.is_empty() {
        None
    } else {
        Some(map.clone())
    }
}
