//! PodDisruptionBudget generation for ZooKeeper ensembles.
//!
//! Limits voluntary disruptions (node drains, cluster upgrades) so the
//! ensemble keeps a quorum.

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::ZookeeperCluster;
use crate::resources::common::{child_metadata, pod_selector_labels};

/// Generate a PodDisruptionBudget for a ZookeeperCluster.
///
/// `maxUnavailable` comes from `spec.maxUnavailableReplicas` (default 1),
/// which keeps 2 of 3 members available.
pub fn generate_pod_disruption_budget(resource: &ZookeeperCluster) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: child_metadata(resource, resource.name_any()),
        spec: Some(PodDisruptionBudgetSpec {
            max_unavailable: Some(IntOrString::Int(resource.spec.max_unavailable_replicas)),
            selector: Some(LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Merge thresholds, selector and labels into the live budget.
pub fn sync_pod_disruption_budget(found: &mut PodDisruptionBudget, desired: &PodDisruptionBudget) {
    found.metadata.labels = desired.metadata.labels.clone();
    if let Some(desired_spec) = &desired.spec {
        let spec = found.spec.get_or_insert_with(Default::default);
        spec.max_unavailable = desired_spec.max_unavailable.clone();
        spec.min_available = desired_spec.min_available.clone();
        spec.selector = desired_spec.selector.clone();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use crate::resources::common::tests::test_resource;

    #[test]
    fn test_generate_pdb_default() {
        let resource = test_resource("zk");
        let pdb = generate_pod_disruption_budget(&resource);

        assert_eq!(pdb.metadata.name, Some("zk".to_string()));
        assert_eq!(pdb.metadata.namespace, Some("default".to_string()));

        let spec = pdb.spec.unwrap();
        assert_eq!(spec.max_unavailable, Some(IntOrString::Int(1)));
    }

    #[test]
    fn test_generate_pdb_custom_threshold() {
        let mut resource = test_resource("zk");
        resource.spec.max_unavailable_replicas = 2;
        let pdb = generate_pod_disruption_budget(&resource);

        let spec = pdb.spec.unwrap();
        assert_eq!(spec.max_unavailable, Some(IntOrString::Int(2)));
    }

    #[test]
    fn test_pdb_selector() {
        let resource = test_resource("zk");
        let pdb = generate_pod_disruption_budget(&resource);

        let spec = pdb.spec.unwrap();
        let labels = spec.selector.unwrap().match_labels.unwrap();
        assert_eq!(labels.get("app"), Some(&"zk".to_string()));
    }

    #[test]
    fn test_sync_updates_threshold() {
        let resource = test_resource("zk");
        let mut found = generate_pod_disruption_budget(&resource);

        let mut changed = resource.clone();
        changed.spec.max_unavailable_replicas = 2;
        sync_pod_disruption_budget(&mut found, &generate_pod_disruption_budget(&changed));

        assert_eq!(
            found.spec.unwrap().max_unavailable,
            Some(IntOrString::Int(2))
        );
    }
}
