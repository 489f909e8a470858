//! Test fixtures and builder patterns for ZookeeperCluster.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use zookeeper_operator::crd::{
    ImageSpec, PersistenceSpec, VolumeReclaimPolicy, ZookeeperCluster, ZookeeperClusterSpec,
};

/// Builder for creating ZookeeperCluster test fixtures.
///
/// # Example
/// ```
/// let cluster = ZookeeperClusterBuilder::new("zk")
///     .namespace("test-ns")
///     .replicas(3)
///     .reclaim_policy(VolumeReclaimPolicy::Delete)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ZookeeperClusterBuilder {
    name: String,
    namespace: Option<String>,
    replicas: i32,
    tag: Option<String>,
    reclaim_policy: VolumeReclaimPolicy,
    labels: BTreeMap<String, String>,
    uid: Option<String>,
    resource_version: Option<String>,
    defaulted: bool,
}

impl ZookeeperClusterBuilder {
    /// Create a new builder with the given cluster name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            replicas: 3,
            tag: None,
            reclaim_policy: VolumeReclaimPolicy::Retain,
            labels: BTreeMap::new(),
            uid: None,
            resource_version: None,
            defaulted: true,
        }
    }

    /// Set the namespace for the cluster.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the number of ensemble members.
    pub fn replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Set the image tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the PVC reclaim policy.
    pub fn reclaim_policy(mut self, policy: VolumeReclaimPolicy) -> Self {
        self.reclaim_policy = policy;
        self
    }

    /// Add a user label, propagated to every child object.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the UID (owner references and PVC selectors use it).
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn resource_version(mut self, rv: impl Into<String>) -> Self {
        self.resource_version = Some(rv.into());
        self
    }

    /// Leave unset spec fields empty instead of applying defaults.
    pub fn raw(mut self) -> Self {
        self.defaulted = false;
        self
    }

    /// Build the ZookeeperCluster.
    pub fn build(self) -> ZookeeperCluster {
        let mut spec = ZookeeperClusterSpec {
            replicas: self.replicas,
            image: ImageSpec {
                tag: self.tag.unwrap_or_default(),
                ..Default::default()
            },
            labels: self.labels,
            persistence: Some(PersistenceSpec {
                reclaim_policy: self.reclaim_policy,
                ..Default::default()
            }),
            ..Default::default()
        };
        if self.defaulted {
            spec.with_defaults();
        }

        ZookeeperCluster {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: self.namespace,
                uid: self.uid,
                resource_version: self.resource_version,
                ..Default::default()
            },
            spec,
            status: None,
        }
    }
}

impl Default for ZookeeperClusterBuilder {
    fn default() -> Self {
        Self::new("zk")
    }
}

/// Create a defaulted ZookeeperCluster for testing.
pub fn test_cluster(name: &str, namespace: &str) -> ZookeeperCluster {
    ZookeeperClusterBuilder::new(name)
        .namespace(namespace)
        .uid(format!("{name}-uid"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cluster = ZookeeperClusterBuilder::new("zk").build();
        assert_eq!(cluster.metadata.name, Some("zk".to_string()));
        assert_eq!(cluster.spec.replicas, 3);
        assert_eq!(cluster.spec.image.tag, "0.2.15");
    }

    #[test]
    fn test_builder_raw_keeps_spec_empty() {
        let cluster = ZookeeperClusterBuilder::new("zk").replicas(0).raw().build();
        assert_eq!(cluster.spec.replicas, 0);
        assert!(cluster.spec.ports.is_empty());
    }
}
