//! ZookeeperCluster Custom Resource Definition.
//!
//! Declares the desired shape of a ZooKeeper ensemble (size, image,
//! storage, pod policy) and the status the operator reports back.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::Conditions;

/// ZookeeperCluster is a custom resource for deploying ZooKeeper ensembles.
///
/// Example:
/// ```yaml
/// apiVersion: zookeeper.pravega.io/v1beta1
/// kind: ZookeeperCluster
/// metadata:
///   name: zk
/// spec:
///   replicas: 3
///   image:
///     tag: 0.2.15
///   persistence:
///     reclaimPolicy: Delete
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "zookeeper.pravega.io",
    version = "v1beta1",
    kind = "ZookeeperCluster",
    plural = "zookeeperclusters",
    shortname = "zk",
    status = "ZookeeperClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready Replicas", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.currentVersion"}"#,
    printcolumn = r#"{"name":"Desired Version", "type":"string", "jsonPath":".spec.image.tag"}"#,
    printcolumn = r#"{"name":"Internal Endpoint", "type":"string", "jsonPath":".status.internalClientEndpoint"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterSpec {
    /// Number of ensemble members. Zero means "use the default" (3).
    #[serde(default)]
    pub replicas: i32,

    /// ZooKeeper container image.
    #[serde(default)]
    pub image: ImageSpec,

    /// Labels added to every managed resource.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Named container ports. Missing well-known ports are filled in by defaulting.
    #[serde(default)]
    pub ports: Vec<NamedPort>,

    /// DNS domain of the Kubernetes cluster (default: cluster.local).
    #[serde(default)]
    pub kubernetes_cluster_domain: String,

    /// Persistent storage. Defaulted when `ephemeral` is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceSpec>,

    /// Ephemeral (emptyDir) storage instead of PersistentVolumeClaims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<EphemeralSpec>,

    /// Pod-level policy.
    #[serde(default)]
    pub pod: PodPolicy,

    /// zoo.cfg tuning.
    #[serde(default)]
    pub config: ZookeeperConfig,

    /// Client Service settings.
    #[serde(default)]
    pub client_service: ServicePolicy,

    /// Headless Service settings.
    #[serde(default)]
    pub headless_service: ServicePolicy,

    /// Admin server Service settings.
    #[serde(default)]
    pub admin_server_service: ServicePolicy,

    /// Maximum number of members that may be voluntarily disrupted (default: 1).
    #[serde(default)]
    pub max_unavailable_replicas: i32,

    /// Setting this to true performs a rolling restart; the operator resets it.
    #[serde(default)]
    pub trigger_rolling_restart: bool,
}

/// Container image specification.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image repository (default: pravega/zookeeper).
    #[serde(default)]
    pub repository: String,

    /// Image tag, also used as the ensemble version (default: 0.2.15).
    #[serde(default)]
    pub tag: String,

    /// Image pull policy (default: IfNotPresent).
    #[serde(default)]
    pub pull_policy: String,
}

impl ImageSpec {
    /// Full image reference (`repository:tag`).
    pub fn to_reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// A named container port.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedPort {
    pub name: String,
    pub container_port: i32,
}

/// What happens to PersistentVolumeClaims when the cluster is deleted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum VolumeReclaimPolicy {
    /// Claims outlive the cluster.
    #[default]
    Retain,
    /// Claims are deleted with the cluster and when scaled away.
    Delete,
}

impl std::fmt::Display for VolumeReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeReclaimPolicy::Retain => write!(f, "Retain"),
            VolumeReclaimPolicy::Delete => write!(f, "Delete"),
        }
    }
}

/// Persistent storage configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSpec {
    /// Reclaim policy for the data claims (default: Retain).
    #[serde(default)]
    pub reclaim_policy: VolumeReclaimPolicy,

    /// Storage class for the claims. Cluster default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Requested size per member (default: 20Gi).
    #[serde(default)]
    pub size: String,
}

/// Ephemeral storage configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralSpec {
    /// Size limit of the emptyDir volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<String>,
}

/// Pod-level settings applied to every ensemble member.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodPolicy {
    /// ServiceAccount the pods run as (default: "default").
    #[serde(default)]
    pub service_account_name: String,

    /// Extra pod labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Extra pod annotations. The operator writes `restartTime` here.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Image pull secrets, also attached to a non-default ServiceAccount.
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,

    /// Node selector.
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations.
    #[serde(default)]
    pub tolerations: Vec<Toleration>,

    /// Resource requests/limits, e.g. `{"cpu": "500m"}`.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    /// Termination grace period (default: 30).
    #[serde(default)]
    pub termination_grace_period_seconds: i64,
}

/// Toleration for pod scheduling.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

/// Resource requests and limits.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// zoo.cfg settings rendered into the ConfigMap.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperConfig {
    /// Ticks a follower may take to connect and sync (default: 10).
    #[serde(default)]
    pub init_limit: i32,
    /// Tick length in milliseconds (default: 2000).
    #[serde(default)]
    pub tick_time: i32,
    /// Ticks a follower may lag behind (default: 2).
    #[serde(default)]
    pub sync_limit: i32,
    /// Maximum concurrent connections per client IP (default: 60).
    #[serde(default)]
    pub max_client_cnxns: i32,
    /// Listen on all interfaces for quorum traffic.
    #[serde(default)]
    pub quorum_listen_on_all_ips: bool,
    /// Extra zoo.cfg entries.
    #[serde(default)]
    pub additional_config: BTreeMap<String, String>,
}

/// Service customisation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePolicy {
    /// Annotations on the Service.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Service type (client service only, default: ClusterIP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// Expose the admin server through a LoadBalancer (admin service only).
    #[serde(default)]
    pub external: bool,
}

/// Observed state of a ZookeeperCluster.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZookeeperClusterStatus {
    /// Members registered as ready/unready.
    #[serde(default)]
    pub members: MembersStatus,

    /// Replicas reported by the StatefulSet.
    #[serde(default)]
    pub replicas: i32,

    /// Ready replicas reported by the StatefulSet.
    #[serde(default)]
    pub ready_replicas: i32,

    /// Version the ensemble currently runs.
    #[serde(default)]
    pub current_version: String,

    /// Version an upgrade is moving to; empty when not upgrading.
    #[serde(default)]
    pub target_version: String,

    /// `<clusterIP>:<port>` of the client Service.
    #[serde(default)]
    pub internal_client_endpoint: String,

    /// External `<ip>:<port>` for LoadBalancer client services, `N/A` otherwise.
    #[serde(default)]
    pub external_client_endpoint: String,

    /// Whether the metadata node has been created in the ensemble.
    #[serde(default)]
    pub meta_root_created: bool,

    /// Ready, Upgrading and Error conditions.
    #[serde(default)]
    #[schemars(with = "Vec<crate::crd::Condition>")]
    pub conditions: Conditions,
}

/// Pod names split by readiness.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MembersStatus {
    #[serde(default)]
    pub ready: Vec<String>,
    #[serde(default)]
    pub unready: Vec<String>,
}

/// Default ensemble size.
pub const DEFAULT_REPLICAS: i32 = 3;
pub const DEFAULT_REPOSITORY: &str = "pravega/zookeeper";
pub const DEFAULT_TAG: &str = "0.2.15";
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_STORAGE_SIZE: &str = "20Gi";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";
pub const DEFAULT_TERMINATION_GRACE_PERIOD: i64 = 30;

pub const CLIENT_PORT_NAME: &str = "client";
pub const QUORUM_PORT_NAME: &str = "quorum";
pub const LEADER_ELECTION_PORT_NAME: &str = "leader-election";
pub const METRICS_PORT_NAME: &str = "metrics";
pub const ADMIN_SERVER_PORT_NAME: &str = "admin-server";

/// Well-known ports in the order they appear on containers and services.
const DEFAULT_PORTS: [(&str, i32); 5] = [
    (CLIENT_PORT_NAME, 2181),
    (QUORUM_PORT_NAME, 2888),
    (LEADER_ELECTION_PORT_NAME, 3888),
    (METRICS_PORT_NAME, 7000),
    (ADMIN_SERVER_PORT_NAME, 8080),
];

/// Resolved port numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZookeeperPorts {
    pub client: i32,
    pub quorum: i32,
    pub leader_election: i32,
    pub metrics: i32,
    pub admin_server: i32,
}

fn set_if_empty(field: &mut String, value: &str) -> bool {
    if field.is_empty() {
        *field = value.to_string();
        return true;
    }
    false
}

fn set_if_zero<T: Default + PartialEq>(field: &mut T, value: T) -> bool {
    if *field == T::default() {
        *field = value;
        return true;
    }
    false
}

impl ZookeeperClusterSpec {
    /// Fill unset fields with defaults. Returns true if anything changed.
    pub fn with_defaults(&mut self) -> bool {
        let mut changed = false;

        changed |= set_if_zero(&mut self.replicas, DEFAULT_REPLICAS);
        changed |= set_if_empty(&mut self.image.repository, DEFAULT_REPOSITORY);
        changed |= set_if_empty(&mut self.image.tag, DEFAULT_TAG);
        changed |= set_if_empty(&mut self.image.pull_policy, DEFAULT_PULL_POLICY);
        changed |= set_if_empty(&mut self.kubernetes_cluster_domain, DEFAULT_CLUSTER_DOMAIN);

        for (name, port) in DEFAULT_PORTS {
            if !self.ports.iter().any(|p| p.name == name) {
                self.ports.push(NamedPort {
                    name: name.to_string(),
                    container_port: port,
                });
                changed = true;
            }
        }

        if self.ephemeral.is_none() {
            let persistence = self.persistence.get_or_insert_with(|| {
                changed = true;
                PersistenceSpec::default()
            });
            changed |= set_if_empty(&mut persistence.size, DEFAULT_STORAGE_SIZE);
        }

        changed |= set_if_empty(&mut self.pod.service_account_name, DEFAULT_SERVICE_ACCOUNT);
        changed |= set_if_zero(
            &mut self.pod.termination_grace_period_seconds,
            DEFAULT_TERMINATION_GRACE_PERIOD,
        );

        changed |= set_if_zero(&mut self.config.init_limit, 10);
        changed |= set_if_zero(&mut self.config.tick_time, 2000);
        changed |= set_if_zero(&mut self.config.sync_limit, 2);
        changed |= set_if_zero(&mut self.config.max_client_cnxns, 60);

        changed |= set_if_zero(&mut self.max_unavailable_replicas, 1);

        changed
    }

    /// Look up a named port, falling back to the well-known default.
    pub fn port(&self, name: &str) -> i32 {
        self.ports
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.container_port)
            .or_else(|| {
                DEFAULT_PORTS
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, p)| *p)
            })
            .unwrap_or_default()
    }

    /// All resolved ports.
    pub fn zookeeper_ports(&self) -> ZookeeperPorts {
        ZookeeperPorts {
            client: self.port(CLIENT_PORT_NAME),
            quorum: self.port(QUORUM_PORT_NAME),
            leader_election: self.port(LEADER_ELECTION_PORT_NAME),
            metrics: self.port(METRICS_PORT_NAME),
            admin_server: self.port(ADMIN_SERVER_PORT_NAME),
        }
    }

    /// Reclaim policy in effect; ephemeral storage never needs cleanup.
    pub fn reclaim_policy(&self) -> VolumeReclaimPolicy {
        match (&self.persistence, &self.ephemeral) {
            (Some(p), None) => p.reclaim_policy,
            _ => VolumeReclaimPolicy::Retain,
        }
    }
}

impl ZookeeperCluster {
    /// Apply defaults to the spec. Returns true if anything changed.
    pub fn with_defaults(&mut self) -> bool {
        self.spec.with_defaults()
    }

    /// Status, created empty on first access.
    pub fn status_mut(&mut self) -> &mut ZookeeperClusterStatus {
        self.status.get_or_insert_with(ZookeeperClusterStatus::default)
    }

    /// Status or an empty default.
    pub fn status_or_default(&self) -> ZookeeperClusterStatus {
        self.status.clone().unwrap_or_default()
    }
}
