//! StatefulSet generation for ZooKeeper ensembles.
//!
//! Creates a StatefulSet configured for ZooKeeper quorum operation:
//! - Stable network identity via the headless service
//! - Persistent data claims labelled with the cluster uid (or emptyDir)
//! - Configuration mounted from the cluster ConfigMap
//! - Pod anti-affinity across nodes
//! - Member registration and teardown scripts from the image

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    ExecAction, Lifecycle, LifecycleHandler, LocalObjectReference, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Toleration, Volume, VolumeMount, VolumeResourceRequirements,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::controller::version::OWNER_RV_LABEL;
use crate::crd::{
    ADMIN_SERVER_PORT_NAME, CLIENT_PORT_NAME, LEADER_ELECTION_PORT_NAME, METRICS_PORT_NAME,
    QUORUM_PORT_NAME, ZookeeperCluster,
};
use crate::resources::common::{
    DATA_VOLUME, child_metadata, config_map_name, headless_service_name, non_empty,
    pod_selector_labels, pvc_selector_labels, standard_labels,
};

/// Annotation written to the pod template to force a rolling restart.
pub const RESTART_TIME_ANNOTATION: &str = "restartTime";

const CONTAINER_NAME: &str = "zookeeper";
const CONF_VOLUME: &str = "conf";

/// Generate a StatefulSet for a ZookeeperCluster.
///
/// The returned object carries no `owner-rv` label; the synchronizer stamps
/// it on create.
pub fn generate_statefulset(resource: &ZookeeperCluster) -> StatefulSet {
    let name = resource.name_any();

    StatefulSet {
        metadata: child_metadata(resource, name.clone()),
        spec: Some(StatefulSetSpec {
            replicas: Some(resource.spec.replicas),
            service_name: Some(headless_service_name(&name)),
            selector: LabelSelector {
                match_labels: Some(pod_selector_labels(resource)),
                ..Default::default()
            },
            pod_management_policy: Some("OrderedReady".to_string()),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                ..Default::default()
            }),
            template: generate_pod_template(resource),
            volume_claim_templates: resource
                .spec
                .persistence
                .as_ref()
                .filter(|_| resource.spec.ephemeral.is_none())
                .map(|_| vec![generate_pvc_template(resource)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Stamp the cluster resourceVersion on a StatefulSet.
pub fn stamp_owner_rv(sts: &mut StatefulSet, resource: &ZookeeperCluster) {
    sts.metadata.labels.get_or_insert_with(BTreeMap::new).insert(
        OWNER_RV_LABEL.to_string(),
        resource.metadata.resource_version.clone().unwrap_or_default(),
    );
}

/// Merge the desired StatefulSet into the live one.
///
/// Copies replicas, pod template, update strategy and labels. The live
/// `owner-rv` label is kept so staleness stays detectable.
pub fn sync_statefulset(found: &mut StatefulSet, desired: &StatefulSet) {
    let owner_rv = found
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(OWNER_RV_LABEL))
        .cloned();
    let mut labels = desired.metadata.labels.clone().unwrap_or_default();
    if let Some(rv) = owner_rv {
        labels.insert(OWNER_RV_LABEL.to_string(), rv);
    }
    found.metadata.labels = Some(labels);

    if let Some(desired_spec) = &desired.spec {
        let spec = found.spec.get_or_insert_with(Default::default);
        spec.replicas = desired_spec.replicas;
        spec.template = desired_spec.template.clone();
        spec.update_strategy = desired_spec.update_strategy.clone();
    }
}

fn generate_pod_template(resource: &ZookeeperCluster) -> PodTemplateSpec {
    let mut labels = standard_labels(resource);
    labels.extend(resource.spec.pod.labels.clone());

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            generate_name: Some(resource.name_any()),
            labels: Some(labels),
            annotations: non_empty(&resource.spec.pod.annotations),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(resource.spec.pod.service_account_name.clone()),
            termination_grace_period_seconds: Some(
                resource.spec.pod.termination_grace_period_seconds,
            ),
            affinity: Some(generate_affinity(resource)),
            containers: vec![generate_zookeeper_container(resource)],
            volumes: Some(generate_volumes(resource)),
            node_selector: non_empty(&resource.spec.pod.node_selector),
            tolerations: convert_tolerations(&resource.spec.pod.tolerations),
            image_pull_secrets: convert_pull_secrets(&resource.spec.pod.image_pull_secrets),
            ..Default::default()
        }),
    }
}

/// Convert CRD tolerations to k8s-openapi Tolerations.
fn convert_tolerations(crd_tolerations: &[crate::crd::Toleration]) -> Option<Vec<Toleration>> {
    if crd_tolerations.is_empty() {
        return None;
    }

    Some(
        crd_tolerations
            .iter()
            .map(|t| Toleration {
                key: t.key.clone(),
                operator: t.operator.clone(),
                value: t.value.clone(),
                effect: t.effect.clone(),
                toleration_seconds: t.toleration_seconds,
            })
            .collect(),
    )
}

/// Convert pull secret names to LocalObjectReferences.
pub fn convert_pull_secrets(pull_secrets: &[String]) -> Option<Vec<LocalObjectReference>> {
    if pull_secrets.is_empty() {
        return None;
    }

    Some(
        pull_secrets
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect(),
    )
}

/// Prefer spreading members across nodes.
fn generate_affinity(resource: &ZookeeperCluster) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 20,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(pod_selector_labels(resource)),
                            ..Default::default()
                        }),
                        topology_key: "kubernetes.io/hostname".to_string(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn generate_zookeeper_container(resource: &ZookeeperCluster) -> Container {
    let ports = resource.spec.zookeeper_ports();
    let container_port = |name: &str, port: i32| ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        ..Default::default()
    };

    Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(resource.spec.image.to_reference()),
        image_pull_policy: Some(resource.spec.image.pull_policy.clone()),
        command: Some(vec!["/usr/local/bin/zookeeperStart.sh".to_string()]),
        ports: Some(vec![
            container_port(CLIENT_PORT_NAME, ports.client),
            container_port(QUORUM_PORT_NAME, ports.quorum),
            container_port(LEADER_ELECTION_PORT_NAME, ports.leader_election),
            container_port(METRICS_PORT_NAME, ports.metrics),
            container_port(ADMIN_SERVER_PORT_NAME, ports.admin_server),
        ]),
        env: Some(vec![EnvVar {
            name: "ENVOY_SIDECAR_STATUS".to_string(),
            value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                field_ref: Some(k8s_openapi::api::core::v1::ObjectFieldSelector {
                    field_path: "metadata.annotations['sidecar.istio.io/status']".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        resources: generate_resource_requirements(resource),
        volume_mounts: Some(vec![
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: "/data".to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: CONF_VOLUME.to_string(),
                mount_path: "/conf".to_string(),
                ..Default::default()
            },
        ]),
        readiness_probe: Some(exec_probe("zookeeperReady.sh", 10, 10)),
        liveness_probe: Some(exec_probe("zookeeperLive.sh", 10, 10)),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(ExecAction {
                    command: Some(vec!["zookeeperTeardown.sh".to_string()]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn exec_probe(script: &str, initial_delay: i32, period: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![script.to_string()]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(10),
        failure_threshold: Some(3),
        success_threshold: Some(1),
        ..Default::default()
    }
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect(),
    )
}

fn generate_resource_requirements(resource: &ZookeeperCluster) -> Option<ResourceRequirements> {
    let spec = &resource.spec.pod.resources;
    if spec.requests.is_empty() && spec.limits.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: quantities(&spec.requests),
        limits: quantities(&spec.limits),
        ..Default::default()
    })
}

fn generate_volumes(resource: &ZookeeperCluster) -> Vec<Volume> {
    let mut volumes = vec![Volume {
        name: CONF_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(&resource.name_any()),
            ..Default::default()
        }),
        ..Default::default()
    }];

    if let Some(ephemeral) = &resource.spec.ephemeral {
        volumes.push(Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                size_limit: ephemeral.size_limit.clone().map(Quantity),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    volumes
}

/// PVC template. Claims carry `app` and `uid` so they can be found after
/// the StatefulSet is gone.
fn generate_pvc_template(resource: &ZookeeperCluster) -> PersistentVolumeClaim {
    let persistence = resource.spec.persistence.clone().unwrap_or_default();

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            labels: Some(pvc_selector_labels(resource)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: persistence.storage_class_name,
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(persistence.size),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
