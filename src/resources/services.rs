//! Service generation for ZooKeeper ensembles.
//!
//! Creates three services:
//! - **Client Service**: client connections (`<name>-client`)
//! - **Headless Service**: stable member DNS for the quorum (`<name>-headless`)
//! - **Admin Server Service**: the AdminServer HTTP endpoint (`<name>-admin-server`)

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{
    ADMIN_SERVER_PORT_NAME, CLIENT_PORT_NAME, LEADER_ELECTION_PORT_NAME, METRICS_PORT_NAME,
    QUORUM_PORT_NAME, ServicePolicy, ZookeeperCluster,
};
use crate::resources::common::{
    admin_server_service_name, child_metadata, client_service_name, headless_service_name,
    non_empty, pod_selector_labels,
};

/// External endpoint reported when the client service is not a LoadBalancer
/// or has no ingress yet.
pub const ENDPOINT_NOT_AVAILABLE: &str = "N/A";

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn generate_service(
    resource: &ZookeeperCluster,
    name: String,
    policy: &ServicePolicy,
    spec: ServiceSpec,
) -> Service {
    let mut metadata = child_metadata(resource, name);
    metadata.annotations = non_empty(&policy.annotations);

    Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(pod_selector_labels(resource)),
            ..spec
        }),
        ..Default::default()
    }
}

/// Generate the client Service.
pub fn generate_client_service(resource: &ZookeeperCluster) -> Service {
    let ports = resource.spec.zookeeper_ports();
    let policy = &resource.spec.client_service;

    generate_service(
        resource,
        client_service_name(&resource.name_any()),
        policy,
        ServiceSpec {
            type_: Some(
                policy
                    .service_type
                    .clone()
                    .unwrap_or_else(|| "ClusterIP".to_string()),
            ),
            ports: Some(vec![service_port(CLIENT_PORT_NAME, ports.client)]),
            ..Default::default()
        },
    )
}

/// Generate the headless Service governing the StatefulSet.
///
/// Not-ready addresses are published so members can resolve each other
/// while the quorum forms.
pub fn generate_headless_service(resource: &ZookeeperCluster) -> Service {
    let ports = resource.spec.zookeeper_ports();

    generate_service(
        resource,
        headless_service_name(&resource.name_any()),
        &resource.spec.headless_service,
        ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            ports: Some(vec![
                service_port(CLIENT_PORT_NAME, ports.client),
                service_port(QUORUM_PORT_NAME, ports.quorum),
                service_port(LEADER_ELECTION_PORT_NAME, ports.leader_election),
                service_port(METRICS_PORT_NAME, ports.metrics),
                service_port(ADMIN_SERVER_PORT_NAME, ports.admin_server),
            ]),
            ..Default::default()
        },
    )
}

/// Generate the admin server Service.
pub fn generate_admin_server_service(resource: &ZookeeperCluster) -> Service {
    let ports = resource.spec.zookeeper_ports();
    let policy = &resource.spec.admin_server_service;
    let type_ = if policy.external {
        "LoadBalancer"
    } else {
        "ClusterIP"
    };

    generate_service(
        resource,
        admin_server_service_name(&resource.name_any()),
        policy,
        ServiceSpec {
            type_: Some(type_.to_string()),
            ports: Some(vec![service_port(ADMIN_SERVER_PORT_NAME, ports.admin_server)]),
            ..Default::default()
        },
    )
}

/// Merge the desired Service into the live one.
///
/// Copies ports, type, annotations and labels. Allocated cluster IPs are
/// immutable and stay untouched.
pub fn sync_service(found: &mut Service, desired: &Service) {
    found.metadata.labels = desired.metadata.labels.clone();
    found.metadata.annotations = desired.metadata.annotations.clone();

    if let Some(desired_spec) = &desired.spec {
        let spec = found.spec.get_or_insert_with(Default::default);
        spec.ports = desired_spec.ports.clone();
        spec.type_ = desired_spec.type_.clone();
    }
}

/// Internal and external client endpoints of a live client Service.
pub fn client_endpoints(svc: &Service, client_port: i32) -> (String, String) {
    let spec = svc.spec.as_ref();
    let cluster_ip = spec
        .and_then(|s| s.cluster_ip.clone())
        .unwrap_or_default();
    let internal = format!("{cluster_ip}:{client_port}");

    let is_load_balancer = spec
        .and_then(|s| s.type_.as_deref())
        .is_some_and(|t| t == "LoadBalancer");
    let ingress_ip = svc
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .and_then(|i| i.ip.clone());

    let external = match ingress_ip {
        Some(ip) if is_load_balancer => format!("{ip}:{client_port}"),
        _ => ENDPOINT_NOT_AVAILABLE.to_string(),
    };

    (internal, external)
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
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};

    #[test]
    fn test_generate_client_service() {
        let resource = test_resource("zk");
        let svc = generate_client_service(&resource);

        assert_eq!(svc.metadata.name, Some("zk-client".to_string()));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_, Some("ClusterIP".to_string()));
        assert_eq!(spec.ports.unwrap()[0].port, 2181);
        assert_eq!(spec.selector.unwrap().get("app"), Some(&"zk".to_string()));
    }

    #[test]
    fn test_generate_headless_service() {
        let resource = test_resource("zk");
        let svc = generate_headless_service(&resource);

        assert_eq!(svc.metadata.name, Some("zk-headless".to_string()));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip, Some("None".to_string()));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        assert_eq!(spec.ports.unwrap().len(), 5);
    }

    #[test]
    fn test_admin_service_external() {
        let mut resource = test_resource("zk");
        resource.spec.admin_server_service.external = true;
        let svc = generate_admin_server_service(&resource);

        assert_eq!(svc.metadata.name, Some("zk-admin-server".to_string()));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_, Some("LoadBalancer".to_string()));
        assert_eq!(spec.ports.unwrap()[0].port, 8080);
    }

    #[test]
    fn test_client_service_annotations() {
        let mut resource = test_resource("zk");
        resource
            .spec
            .client_service
            .annotations
            .insert("a".to_string(), "b".to_string());
        let svc = generate_client_service(&resource);
        assert_eq!(
            svc.metadata.annotations.unwrap().get("a"),
            Some(&"b".to_string())
        );
    }

    #[test]
    fn test_sync_service_keeps_cluster_ip() {
        let resource = test_resource("zk");
        let mut found = generate_client_service(&resource);
        found.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.7".to_string());

        let mut changed = resource.clone();
        changed.spec.client_service.service_type = Some("LoadBalancer".to_string());
        sync_service(&mut found, &generate_client_service(&changed));

        let spec = found.spec.unwrap();
        assert_eq!(spec.cluster_ip, Some("10.0.0.7".to_string()));
        assert_eq!(spec.type_, Some("LoadBalancer".to_string()));
    }

    #[test]
    fn test_client_endpoints_cluster_ip() {
        let resource = test_resource("zk");
        let mut svc = generate_client_service(&resource);
        svc.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.7".to_string());

        let (internal, external) = client_endpoints(&svc, 2181);
        assert_eq!(internal, "10.0.0.7:2181");
        assert_eq!(external, "N/A");
    }

    #[test]
    fn test_client_endpoints_load_balancer() {
        let mut resource = test_resource("zk");
        resource.spec.client_service.service_type = Some("LoadBalancer".to_string());
        let mut svc = generate_client_service(&resource);
        svc.spec.as_mut().unwrap().cluster_ip = Some("10.0.0.7".to_string());
        svc.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some("34.1.2.3".to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });

        let (_, external) = client_endpoints(&svc, 2181);
        assert_eq!(external, "34.1.2.3:2181");
    }
}
