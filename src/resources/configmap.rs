//! ConfigMap generation for ZooKeeper ensembles.
//!
//! The ConfigMap is mounted at `/conf` and carries `zoo.cfg`, the logging
//! configuration and `env.sh`, which the image's start script sources to
//! learn its service names and ports.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use crate::crd::ZookeeperCluster;
use crate::resources::common::{
    admin_server_service_name, child_metadata, client_service_name, config_map_name,
    headless_service_name,
};

const LOG4J: &str = "\
zookeeper.root.logger=CONSOLE
zookeeper.console.threshold=INFO
log4j.rootLogger=${zookeeper.root.logger}
log4j.appender.CONSOLE=org.apache.log4j.ConsoleAppender
log4j.appender.CONSOLE.Threshold=${zookeeper.console.threshold}
log4j.appender.CONSOLE.layout=org.apache.log4j.PatternLayout
log4j.appender.CONSOLE.layout.ConversionPattern=%d{ISO8601} [myid:%X{myid}] - %-5p [%t:%C{1}@%L] - %m%n
";

const LOG4J_QUIET: &str = "\
log4j.rootLogger=ERROR, CONSOLE
log4j.appender.CONSOLE=org.apache.log4j.ConsoleAppender
log4j.appender.CONSOLE.Threshold=ERROR
log4j.appender.CONSOLE.layout=org.apache.log4j.PatternLayout
log4j.appender.CONSOLE.layout.ConversionPattern=%d{ISO8601} [myid:%X{myid}] - %-5p [%t:%C{1}@%L] - %m%n
";

/// Generate the ConfigMap for a ZookeeperCluster.
pub fn generate_configmap(resource: &ZookeeperCluster) -> ConfigMap {
    let name = resource.name_any();

    ConfigMap {
        metadata: child_metadata(resource, config_map_name(&name)),
        data: Some(BTreeMap::from([
            ("zoo.cfg".to_string(), zoo_cfg(resource)),
            ("log4j.properties".to_string(), LOG4J.to_string()),
            ("log4j-quiet.properties".to_string(), LOG4J_QUIET.to_string()),
            ("env.sh".to_string(), env_sh(resource)),
        ])),
        ..Default::default()
    }
}

/// Merge the desired ConfigMap into the live one: data, binaryData, labels.
pub fn sync_configmap(found: &mut ConfigMap, desired: &ConfigMap) {
    found.metadata.labels = desired.metadata.labels.clone();
    found.data = desired.data.clone();
    found.binary_data = desired.binary_data.clone();
}

fn zoo_cfg(resource: &ZookeeperCluster) -> String {
    let config = &resource.spec.config;
    let ports = resource.spec.zookeeper_ports();

    let mut entries: Vec<(String, String)> = vec![
        (
            "4lw.commands.whitelist".to_string(),
            "cons, envi, conf, crst, srvr, stat, mntr, ruok".to_string(),
        ),
        ("dataDir".to_string(), "/data".to_string()),
        ("standaloneEnabled".to_string(), "false".to_string()),
        ("reconfigEnabled".to_string(), "true".to_string()),
        ("skipACL".to_string(), "yes".to_string()),
        (
            "metricsProvider.className".to_string(),
            "org.apache.zookeeper.metrics.prometheus.PrometheusMetricsProvider".to_string(),
        ),
        (
            "metricsProvider.httpPort".to_string(),
            ports.metrics.to_string(),
        ),
        ("initLimit".to_string(), config.init_limit.to_string()),
        ("syncLimit".to_string(), config.sync_limit.to_string()),
        ("tickTime".to_string(), config.tick_time.to_string()),
        (
            "maxClientCnxns".to_string(),
            config.max_client_cnxns.to_string(),
        ),
        (
            "quorumListenOnAllIPs".to_string(),
            config.quorum_listen_on_all_ips.to_string(),
        ),
        ("admin.serverPort".to_string(), ports.admin_server.to_string()),
        (
            "dynamicConfigFile".to_string(),
            "/data/zoo.cfg.dynamic".to_string(),
        ),
    ];

    // User entries override generated ones.
    for (key, value) in &config.additional_config {
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.clone(),
            None => entries.push((key.clone(), value.clone())),
        }
    }

    entries.iter().fold(String::new(), |mut out, (k, v)| {
        let _ = writeln!(out, "{k}={v}");
        out
    })
}

fn env_sh(resource: &ZookeeperCluster) -> String {
    let name = resource.name_any();
    let namespace = resource.namespace().unwrap_or_default();
    let domain = &resource.spec.kubernetes_cluster_domain;
    let ports = resource.spec.zookeeper_ports();

    let mut out = String::from("#!/usr/bin/env bash\n\n");
    let _ = writeln!(
        out,
        "DOMAIN={}.{namespace}.svc.{domain}",
        headless_service_name(&name)
    );
    let _ = writeln!(out, "QUORUM_PORT={}", ports.quorum);
    let _ = writeln!(out, "LEADER_PORT={}", ports.leader_election);
    let _ = writeln!(
        out,
        "CLIENT_HOST={}.{namespace}.svc.{domain}",
        client_service_name(&name)
    );
    let _ = writeln!(out, "CLIENT_PORT={}", ports.client);
    let _ = writeln!(
        out,
        "ADMIN_SERVER_HOST={}.{namespace}.svc.{domain}",
        admin_server_service_name(&name)
    );
    let _ = writeln!(out, "ADMIN_SERVER_PORT={}", ports.admin_server);
    let _ = writeln!(out, "CLUSTER_NAME={name}");
    let _ = writeln!(out, "CLUSTER_SIZE={}", resource.spec.replicas);
    out
}
