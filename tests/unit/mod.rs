//! Unit tests for zookeeper-operator.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation through the public API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

#[path = "../common/mod.rs"]
#[allow(dead_code)]
mod common;

mod crd_tests {
    use jiff::Timestamp;
    use zookeeper_operator::crd::{
        ConditionStatus, ConditionType, Conditions, REASON_UPGRADE_FAILED, ZookeeperClusterStatus,
    };

    fn at(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_condition_type_display() {
        assert_eq!(ConditionType::PodsReady.to_string(), "Ready");
        assert_eq!(ConditionType::Upgrading.to_string(), "Upgrading");
        assert_eq!(ConditionType::Error.to_string(), "Error");
    }

    #[test]
    fn test_init_adds_every_type_once() {
        let mut conditions = Conditions::new();
        conditions.init_at(at("2024-01-01T00:00:00Z"));
        conditions.init_at(at("2024-01-02T00:00:00Z"));

        assert_eq!(conditions.len(), 3);
        for condition in conditions.iter() {
            assert_eq!(condition.status, ConditionStatus::False);
            assert_eq!(condition.last_update_time, Some(at("2024-01-01T00:00:00Z")));
        }
    }

    #[test]
    fn test_transition_time_moves_only_on_flip() {
        let t0 = at("2024-01-01T00:00:00Z");
        let t1 = at("2024-01-01T00:05:00Z");
        let t2 = at("2024-01-01T00:10:00Z");
        let mut conditions = Conditions::new();

        conditions.set_upgrading_at(true, "", "", t0);
        conditions.set_upgrading_at(true, "UpdatingZookeeper", "1", t1);
        let c = conditions.get(ConditionType::Upgrading).unwrap();
        assert_eq!(c.last_transition_time, Some(t0));
        assert_eq!(c.last_update_time, Some(t1));

        conditions.set_upgrading_at(true, "UpdatingZookeeper", "1", t2);
        let c = conditions.get(ConditionType::Upgrading).unwrap();
        assert_eq!(c.last_update_time, Some(t1));

        conditions.set_upgrading_at(false, "", "", t2);
        let c = conditions.get(ConditionType::Upgrading).unwrap();
        assert_eq!(c.last_transition_time, Some(t2));
    }

    #[test]
    fn test_upgrade_failed_requires_reason() {
        let now = at("2024-01-01T00:00:00Z");
        let mut conditions = Conditions::new();
        conditions.set_error_at(true, "SomethingElse", "", now);
        assert!(!conditions.is_upgrade_failed());

        conditions.set_error_at(true, REASON_UPGRADE_FAILED, "", now);
        assert!(conditions.is_upgrade_failed());
    }

    #[test]
    fn test_conditions_serialize_in_first_occurrence_order() {
        let now = at("2024-01-01T00:00:00Z");
        let mut status = ZookeeperClusterStatus::default();
        status.conditions.set_error_at(false, "", "", now);
        status.conditions.set_pods_ready_at(true, now);
        status.conditions.set_upgrading_at(false, "", "", now);

        let json = serde_json::to_value(&status).unwrap();
        let types: Vec<&str> = json["conditions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["Error", "Ready", "Upgrading"]);
        assert_eq!(json["conditions"][1]["status"], "True");

        let parsed: ZookeeperClusterStatus = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_duplicate_conditions_collapse_on_read() {
        let json = serde_json::json!({
            "conditions": [
                {"type": "Ready", "status": "False"},
                {"type": "Ready", "status": "True"}
            ]
        });
        let status: ZookeeperClusterStatus = serde_json::from_value(json).unwrap();
        assert_eq!(status.conditions.len(), 1);
        assert!(status.conditions.is_ready());
    }
}

mod resource_tests {
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use zookeeper_operator::resources::common::{
        admin_server_service_name, client_service_name, config_map_name, headless_service_name,
        pvc_name,
    };
    use zookeeper_operator::resources::configmap::generate_configmap;
    use zookeeper_operator::resources::pdb::generate_pod_disruption_budget;
    use zookeeper_operator::resources::services::{
        generate_admin_server_service, generate_client_service, generate_headless_service,
    };
    use zookeeper_operator::resources::statefulset::generate_statefulset;

    use crate::common::fixtures::{ZookeeperClusterBuilder, test_cluster};

    #[test]
    fn test_child_names() {
        assert_eq!(client_service_name("zk"), "zk-client");
        assert_eq!(headless_service_name("zk"), "zk-headless");
        assert_eq!(admin_server_service_name("zk"), "zk-admin-server");
        assert_eq!(config_map_name("zk"), "zk-configmap");
        assert_eq!(pvc_name("zk", 0), "data-zk-0");
    }

    #[test]
    fn test_children_owned_by_cluster() {
        let cluster = test_cluster("zk", "data");
        let sts = generate_statefulset(&cluster);
        let owners = sts.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "zk-uid");
        assert_eq!(owners[0].controller, Some(true));

        for svc in [
            generate_client_service(&cluster),
            generate_headless_service(&cluster),
            generate_admin_server_service(&cluster),
        ] {
            assert_eq!(svc.metadata.namespace.as_deref(), Some("data"));
            assert!(svc.metadata.owner_references.is_some());
        }
    }

    #[test]
    fn test_zoo_cfg_contains_tuning() {
        let mut cluster = test_cluster("zk", "default");
        cluster.spec.config.tick_time = 3000;
        let cm = generate_configmap(&cluster);
        let zoo_cfg = &cm.data.unwrap()["zoo.cfg"];

        assert!(zoo_cfg.contains("tickTime=3000"));
        assert!(zoo_cfg.contains("initLimit=10"));
        assert!(zoo_cfg.contains("dataDir=/data"));
    }

    #[test]
    fn test_pdb_uses_max_unavailable() {
        let mut cluster = ZookeeperClusterBuilder::new("zk").namespace("default").build();
        cluster.spec.max_unavailable_replicas = 2;
        let pdb = generate_pod_disruption_budget(&cluster);
        assert_eq!(pdb.spec.unwrap().max_unavailable, Some(IntOrString::Int(2)));
    }

    #[test]
    fn test_statefulset_has_claim_template_unless_ephemeral() {
        let mut cluster = test_cluster("zk", "default");
        let sts = generate_statefulset(&cluster);
        assert_eq!(sts.spec.unwrap().volume_claim_templates.unwrap().len(), 1);

        cluster.spec.ephemeral = Some(Default::default());
        let sts = generate_statefulset(&cluster);
        assert!(sts.spec.unwrap().volume_claim_templates.is_none());
    }
}

mod storage_tests {
    use zookeeper_operator::controller::storage::{has_finalizer, is_pvc_orphan, PVC_FINALIZER};

    use crate::common::fixtures::test_cluster;

    #[test]
    fn test_orphan_detection() {
        assert!(!is_pvc_orphan("data-zk-2", 3));
        assert!(is_pvc_orphan("data-zk-3", 3));
        assert!(!is_pvc_orphan("data-zk-abc", 3));
    }

    #[test]
    fn test_has_finalizer() {
        let mut cluster = test_cluster("zk", "default");
        assert!(!has_finalizer(&cluster));
        cluster.metadata.finalizers = Some(vec![PVC_FINALIZER.to_string()]);
        assert!(has_finalizer(&cluster));
    }
}

mod version_tests {
    use std::cmp::Ordering;

    use zookeeper_operator::controller::version::compare_versions;

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(compare_versions(Some("9"), Some("10")), Ordering::Less);
        assert_eq!(compare_versions(Some("10"), Some("9")), Ordering::Greater);
        assert_eq!(compare_versions(Some("10"), Some("10")), Ordering::Equal);
    }

    #[test]
    fn test_missing_label_needs_stamp() {
        assert_eq!(compare_versions(Some("3"), None), Ordering::Greater);
    }

    #[test]
    fn test_unparsable_is_equal() {
        assert_eq!(compare_versions(Some("abc"), Some("10")), Ordering::Equal);
        assert_eq!(compare_versions(None, None), Ordering::Equal);
    }
}

mod upgrade_tests {
    use zookeeper_operator::controller::upgrade_state_machine::{
        UpgradeEvent, UpgradePhase, UpgradeStateMachine,
    };

    #[test]
    fn test_failed_only_leaves_through_recovery() {
        let machine = UpgradeStateMachine::new();
        assert_eq!(
            machine.valid_transitions(UpgradePhase::Failed),
            vec![UpgradePhase::Completed]
        );
        assert!(
            machine
                .transition(UpgradePhase::Failed, UpgradeEvent::RecoveryConfirmed)
                .is_some()
        );
    }

    #[test]
    fn test_stall_only_from_in_progress() {
        let machine = UpgradeStateMachine::new();
        assert!(
            machine
                .transition(UpgradePhase::Triggered, UpgradeEvent::StallTimeout)
                .is_none()
        );
        assert!(
            machine
                .transition(UpgradePhase::InProgress, UpgradeEvent::StallTimeout)
                .is_some()
        );
    }

    #[test]
    fn test_not_upgrading_cannot_fail() {
        let machine = UpgradeStateMachine::new();
        assert!(!machine.can_transition(UpgradePhase::NotUpgrading, UpgradePhase::Failed));
    }
}

mod reconciler_tests {
    use jiff::Timestamp;
    use zookeeper_operator::controller::reconciler::{apply_restart_trigger, restart_timestamp};
    use zookeeper_operator::resources::statefulset::RESTART_TIME_ANNOTATION;

    use crate::common::fixtures::test_cluster;

    #[test]
    fn test_restart_timestamp_is_rfc850_utc() {
        let now: Timestamp = "2023-12-31T23:59:59Z".parse().unwrap();
        assert_eq!(restart_timestamp(now), "Sunday, 31-Dec-23 23:59:59 UTC");
    }

    #[test]
    fn test_restart_trigger_noop_when_unset() {
        let mut cluster = test_cluster("zk", "default");
        assert!(!apply_restart_trigger(&mut cluster, Timestamp::now()));
        assert!(!cluster.spec.pod.annotations.contains_key(RESTART_TIME_ANNOTATION));
    }
}

mod config_tests {
    use zookeeper_operator::OperatorConfig;
    use zookeeper_operator::config::{parse_watch_namespaces, version_info};

    #[test]
    fn test_watch_namespaces() {
        assert!(parse_watch_namespaces(None).is_empty());
        assert!(parse_watch_namespaces(Some("")).is_empty());
        assert_eq!(
            parse_watch_namespaces(Some("a, b,,c ")),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_default_config_is_cluster_wide() {
        let config = OperatorConfig::default();
        assert!(config.is_cluster_wide());
        assert!(!config.disable_finalizer);
    }

    #[test]
    fn test_version_info_names_package() {
        assert!(version_info().starts_with("zookeeper-operator "));
    }
}
