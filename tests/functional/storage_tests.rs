//! Finalizer handling and PVC cleanup.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::controller::Action;
use zookeeper_operator::OperatorConfig;
use zookeeper_operator::controller::error::Error;
use zookeeper_operator::controller::storage::PVC_FINALIZER;
use zookeeper_operator::crd::VolumeReclaimPolicy;

use crate::common::fixtures::ZookeeperClusterBuilder;
use crate::harness::Harness;

fn deletable(replicas: i32) -> Harness {
    Harness::new(
        ZookeeperClusterBuilder::new("zk")
            .namespace("default")
            .uid("zk-uid")
            .replicas(replicas)
            .reclaim_policy(VolumeReclaimPolicy::Delete)
            .build(),
    )
}

fn finalizers(h: &Harness) -> Vec<String> {
    h.cluster().metadata.finalizers.unwrap_or_default()
}

#[tokio::test]
async fn test_delete_policy_adds_finalizer() {
    let h = deletable(3);
    h.reconcile().await.unwrap();
    assert_eq!(finalizers(&h), vec![PVC_FINALIZER.to_string()]);

    h.store.clear_ops();
    h.reconcile().await.unwrap();
    assert_eq!(finalizers(&h), vec![PVC_FINALIZER.to_string()]);
    assert!(h.store.ops_for("replace", "ZookeeperCluster").is_empty());
}

#[tokio::test]
async fn test_retain_policy_never_adds_finalizer() {
    let h = Harness::new(
        ZookeeperClusterBuilder::new("zk")
            .namespace("default")
            .build(),
    );
    h.converge().await;
    assert!(finalizers(&h).is_empty());
}

#[tokio::test]
async fn test_disabled_finalizer_not_added() {
    let config = OperatorConfig {
        disable_finalizer: true,
        ..Default::default()
    };
    let h = Harness::with_config(
        ZookeeperClusterBuilder::new("zk")
            .namespace("default")
            .reclaim_policy(VolumeReclaimPolicy::Delete)
            .build(),
        config,
    );
    h.converge().await;
    assert!(finalizers(&h).is_empty());
}

#[tokio::test]
async fn test_stale_finalizer_removed_under_retain() {
    let h = deletable(3);
    h.reconcile().await.unwrap();
    assert!(!finalizers(&h).is_empty());

    h.update_cluster(|c| {
        c.spec.persistence.as_mut().unwrap().reclaim_policy = VolumeReclaimPolicy::Retain;
    });
    h.reconcile().await.unwrap();

    assert!(finalizers(&h).is_empty());
}

#[tokio::test]
async fn test_deletion_removes_claims_before_finalizer() {
    let h = deletable(3);
    h.bring_up().await;
    h.add_pvcs(3);

    h.delete_cluster().await;
    h.store.clear_ops();
    let action = h.reconcile().await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(h.pvc_names().is_empty());
    assert!(h.try_cluster().is_none(), "cluster should be gone once the finalizer is removed");

    let ops = h.store.ops();
    let last_pvc_delete = ops
        .iter()
        .rposition(|op| op.verb == "delete" && op.kind == "PersistentVolumeClaim")
        .unwrap();
    let finalizer_removal = ops
        .iter()
        .position(|op| op.verb == "replace" && op.kind == "ZookeeperCluster")
        .unwrap();
    assert!(last_pvc_delete < finalizer_removal);
    assert_eq!(h.store.ops_for("delete", "PersistentVolumeClaim").len(), 3);
}

#[tokio::test]
async fn test_failed_claim_delete_keeps_finalizer() {
    let h = deletable(3);
    h.bring_up().await;
    h.add_pvcs(3);
    h.store.fail_delete("PersistentVolumeClaim", "data-zk-1");

    h.delete_cluster().await;
    let err = h.reconcile().await.unwrap_err();

    assert!(matches!(err, Error::Transient(ref msg) if msg.contains("data-zk-1")));
    assert!(err.is_retryable());
    assert_eq!(finalizers(&h), vec![PVC_FINALIZER.to_string()]);
    assert_eq!(h.pvc_names(), vec!["data-zk-1"]);

    h.store.clear_delete_failures();
    h.reconcile().await.unwrap();
    assert!(h.try_cluster().is_none());
    assert!(h.pvc_names().is_empty());
}

#[tokio::test]
async fn test_deleting_cluster_skips_children() {
    let h = deletable(3);
    h.reconcile().await.unwrap();
    h.delete_cluster().await;
    h.store.clear_ops();

    h.reconcile().await.unwrap();

    assert!(h.store.ops_for("replace", "StatefulSet").is_empty());
    assert!(h.store.ops_for("create", "Service").is_empty());
    assert!(h.store.ops_for("replace_status", "ZookeeperCluster").is_empty());
}

#[tokio::test]
async fn test_retained_claims_survive_deletion() {
    let h = Harness::new(
        ZookeeperClusterBuilder::new("zk")
            .namespace("default")
            .uid("zk-uid")
            .build(),
    );
    h.bring_up().await;
    h.add_pvcs(3);

    h.delete_cluster().await;
    assert!(h.try_cluster().is_none());
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.pvc_names().len(), 3);
}

#[tokio::test]
async fn test_orphan_claims_deleted_after_scale_down() {
    let h = deletable(5);
    h.bring_up().await;
    h.add_pvcs(5);

    h.update_cluster(|c| c.spec.replicas = 3);
    h.reconcile().await.unwrap();
    // Ready count still reflects five members: nothing is deleted yet.
    assert_eq!(h.pvc_names().len(), 5);

    h.set_rollout(3, 3, 3, "rev-1", "rev-1");
    h.reconcile().await.unwrap();
    h.reconcile().await.unwrap();

    assert_eq!(h.pvc_names(), vec!["data-zk-0", "data-zk-1", "data-zk-2"]);
    let deleted: Vec<String> = h
        .store
        .ops_for("delete", "PersistentVolumeClaim")
        .into_iter()
        .map(|op| op.name)
        .collect();
    assert_eq!(deleted, vec!["data-zk-3", "data-zk-4"]);
}

#[tokio::test]
async fn test_orphan_cleanup_tolerates_delete_failure() {
    let h = deletable(3);
    h.bring_up().await;
    h.add_pvcs(5);
    h.store.fail_delete("PersistentVolumeClaim", "data-zk-3");

    h.reconcile().await.unwrap();

    assert_eq!(
        h.pvc_names(),
        vec!["data-zk-0", "data-zk-1", "data-zk-2", "data-zk-3"]
    );
}

#[tokio::test]
async fn test_claims_of_other_clusters_untouched() {
    let h = deletable(3);
    h.bring_up().await;
    h.add_pvcs(3);
    let foreign = PersistentVolumeClaim {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some("data-other-0".to_string()),
            labels: Some(
                [("app".to_string(), "other".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    };
    h.store.put("default", &foreign).unwrap();

    h.delete_cluster().await;
    h.reconcile().await.unwrap();

    assert!(h.store.peek::<PersistentVolumeClaim>("default", "data-other-0").is_some());
}
