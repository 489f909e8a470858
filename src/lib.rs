//! zookeeper-operator library crate
//!
//! This module exports the controller, CRD definitions, object stores,
//! metadata access and resource generators.

pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod metadata;
pub mod resources;
pub mod store;

pub use config::OperatorConfig;
pub use health::HealthState;

use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{
    Controller, PredicateConfig, WatchStreamExt, metadata_watcher, predicates, reflector, watcher,
};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use controller::{context::Context, reconciler::reconcile};
use crd::ZookeeperCluster;

/// `Api::namespaced` for `Some(ns)`, `Api::all` otherwise.
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Watcher settings shared by every watch the controller opens.
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Reflector-backed watch of the primary kind. Status-only writes do not
/// bump `metadata.generation`, so the predicate drops them and the
/// operator's own status updates do not retrigger reconciles.
fn create_filtered_stream<K>(
    api: Api<K>,
    watcher_config: WatcherConfig,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>>,
)
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug + Send + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (reader, writer) = reflector::store();
    let stream = reflector(writer, watcher(api, watcher_config))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation, PredicateConfig::default());
    (reader, stream)
}

/// Run the operator controllers for every configured namespace.
///
/// An empty `watch_namespaces` runs a single cluster-wide controller;
/// otherwise one controller per namespace runs in this task.
pub async fn run_controller(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) {
    if config.is_cluster_wide() {
        run_controller_scoped(client, config, health_state, None).await;
        return;
    }

    let namespaces = config.watch_namespaces.clone();
    futures::future::join_all(namespaces.iter().map(|ns| {
        run_controller_scoped(
            client.clone(),
            config.clone(),
            health_state.clone(),
            Some(ns.as_str()),
        )
    }))
    .await;
}

/// Run one controller over `namespace`, or over every namespace for `None`.
/// Integration tests run one of these per test namespace.
pub async fn run_controller_scoped(
    client: Client,
    config: OperatorConfig,
    health_state: Option<Arc<HealthState>>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    info!(scope = %scope_msg, "Starting controller for ZookeeperCluster resources");

    if let Some(ref state) = health_state {
        state.set_ready(true).await;
    }

    let ctx = Arc::new(Context::new(client.clone(), config, health_state));

    let clusters: Api<ZookeeperCluster> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let pdbs: Api<PodDisruptionBudget> = scoped_api(client.clone(), namespace);

    let watcher_config = default_watcher_config();
    let (reader, cluster_stream) = create_filtered_stream(clusters, watcher_config.clone());

    // Full watcher for StatefulSets: rollout progress lives in their status.
    // The other owned kinds only need to signal that they changed.
    Controller::for_stream(cluster_stream, reader)
        .owns(statefulsets, watcher_config.clone())
        .owns_stream(metadata_watcher(services, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(configmaps, watcher_config.clone()).touched_objects())
        .owns_stream(metadata_watcher(pdbs, watcher_config).touched_objects())
        .run(reconcile, controller::reconciler::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!(name = %obj.name, "Reconciled");
                }
                Err(e) => {
                    // Related watch events can arrive after the cluster is gone.
                    let is_not_found = match &e {
                        kube::runtime::controller::Error::ObjectNotFound(_) => true,
                        kube::runtime::controller::Error::ReconcilerFailed(err, _) => {
                            err.is_not_found()
                        }
                        _ => false,
                    };
                    if is_not_found {
                        debug!("Object no longer exists (likely deleted): {:?}", e);
                    } else {
                        error!("Reconciliation error: {:?}", e);
                    }
                }
            }
        })
        .await;

    error!(scope = %scope_msg, "Controller stream ended unexpectedly");
}
