//! Watch-driven waiting.
//!
//! Each helper checks the current object first, then follows a
//! name-scoped watch until the predicate holds or the timeout expires.

use std::fmt::Debug;
use std::time::Duration;

use futures::StreamExt;
use kube::Resource;
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use serde::de::DeserializeOwned;
use tokio::time::timeout;

use zookeeper_operator::crd::ZookeeperCluster;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Object was deleted while waiting")]
    ResourceDeleted,

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Watcher error: {0}")]
    WatcherError(#[from] watcher::Error),

    #[error("Watch stream ended")]
    StreamEnded,
}

fn by_name(name: &str) -> watcher::Config {
    watcher::Config::default().fields(&format!("metadata.name={name}"))
}

/// Wait until `condition` holds for the named object.
pub async fn wait_for_condition<K, F>(
    api: &Api<K>,
    name: &str,
    condition: F,
    timeout_duration: Duration,
) -> Result<K, WaitError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
    <K as Resource>::DynamicType: Default,
    F: Fn(&K) -> bool,
{
    let watch = async {
        if let Ok(current) = api.get(name).await
            && condition(&current)
        {
            return Ok(current);
        }

        let mut stream = watcher::watcher(api.clone(), by_name(name)).boxed();
        while let Some(event) = stream.next().await {
            match event? {
                Event::Apply(obj) | Event::InitApply(obj) if condition(&obj) => return Ok(obj),
                Event::Delete(_) => return Err(WaitError::ResourceDeleted),
                _ => {}
            }
        }
        Err(WaitError::StreamEnded)
    };

    timeout(timeout_duration, watch)
        .await
        .map_err(|_| WaitError::Timeout(timeout_duration))?
}

/// Wait until the named object exists.
pub async fn wait_for_resource<K>(
    api: &Api<K>,
    name: &str,
    timeout_duration: Duration,
) -> Result<K, WaitError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
    <K as Resource>::DynamicType: Default,
{
    wait_for_condition(api, name, |_| true, timeout_duration).await
}

/// Wait until the named object is gone.
pub async fn wait_for_deletion<K>(
    api: &Api<K>,
    name: &str,
    timeout_duration: Duration,
) -> Result<(), WaitError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + 'static,
    <K as Resource>::DynamicType: Default,
{
    let watch = async {
        match api.get(name).await {
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
            Err(e) => return Err(WaitError::KubeError(e)),
            Ok(_) => {}
        }

        let mut stream = watcher::watcher(api.clone(), by_name(name)).boxed();
        while let Some(event) = stream.next().await {
            if let Event::Delete(_) = event? {
                return Ok(());
            }
        }
        Err(WaitError::StreamEnded)
    };

    timeout(timeout_duration, watch)
        .await
        .map_err(|_| WaitError::Timeout(timeout_duration))?
}

/// Ready condition is True.
pub fn is_ready(cluster: &ZookeeperCluster) -> bool {
    cluster
        .status
        .as_ref()
        .is_some_and(|s| s.conditions.is_ready())
}

pub fn has_ready_replicas(cluster: &ZookeeperCluster, count: i32) -> bool {
    cluster
        .status
        .as_ref()
        .is_some_and(|s| s.ready_replicas >= count)
}

/// The status carries the in-cluster client endpoint.
pub fn has_internal_endpoint(cluster: &ZookeeperCluster) -> bool {
    cluster
        .status
        .as_ref()
        .is_some_and(|s| !s.internal_client_endpoint.is_empty())
}

/// Wait for the Ready condition with every member ready.
pub async fn wait_for_ready(
    api: &Api<ZookeeperCluster>,
    name: &str,
    timeout_duration: Duration,
) -> Result<ZookeeperCluster, WaitError> {
    wait_for_condition(
        api,
        name,
        |c| is_ready(c) && has_ready_replicas(c, c.spec.replicas),
        timeout_duration,
    )
    .await
}
