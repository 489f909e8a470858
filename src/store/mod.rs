//! Object store seam between reconcile stages and the API server.
//!
//! Stages talk to [`ObjectStore`] rather than `kube::Api` directly so the
//! whole pipeline can run against [`memory::MemoryStore`] in tests.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Pod, Service, ServiceAccount,
};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::controller::error::{Error, Result};
use crate::crd::ZookeeperCluster;

pub use memory::MemoryStore;

/// Namespaced CRUD over one object kind.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Fetch an object. `Ok(None)` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Create an object. Fails if it already exists.
    async fn create(&self, namespace: &str, object: &K) -> Result<K>;

    /// Replace an object. Fails with a conflict if `resourceVersion` is stale.
    async fn replace(&self, namespace: &str, object: &K) -> Result<K>;

    /// Replace the status subresource.
    async fn replace_status(&self, namespace: &str, object: &K) -> Result<K>;

    /// List objects whose labels contain every pair in `labels`.
    async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>>;

    /// Delete an object.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Render a label map as an equality-based selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ObjectStore`] over a live API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name<K: Resource>(object: &K) -> Result<String> {
    object
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        Ok(self
            .api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object_name(object)?;
        Ok(self
            .api::<K>(namespace)
            .replace(&name, &PostParams::default(), object)
            .await?)
    }

    async fn replace_status(&self, namespace: &str, object: &K) -> Result<K> {
        let name = object_name(object)?;
        Ok(self
            .api::<K>(namespace)
            .replace_status(&name, &PostParams::default(), object)
            .await?)
    }

    async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(self.api::<K>(namespace).list(&params).await?.items)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

/// One store handle per kind the reconciler reads or writes.
#[derive(Clone)]
pub struct Stores {
    pub clusters: Arc<dyn ObjectStore<ZookeeperCluster>>,
    pub stateful_sets: Arc<dyn ObjectStore<StatefulSet>>,
    pub services: Arc<dyn ObjectStore<Service>>,
    pub config_maps: Arc<dyn ObjectStore<ConfigMap>>,
    pub pod_disruption_budgets: Arc<dyn ObjectStore<PodDisruptionBudget>>,
    pub service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    pub pvcs: Arc<dyn ObjectStore<PersistentVolumeClaim>>,
    pub pods: Arc<dyn ObjectStore<Pod>>,
}

impl Stores {
    /// Build every handle from one backend that serves all kinds.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: ObjectStore<ZookeeperCluster>
            + ObjectStore<StatefulSet>
            + ObjectStore<Service>
            + ObjectStore<ConfigMap>
            + ObjectStore<PodDisruptionBudget>
            + ObjectStore<ServiceAccount>
            + ObjectStore<PersistentVolumeClaim>
            + ObjectStore<Pod>
            + Clone
            + 'static,
    {
        Self {
            clusters: Arc::new(backend.clone()),
            stateful_sets: Arc::new(backend.clone()),
            services: Arc::new(backend.clone()),
            config_maps: Arc::new(backend.clone()),
            pod_disruption_budgets: Arc::new(backend.clone()),
            service_accounts: Arc::new(backend.clone()),
            pvcs: Arc::new(backend.clone()),
            pods: Arc::new(backend),
        }
    }

    pub fn kube(client: Client) -> Self {
        Self::from_backend(KubeStore::new(client))
    }

    pub fn memory(store: &MemoryStore) -> Self {
        Self::from_backend(store.clone())
    }
}
