//! Per-test namespaces, removed on drop.
//!
//! Tests holding a `TestNamespace` must run on the multi-thread runtime
//! (`#[tokio::test(flavor = "multi_thread")]`): cleanup blocks inside
//! `Drop` through `block_in_place`.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::{Client, ResourceExt};
use serde_json::json;
use uuid::Uuid;

use zookeeper_operator::crd::ZookeeperCluster;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// A uniquely named namespace owned by one test.
pub struct TestNamespace {
    client: Client,
    name: String,
}

impl TestNamespace {
    /// Create `<prefix>-<8 hex chars>`.
    pub async fn create(client: Client, prefix: &str) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{prefix}-{}", &suffix[..8]);

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some(
                    [(MANAGED_BY_LABEL.to_string(), "integration-test".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        };
        Api::<Namespace>::all(client.clone())
            .create(&PostParams::default(), &ns)
            .await
            .unwrap_or_else(|e| panic!("Failed to create test namespace {name}: {e}"));
        tracing::info!(namespace = %name, "Created test namespace");

        Self { client, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespaced API for any kind inside the test namespace.
    pub fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.name)
    }

    /// Delete the clusters, strip any finalizer the operator could not
    /// remove in time, then delete the namespace itself.
    async fn teardown(client: Client, name: String) {
        let clusters: Api<ZookeeperCluster> = Api::namespaced(client.clone(), &name);
        if let Ok(list) = clusters.list(&Default::default()).await {
            for cluster in &list.items {
                let _ = clusters.delete(&cluster.name_any(), &DeleteParams::default()).await;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        if let Ok(list) = clusters.list(&Default::default()).await {
            let clear = Patch::Merge(json!({"metadata": {"finalizers": null}}));
            for cluster in list.items.iter().filter(|c| !c.finalizers().is_empty()) {
                if let Err(e) = clusters
                    .patch(&cluster.name_any(), &PatchParams::default(), &clear)
                    .await
                {
                    tracing::warn!(cluster = %cluster.name_any(), error = %e, "Failed to clear finalizers");
                }
            }
        }

        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match Api::<Namespace>::all(client).delete(&name, &params).await {
            Ok(_) => tracing::debug!(namespace = %name, "Namespace deletion started"),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => tracing::warn!(namespace = %name, error = %e, "Failed to delete namespace"),
        }
    }
}

impl Drop for TestNamespace {
    fn drop(&mut self) {
        let client = self.client.clone();
        let name = std::mem::take(&mut self.name);
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(Self::teardown(client, name));
        });
    }
}
