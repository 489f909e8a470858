//! Process-wide handle on the test cluster.
//!
//! Connectivity is checked once; every test still builds its own client.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, PostParams};
use kube::{Client, Config, CustomResourceExt};
use tokio::sync::OnceCell;
use zookeeper_operator::crd::ZookeeperCluster;

static SHARED_CLUSTER: OnceCell<Arc<SharedTestCluster>> = OnceCell::const_new();

pub struct SharedTestCluster {
    /// `gitVersion` reported by the API server.
    pub server_version: String,
}

impl SharedTestCluster {
    /// Connect on first use; later calls return the cached handle.
    pub async fn get() -> Arc<SharedTestCluster> {
        SHARED_CLUSTER
            .get_or_init(|| async {
                let cluster = Self::connect()
                    .await
                    .expect("cannot reach Kubernetes; check KUBECONFIG");
                Arc::new(cluster)
            })
            .await
            .clone()
    }

    pub async fn new_client(&self) -> Client {
        let config = Config::infer().await.expect("infer kube config");
        Client::try_from(config).expect("build kube client")
    }

    async fn connect() -> Result<Self, kube::Error> {
        let config = Config::infer()
            .await
            .map_err(|e| kube::Error::Service(std::io::Error::other(e.to_string()).into()))?;
        let version = Client::try_from(config)?.apiserver_version().await?;
        tracing::info!(platform = %version.platform, version = %version.git_version, "Connected to test cluster");
        Ok(Self {
            server_version: version.git_version,
        })
    }
}

/// Install the ZookeeperCluster CRD if the cluster does not have it yet,
/// then wait until the API server reports it established.
pub async fn ensure_cluster_crd_installed(cluster: &SharedTestCluster) -> Result<(), kube::Error> {
    let client = cluster.new_client().await;
    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd = ZookeeperCluster::crd();
    let name = crd.metadata.name.clone().unwrap_or_default();

    match crds.create(&PostParams::default(), &crd).await {
        Ok(_) => tracing::info!(crd = %name, "Installed CRD"),
        Err(kube::Error::Api(e)) if e.code == 409 => {}
        Err(e) => return Err(e),
    }

    for _ in 0..30 {
        let current = crds.get(&name).await?;
        let established = current
            .status
            .and_then(|s| s.conditions)
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Established" && c.status == "True");
        if established {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    tracing::warn!(crd = %name, "CRD not established after 15s");
    Ok(())
}
