//! [`MetadataClient`] backed by a live ZooKeeper ensemble.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use zookeeper_client as zkc;

use super::{MetadataClient, MetadataError, MetadataSession, cluster_size_payload};
use crate::crd::ZookeeperCluster;

/// Upper bound on establishing a session.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to ZooKeeper with the `zookeeper-client` crate.
#[derive(Clone, Debug, Default)]
pub struct ZkMetadataClient;

impl ZkMetadataClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataClient for ZkMetadataClient {
    async fn connect(&self, address: &str) -> Result<Box<dyn MetadataSession>, MetadataError> {
        let client = tokio::time::timeout(CONNECT_TIMEOUT, zkc::Client::connect(address))
            .await
            .map_err(|_| MetadataError::Connection(address.to_string()))?
            .map_err(|e| {
                debug!(address = %address, error = %e, "ZooKeeper connect failed");
                MetadataError::Connection(address.to_string())
            })?;
        Ok(Box::new(ZkSession { client }))
    }
}

struct ZkSession {
    client: zkc::Client,
}

fn map_error(path: &str, error: zkc::Error) -> MetadataError {
    match error {
        zkc::Error::NoNode => MetadataError::NoNode(path.to_string()),
        zkc::Error::BadVersion => MetadataError::BadVersion(path.to_string()),
        other => MetadataError::Request(format!("{path}: {other}")),
    }
}

/// Every proper prefix of `path`, shortest first (`/a/b/c` -> `/a`, `/a/b`).
fn parent_paths(path: &str) -> Vec<String> {
    let mut parents = Vec::new();
    let mut current = String::new();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in segments.iter().take(segments.len().saturating_sub(1)) {
        current.push('/');
        current.push_str(segment);
        parents.push(current.clone());
    }
    parents
}

impl ZkSession {
    async fn create_persistent(&self, path: &str, data: &[u8]) -> Result<(), MetadataError> {
        let options = zkc::CreateMode::Persistent.with_acls(zkc::Acls::anyone_all());
        match self.client.create(path, data, &options).await {
            Ok(_) | Err(zkc::Error::NodeExists) => Ok(()),
            Err(e) => Err(map_error(path, e)),
        }
    }
}

#[async_trait]
impl MetadataSession for ZkSession {
    async fn node_exists(&mut self, path: &str) -> Result<i32, MetadataError> {
        match self.client.check_stat(path).await {
            Ok(Some(stat)) => Ok(stat.version),
            Ok(None) => Err(MetadataError::NoNode(path.to_string())),
            Err(e) => Err(map_error(path, e)),
        }
    }

    async fn create_node(
        &mut self,
        cluster: &ZookeeperCluster,
        path: &str,
    ) -> Result<(), MetadataError> {
        for parent in parent_paths(path) {
            self.create_persistent(&parent, &[]).await?;
        }
        let payload = cluster_size_payload(cluster.spec.replicas);
        self.create_persistent(path, payload.as_bytes()).await
    }

    async fn update_node(
        &mut self,
        path: &str,
        payload: &str,
        version: i32,
    ) -> Result<(), MetadataError> {
        self.client
            .set_data(path, payload.as_bytes(), Some(version))
            .await
            .map(|_| ())
            .map_err(|e| map_error(path, e))
    }

    async fn close(self: Box<Self>) {
        // Dropping the last handle closes the session.
        drop(self.client);
    }
}
