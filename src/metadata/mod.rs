//! ZooKeeper metadata store access.
//!
//! The operator keeps one znode per cluster at `/zookeeper-operator/<name>`
//! holding `CLUSTER_SIZE=<replicas>`. Ensemble members read it on startup to
//! decide whether to join as participants or observers.
//!
//! Access goes through the [`MetadataClient`] / [`MetadataSession`] traits so
//! reconcile stages can be exercised against [`memory::MemoryMetadataClient`].

pub mod memory;
pub mod zk;

use async_trait::async_trait;
use thiserror::Error;

use crate::crd::ZookeeperCluster;

pub use memory::MemoryMetadataClient;
pub use zk::ZkMetadataClient;

/// Root znode under which cluster metadata lives.
pub const METADATA_ROOT: &str = "/zookeeper-operator";

/// Errors talking to the ZooKeeper ensemble.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to connect to {0}")]
    Connection(String),

    #[error("node {0} does not exist")]
    NoNode(String),

    #[error("version mismatch updating {0}")]
    BadVersion(String),

    #[error("zookeeper request failed: {0}")]
    Request(String),
}

/// Opens sessions against a ZooKeeper ensemble.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Connect to `address` (`host:port`).
    async fn connect(&self, address: &str) -> Result<Box<dyn MetadataSession>, MetadataError>;
}

/// An open ZooKeeper session.
#[async_trait]
pub trait MetadataSession: Send {
    /// Version of the node at `path`. Fails with [`MetadataError::NoNode`] if absent.
    async fn node_exists(&mut self, path: &str) -> Result<i32, MetadataError>;

    /// Create the metadata node for `cluster` at `path`, creating parents as
    /// needed. An already existing node is not an error.
    async fn create_node(
        &mut self,
        cluster: &ZookeeperCluster,
        path: &str,
    ) -> Result<(), MetadataError>;

    /// Replace the data at `path` if its version still matches.
    async fn update_node(
        &mut self,
        path: &str,
        payload: &str,
        version: i32,
    ) -> Result<(), MetadataError>;

    /// Close the session.
    async fn close(self: Box<Self>);
}

/// Metadata znode path for a cluster.
pub fn metadata_path(cluster_name: &str) -> String {
    format!("{METADATA_ROOT}/{cluster_name}")
}

/// Payload stored in the metadata node.
pub fn cluster_size_payload(replicas: i32) -> String {
    format!("CLUSTER_SIZE={replicas}")
}

/// Client address of the ensemble: `<name>-client.<ns>.svc.<domain>:<port>`.
pub fn service_uri(cluster: &ZookeeperCluster) -> String {
    use kube::ResourceExt;

    format!(
        "{}.{}.svc.{}:{}",
        crate::resources::common::client_service_name(&cluster.name_any()),
        cluster.namespace().unwrap_or_default(),
        cluster.spec.kubernetes_cluster_domain,
        cluster.spec.zookeeper_ports().client
    )
}
