//! Custom Resource Definitions (CRDs) for zookeeper-operator.
//!
//! - `ZookeeperCluster`: Deploy and manage a ZooKeeper ensemble

mod conditions;
mod zookeeper_cluster;

pub use conditions::*;
pub use zookeeper_cluster::*;
