//! In-memory [`MetadataClient`] for exercising reconcile stages without an
//! ensemble. Records every call so tests can assert on ordering.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{MetadataClient, MetadataError, MetadataSession, cluster_size_payload};
use crate::crd::ZookeeperCluster;

/// A recorded metadata operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataCall {
    Connect(String),
    NodeExists(String),
    CreateNode(String),
    UpdateNode { path: String, payload: String, version: i32 },
    Close,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, (String, i32)>,
    calls: Vec<MetadataCall>,
    fail_connect: bool,
    fail_update: bool,
}

/// Shared, cloneable in-memory ZooKeeper namespace.
#[derive(Clone, Debug, Default)]
pub struct MemoryMetadataClient {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryMetadataClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail.
    pub fn fail_connect(&self, fail: bool) {
        lock(&self.state).fail_connect = fail;
    }

    /// Make subsequent `update_node` calls fail.
    pub fn fail_update(&self, fail: bool) {
        lock(&self.state).fail_update = fail;
    }

    /// Seed a node.
    pub fn put_node(&self, path: &str, data: &str) {
        lock(&self.state)
            .nodes
            .insert(path.to_string(), (data.to_string(), 0));
    }

    /// Data and version at `path`.
    pub fn node(&self, path: &str) -> Option<(String, i32)> {
        lock(&self.state).nodes.get(path).cloned()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<MetadataCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

#[async_trait]
impl MetadataClient for MemoryMetadataClient {
    async fn connect(&self, address: &str) -> Result<Box<dyn MetadataSession>, MetadataError> {
        let mut state = lock(&self.state);
        state.calls.push(MetadataCall::Connect(address.to_string()));
        if state.fail_connect {
            return Err(MetadataError::Connection(address.to_string()));
        }
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl MetadataSession for MemorySession {
    async fn node_exists(&mut self, path: &str) -> Result<i32, MetadataError> {
        let mut state = lock(&self.state);
        state.calls.push(MetadataCall::NodeExists(path.to_string()));
        state
            .nodes
            .get(path)
            .map(|(_, version)| *version)
            .ok_or_else(|| MetadataError::NoNode(path.to_string()))
    }

    async fn create_node(
        &mut self,
        cluster: &ZookeeperCluster,
        path: &str,
    ) -> Result<(), MetadataError> {
        let mut state = lock(&self.state);
        state.calls.push(MetadataCall::CreateNode(path.to_string()));
        let payload = cluster_size_payload(cluster.spec.replicas);
        state
            .nodes
            .entry(path.to_string())
            .or_insert((payload, 0));
        Ok(())
    }

    async fn update_node(
        &mut self,
        path: &str,
        payload: &str,
        version: i32,
    ) -> Result<(), MetadataError> {
        let mut state = lock(&self.state);
        state.calls.push(MetadataCall::UpdateNode {
            path: path.to_string(),
            payload: payload.to_string(),
            version,
        });
        if state.fail_update {
            return Err(MetadataError::Request(format!("{path}: injected failure")));
        }
        match state.nodes.get_mut(path) {
            Some((data, current)) if *current == version => {
                *data = payload.to_string();
                *current += 1;
                Ok(())
            }
            Some(_) => Err(MetadataError::BadVersion(path.to_string())),
            None => Err(MetadataError::NoNode(path.to_string())),
        }
    }

    async fn close(self: Box<Self>) {
        lock(&self.state).calls.push(MetadataCall::Close);
    }
}
