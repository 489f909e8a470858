//! In-memory [`ObjectStore`] that behaves like a tiny API server.
//!
//! - Every write bumps a store-wide resource version counter.
//! - `replace` with a stale `resourceVersion` fails with a 409 conflict.
//! - `replace` keeps the stored status; `replace_status` only touches status.
//! - Deleting an object with finalizers marks it for deletion; it disappears
//!   once the last finalizer is removed.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ObjectStore;
use crate::controller::error::{Error, Result};

type Key = (String, String, String);

/// A write recorded by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOp {
    pub verb: &'static str,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    revision: u64,
    ops: Vec<StoreOp>,
    fail_deletes: BTreeMap<(String, String), String>,
}

/// Shared, cloneable in-memory object store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).to_string()
}

fn name_of(value: &Value) -> Result<String> {
    value
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))
}

fn resource_version(value: &Value) -> Option<&str> {
    value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
}

fn has_finalizers(value: &Value) -> bool {
    value
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .is_some_and(|f| !f.is_empty())
}

fn is_deleting(value: &Value) -> bool {
    value
        .pointer("/metadata/deletionTimestamp")
        .is_some_and(|v| !v.is_null())
}

fn labels_match(value: &Value, labels: &BTreeMap<String, String>) -> bool {
    let Some(actual) = value.pointer("/metadata/labels").and_then(Value::as_object) else {
        return labels.is_empty();
    };
    labels
        .iter()
        .all(|(k, v)| actual.get(k).and_then(Value::as_str) == Some(v.as_str()))
}

fn set_metadata(value: &mut Value, field: &str, new: Value) {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.insert(field.to_string(), new);
    }
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }

    fn record(&mut self, verb: &'static str, kind: &str, name: &str) {
        self.ops.push(StoreOp {
            verb,
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an object as-is, the way another controller would.
    /// The stored copy gets a fresh resource version, and a uid if it has none.
    pub fn put<K>(&self, namespace: &str, object: &K) -> Result<K>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let mut value = serde_json::to_value(object)?;
        let name = name_of(&value)?;
        let kind = kind_of::<K>();
        let mut state = lock(&self.state);
        let rv = state.next_revision();
        set_metadata(&mut value, "namespace", Value::String(namespace.to_string()));
        set_metadata(&mut value, "resourceVersion", Value::String(rv.clone()));
        if value.pointer("/metadata/uid").is_none_or(Value::is_null) {
            set_metadata(&mut value, "uid", Value::String(format!("uid-{rv}")));
        }
        state
            .objects
            .insert((kind, namespace.to_string(), name), value.clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Read an object without going through the async trait.
    pub fn peek<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        lock(&self.state)
            .objects
            .get(&key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Number of stored objects of kind `K` in `namespace`.
    pub fn count<K>(&self, namespace: &str) -> usize
    where
        K: Resource<DynamicType = ()>,
    {
        let kind = kind_of::<K>();
        lock(&self.state)
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .count()
    }

    /// Writes performed through the [`ObjectStore`] interface.
    pub fn ops(&self) -> Vec<StoreOp> {
        lock(&self.state).ops.clone()
    }

    /// Writes of one verb and kind.
    pub fn ops_for(&self, verb: &str, kind: &str) -> Vec<StoreOp> {
        self.ops()
            .into_iter()
            .filter(|op| op.verb == verb && op.kind == kind)
            .collect()
    }

    pub fn clear_ops(&self) {
        lock(&self.state).ops.clear();
    }

    /// Make deletes of `kind/name` fail with a server error.
    pub fn fail_delete(&self, kind: &str, name: &str) {
        lock(&self.state).fail_deletes.insert(
            (kind.to_string(), name.to_string()),
            format!("injected delete failure for {kind}/{name}"),
        );
    }

    pub fn clear_delete_failures(&self) {
        lock(&self.state).fail_deletes.clear();
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore
where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.peek(namespace, name))
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K> {
        let mut value = serde_json::to_value(object)?;
        let name = name_of(&value)?;
        let kind = kind_of::<K>();
        let key = (kind.clone(), namespace.to_string(), name.clone());

        let mut state = lock(&self.state);
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists(&kind, &name));
        }
        let rv = state.next_revision();
        set_metadata(&mut value, "namespace", Value::String(namespace.to_string()));
        set_metadata(&mut value, "resourceVersion", Value::String(rv.clone()));
        if value.pointer("/metadata/uid").is_none_or(Value::is_null) {
            set_metadata(&mut value, "uid", Value::String(format!("uid-{rv}")));
        }
        state.record("create", &kind, &name);
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace(&self, namespace: &str, object: &K) -> Result<K> {
        let mut value = serde_json::to_value(object)?;
        let name = name_of(&value)?;
        let kind = kind_of::<K>();
        let key = (kind.clone(), namespace.to_string(), name.clone());

        let mut state = lock(&self.state);
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(Error::not_found(&kind, &name));
        };
        if let Some(rv) = resource_version(&value)
            && Some(rv) != resource_version(&stored)
        {
            return Err(Error::conflict(&kind, &name));
        }

        if let Some(obj) = value.as_object_mut() {
            match stored.get("status") {
                Some(status) => obj.insert("status".to_string(), status.clone()),
                None => obj.remove("status"),
            };
        }
        for field in ["uid", "deletionTimestamp", "creationTimestamp"] {
            if let Some(v) = stored.pointer(&format!("/metadata/{field}")) {
                set_metadata(&mut value, field, v.clone());
            }
        }

        state.record("replace", &kind, &name);
        if is_deleting(&value) && !has_finalizers(&value) {
            state.objects.remove(&key);
            return Ok(serde_json::from_value(value)?);
        }
        let rv = state.next_revision();
        set_metadata(&mut value, "resourceVersion", Value::String(rv));
        state.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace_status(&self, namespace: &str, object: &K) -> Result<K> {
        let value = serde_json::to_value(object)?;
        let name = name_of(&value)?;
        let kind = kind_of::<K>();
        let key = (kind.clone(), namespace.to_string(), name.clone());

        let mut state = lock(&self.state);
        let Some(mut stored) = state.objects.get(&key).cloned() else {
            return Err(Error::not_found(&kind, &name));
        };
        if let Some(rv) = resource_version(&value)
            && Some(rv) != resource_version(&stored)
        {
            return Err(Error::conflict(&kind, &name));
        }

        if let (Some(obj), Some(status)) = (stored.as_object_mut(), value.get("status")) {
            obj.insert("status".to_string(), status.clone());
        }
        let rv = state.next_revision();
        set_metadata(&mut stored, "resourceVersion", Value::String(rv));
        state.record("replace_status", &kind, &name);
        state.objects.insert(key, stored.clone());
        Ok(serde_json::from_value(stored)?)
    }

    async fn list(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<K>> {
        let kind = kind_of::<K>();
        let state = lock(&self.state);
        state
            .objects
            .iter()
            .filter(|((k, ns, _), v)| *k == kind && ns == namespace && labels_match(v, labels))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(Error::from))
            .collect()
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let kind = kind_of::<K>();
        let key = (kind.clone(), namespace.to_string(), name.to_string());

        let mut state = lock(&self.state);
        if let Some(message) = state.fail_deletes.get(&(kind.clone(), name.to_string())) {
            return Err(Error::internal(message));
        }
        let Some(stored) = state.objects.get(&key).cloned() else {
            return Err(Error::not_found(&kind, name));
        };
        state.record("delete", &kind, name);

        if has_finalizers(&stored) {
            let mut marked = stored;
            let now = Time(jiff::Timestamp::now());
            set_metadata(&mut marked, "deletionTimestamp", serde_json::to_value(now)?);
            let rv = state.next_revision();
            set_metadata(&mut marked, "resourceVersion", Value::String(rv));
            state.objects.insert(key, marked);
        } else {
            state.objects.remove(&key);
        }
        Ok(())
    }
}
