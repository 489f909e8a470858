//! Get-or-create-or-merge protocol for owned child objects.

use std::fmt::Debug;

use kube::Resource;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::store::ObjectStore;

/// What [`sync_child`] did to the live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Result of a sync: the outcome, the object as fetched (absent when it was
/// created) and the object as stored afterwards.
#[derive(Debug, Clone)]
pub struct Synced<K> {
    pub outcome: SyncOutcome,
    pub found: Option<K>,
    pub current: K,
}

/// Converge one child object.
///
/// Creates `desired` when no object of that name exists. Otherwise merges
/// `desired` into the fetched object and replaces it only if the merge
/// changed anything.
pub async fn sync_child<K, F>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    desired: &K,
    merge: F,
) -> Result<Synced<K>>
where
    K: Resource<DynamicType = ()> + Clone + PartialEq + Debug + Send + Sync + 'static,
    F: FnOnce(&mut K, &K),
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
    let kind = K::kind(&());

    let Some(found) = store.get(namespace, &name).await? else {
        info!(kind = %kind, name = %name, namespace = %namespace, "Creating");
        let created = store.create(namespace, desired).await?;
        return Ok(Synced {
            outcome: SyncOutcome::Created,
            found: None,
            current: created,
        });
    };

    update_child(store, namespace, found, desired, merge).await
}

/// Merge `desired` into an already fetched object and replace it if the
/// merge changed anything.
pub async fn update_child<K, F>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    found: K,
    desired: &K,
    merge: F,
) -> Result<Synced<K>>
where
    K: Resource<DynamicType = ()> + Clone + PartialEq + Debug + Send + Sync + 'static,
    F: FnOnce(&mut K, &K),
{
    let name = found.meta().name.clone().unwrap_or_default();
    let kind = K::kind(&());

    let mut merged = found.clone();
    merge(&mut merged, desired);
    if merged == found {
        debug!(kind = %kind, name = %name, "Up to date");
        return Ok(Synced {
            outcome: SyncOutcome::Unchanged,
            current: found.clone(),
            found: Some(found),
        });
    }

    info!(kind = %kind, name = %name, namespace = %namespace, "Updating");
    let updated = store.replace(namespace, &merged).await?;
    Ok(Synced {
        outcome: SyncOutcome::Updated,
        found: Some(found),
        current: updated,
    })
}
