//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler:
//! object stores, the metadata client, operator configuration and the event
//! recorder.

use std::sync::Arc;

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

use crate::config::OperatorConfig;
use crate::crd::ZookeeperCluster;
use crate::health::HealthState;
use crate::metadata::{MetadataClient, ZkMetadataClient};
use crate::store::Stores;

/// Field manager / event reporter name for the operator
pub const FIELD_MANAGER: &str = "zookeeper-operator";

/// Shared context for the controller
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client, absent when running against in-memory stores
    client: Option<Client>,
    /// Object stores for the cluster and every owned kind
    pub stores: Stores,
    /// ZooKeeper metadata store access
    pub metadata: Arc<dyn MetadataClient>,
    pub config: OperatorConfig,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a context backed by the API server.
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance: Some(config.pod_name.clone()),
        };
        Self {
            stores: Stores::kube(client.clone()),
            client: Some(client),
            metadata: Arc::new(ZkMetadataClient::new()),
            config,
            reporter,
            health_state,
        }
    }

    /// Create a context over arbitrary stores. Events are logged only.
    pub fn with_stores(
        stores: Stores,
        metadata: Arc<dyn MetadataClient>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            client: None,
            stores,
            metadata,
            config,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: None,
            },
            health_state: None,
        }
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Option<Recorder> {
        self.client
            .as_ref()
            .map(|client| Recorder::new(client.clone(), self.reporter.clone()))
    }

    async fn publish(
        &self,
        resource: &ZookeeperCluster,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let Some(recorder) = self.recorder() else {
            tracing::debug!(reason = %reason, action = %action, note = ?note, "Event");
            return;
        };
        let object_ref = resource.object_ref(&());
        if let Err(e) = recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.into(),
                    note,
                    action: action.into(),
                    secondary: None,
                },
                &object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }

    /// Publish a normal event for a cluster
    pub async fn publish_normal_event(
        &self,
        resource: &ZookeeperCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Normal, reason, action, note)
            .await;
    }

    /// Publish a warning event for a cluster
    pub async fn publish_warning_event(
        &self,
        resource: &ZookeeperCluster,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.publish(resource, EventType::Warning, reason, action, note)
            .await;
    }
}
