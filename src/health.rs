//! Probe and metrics endpoints.
//!
//! - `/healthz`: liveness, 200 while the process serves HTTP
//! - `/readyz`: 200 once this replica leads and its controllers run
//! - `/metrics`: Prometheus text exposition

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Per-cluster label set.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

impl ClusterLabels {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Operator metrics, all keyed by cluster.
pub struct Metrics {
    pub reconciliations_total: Family<ClusterLabels, Counter>,
    pub reconciliation_errors_total: Family<ClusterLabels, Counter>,
    pub reconcile_duration_seconds: Family<ClusterLabels, Histogram>,
    /// Upgrades that hit the progress deadline
    pub upgrades_failed_total: Family<ClusterLabels, Counter>,
    pub cluster_replicas_desired: Family<ClusterLabels, Gauge>,
    pub cluster_replicas_ready: Family<ClusterLabels, Gauge>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("zookeeper_operator");

        let reconciliations_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Reconcile cycles that completed",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Reconcile cycles that ended in an error",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ClusterLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Wall time of a reconcile cycle",
            reconcile_duration_seconds.clone(),
        );

        let upgrades_failed_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "upgrades_failed",
            "Upgrades that made no progress within the deadline",
            upgrades_failed_total.clone(),
        );

        let cluster_replicas_desired = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cluster_replicas_desired",
            "Desired ensemble size",
            cluster_replicas_desired.clone(),
        );

        let cluster_replicas_ready = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cluster_replicas_ready",
            "Ready ensemble members",
            cluster_replicas_ready.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            upgrades_failed_total,
            cluster_replicas_desired,
            cluster_replicas_ready,
            registry,
        }
    }

    pub fn record_reconcile(&self, namespace: &str, name: &str, duration_secs: f64) {
        let labels = ClusterLabels::new(namespace, name);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, namespace: &str, name: &str) {
        self.reconciliation_errors_total
            .get_or_create(&ClusterLabels::new(namespace, name))
            .inc();
    }

    pub fn record_upgrade_failed(&self, namespace: &str, name: &str) {
        self.upgrades_failed_total
            .get_or_create(&ClusterLabels::new(namespace, name))
            .inc();
    }

    pub fn set_cluster_replicas(&self, namespace: &str, name: &str, desired: i64, ready: i64) {
        let labels = ClusterLabels::new(namespace, name);
        self.cluster_replicas_desired.get_or_create(&labels).set(desired);
        self.cluster_replicas_ready.get_or_create(&labels).set(ready);
    }

    /// Render the registry in Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!(error = %e, "Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// State shared between the controllers and the health server.
pub struct HealthState {
    ready: RwLock<bool>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Starts not ready.
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    match state.is_ready().await {
        true => (StatusCode::OK, "ready").into_response(),
        false => (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response(),
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve the probe router on `0.0.0.0:port` until the listener fails.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "Health server listening");
    axum::serve(listener, create_router(state)).await
}
