//! ServiceAccount generation.
//!
//! Only created when the pods run under a named (non-default) account; it
//! carries the image pull secrets so private registries work.

use k8s_openapi::api::core::v1::ServiceAccount;

use crate::crd::{DEFAULT_SERVICE_ACCOUNT, ZookeeperCluster};
use crate::resources::common::child_metadata;
use crate::resources::statefulset::convert_pull_secrets;

/// Whether the cluster needs its own ServiceAccount.
pub fn needs_service_account(resource: &ZookeeperCluster) -> bool {
    resource.spec.pod.service_account_name != DEFAULT_SERVICE_ACCOUNT
}

pub fn generate_service_account(resource: &ZookeeperCluster) -> ServiceAccount {
    ServiceAccount {
        metadata: child_metadata(resource, resource.spec.pod.service_account_name.clone()),
        image_pull_secrets: convert_pull_secrets(&resource.spec.pod.image_pull_secrets),
        ..Default::default()
    }
}

/// Only pull secrets are reconciled; tokens and secrets belong to Kubernetes.
pub fn sync_service_account(found: &mut ServiceAccount, desired: &ServiceAccount) {
    found.image_pull_secrets = desired.image_pull_secrets.clone();
}
