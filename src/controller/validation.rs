//! Validation of a defaulted ZookeeperCluster spec.
//!
//! Runs after defaulting and before any child object is touched, so a bad
//! spec never reaches the StatefulSet.

use std::sync::LazyLock;

use kube::ResourceExt;

use crate::controller::error::{Error, Result};
use crate::crd::ZookeeperCluster;

/// Minimum ensemble size
pub const MIN_REPLICAS: i32 = 1;

/// Maximum name length, leaving room for `-admin-server` and pod ordinals
pub const MAX_NAME_LENGTH: usize = 48;

/// Validate the resource spec
pub fn validate_spec(resource: &ZookeeperCluster) -> Result<()> {
    validate_name_length(resource)?;
    validate_replicas(resource)?;
    validate_ports(resource)?;
    validate_storage(resource)?;
    validate_resource_quantities(resource)?;
    Ok(())
}

fn validate_name_length(resource: &ZookeeperCluster) -> Result<()> {
    let name = resource.name_any();
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "name '{}' exceeds maximum length of {} characters",
            name, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_replicas(resource: &ZookeeperCluster) -> Result<()> {
    let replicas = resource.spec.replicas;
    if replicas < MIN_REPLICAS {
        return Err(Error::Validation(format!(
            "replica count {} is below minimum {}",
            replicas, MIN_REPLICAS
        )));
    }
    if resource.spec.max_unavailable_replicas < 0 {
        return Err(Error::Validation(
            "maxUnavailableReplicas cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_ports(resource: &ZookeeperCluster) -> Result<()> {
    for port in &resource.spec.ports {
        if !(1..=65535).contains(&port.container_port) {
            return Err(Error::Validation(format!(
                "port '{}' has invalid number {}",
                port.name, port.container_port
            )));
        }
    }
    Ok(())
}

fn validate_storage(resource: &ZookeeperCluster) -> Result<()> {
    if let Some(persistence) = &resource.spec.persistence
        && !is_valid_storage_size(&persistence.size)
    {
        return Err(Error::Validation(format!(
            "invalid storage size '{}'. Expected format: <number><unit> where unit is Ki, Mi, Gi, Ti, Pi, or Ei (e.g., 20Gi)",
            persistence.size
        )));
    }
    if let Some(limit) = resource
        .spec
        .ephemeral
        .as_ref()
        .and_then(|e| e.size_limit.as_deref())
        && !is_valid_storage_size(limit)
    {
        return Err(Error::Validation(format!(
            "invalid ephemeral size limit '{}'",
            limit
        )));
    }
    Ok(())
}

/// Validate CPU and memory quantities in pod requests and limits
fn validate_resource_quantities(resource: &ZookeeperCluster) -> Result<()> {
    let resources = &resource.spec.pod.resources;
    for (kind, map) in [("request", &resources.requests), ("limit", &resources.limits)] {
        for (name, value) in map {
            let valid = match name.as_str() {
                "cpu" => is_valid_cpu(value),
                "memory" | "ephemeral-storage" => is_valid_memory(value),
                _ => true,
            };
            if !valid {
                return Err(Error::Validation(format!(
                    "invalid {} {} '{}'",
                    name, kind, value
                )));
            }
        }
    }
    Ok(())
}

/// Check if a storage size string is valid
fn is_valid_storage_size(size: &str) -> bool {
    // Pattern: ^([0-9]+)(Ki|Mi|Gi|Ti|Pi|Ei)?$
    static STORAGE_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^([0-9]+)(Ki|Mi|Gi|Ti|Pi|Ei)?$").ok());
    STORAGE_RE.as_ref().is_some_and(|re| re.is_match(size))
}

/// Check if a CPU string is valid
fn is_valid_cpu(cpu: &str) -> bool {
    static CPU_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^([0-9]+m?|[0-9]*\.[0-9]+)$").ok());
    CPU_RE.as_ref().is_some_and(|re| re.is_match(cpu))
}

fn is_valid_memory(memory: &str) -> bool {
    static MEMORY_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^([0-9]+)(Ki|Mi|Gi|Ti|k|M|G|T)?$").ok());
    MEMORY_RE.as_ref().is_some_and(|re| re.is_match(memory))
}
