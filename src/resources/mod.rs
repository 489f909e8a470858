//! Resource generation module.
//!
//! Contains utilities for generating Kubernetes resources owned by ZookeeperCluster,
//! and the merge rules applied when a live object already exists.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | StatefulSet | Stable member identity and data claims |
//! | Client Service | Client access endpoint |
//! | Headless Service | Member DNS for the quorum |
//! | Admin Server Service | AdminServer HTTP endpoint |
//! | ConfigMap | zoo.cfg, logging and env.sh |
//! | PodDisruptionBudget | Maintain quorum during disruptions |
//! | ServiceAccount | Pull secrets for a named account |

pub mod common;
pub mod configmap;
pub mod pdb;
pub mod service_account;
pub mod services;
pub mod statefulset;

// Re-export commonly used items from common
pub use common::{owner_reference, standard_labels};
