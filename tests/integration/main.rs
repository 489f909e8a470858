// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Integration tests for zookeeper-operator.
//!
//! These run against whatever cluster the current kubeconfig points at and
//! are all `#[ignore]`d:
//!
//! ```bash
//! cargo test --test integration -- --ignored
//! cargo test --test integration test_creates_children -- --ignored
//! ```
//!
//! Every test gets its own namespace and its own namespace-scoped
//! controller, so tests run in parallel. The namespace is torn down on drop,
//! including after a panic. Readiness tests also need the test process to
//! resolve `*.svc.cluster.local`, since the metadata root is written through
//! the client Service.

#[path = "../common/mod.rs"]
#[allow(dead_code)]
mod common;

mod cluster;
pub mod fixtures;
mod namespace;
mod wait;


pub use assertions::*;
pub use cluster::*;
pub use fixtures::*;
pub use namespace::*;
pub use operator::*;
pub use wait::*;
