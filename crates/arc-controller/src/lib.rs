//! # arc-controller
//!
//! Reconcilers that turn declarative artifact transfer requests into
//! workflows for an external execution engine.
//!
//! - **Order**: a namespaced request listing artifacts to move between
//!   endpoints, with optional default source and destination
//! - **ArtifactWorkflow**: one fully resolved artifact transfer, named after
//!   its order and the content hash of its inputs
//! - **Workflow**: the engine-facing object created for each artifact
//!   workflow, whose phase is mirrored back up the chain
//!
//! ## Guarantees
//!
//! - **Idempotent**: a pass over unchanged inputs creates, deletes and writes
//!   nothing
//! - **Content addressed**: any change to an artifact, its endpoints or their
//!   credentials yields a new child and retires the old one
//! - **Ordered teardown**: finalizers keep parents around until every child
//!   is confirmed gone
//!
//! ## Example
//!
//! ```rust
//! use arc_controller::api::{LocalObjectReference, Order, OrderArtifact, OrderSpec};
//!
//! let mut artifact = OrderArtifact::new("oci");
//! artifact.src_ref = LocalObjectReference::new("docker-hub");
//! artifact.dst_ref = LocalObjectReference::new("internal");
//!
//! let order = Order::new(
//!     "team-a",
//!     "mirror-images",
//!     OrderSpec {
//!         artifacts: vec![artifact],
//!         ..OrderSpec::default()
//!     },
//! );
//! assert_eq!(order.workflow_name("0123abcd"), "mirror-images-0123abcd");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod artifact_workflow;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod logs;
pub mod metrics;
pub mod order;
pub mod params;
pub mod payload;
pub mod resolver;
pub mod runtime;
pub mod status;
pub mod store;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::api::{
        ArtifactType, ArtifactWorkflow, Endpoint, Order, Secret, Workflow, WorkflowPhase,
    };
    pub use crate::artifact_workflow::ArtifactWorkflowReconciler;
    pub use crate::config::ControllerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::order::OrderReconciler;
    pub use crate::runtime::{Manager, Outcome, Reconciler};
    pub use crate::store::{InMemoryStore, Store, StoreExt};
}
