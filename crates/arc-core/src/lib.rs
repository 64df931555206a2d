//! # arc-core
//!
//! Core abstractions shared by the Artifact Conduit controllers.
//!
//! - **Object Metadata**: keys, versions, finalizers and owner references
//!   carried by every stored object
//! - **Error Types**: store-level errors and result alias
//! - **Canonical JSON**: deterministic serialization for content hashing
//! - **Observability**: logging initialisation and reconcile spans
//!
//! ## Example
//!
//! ```rust
//! use arc_core::prelude::*;
//!
//! let mut meta = ObjectMeta::new("team-a", "mirror-images");
//! meta.add_finalizer("arc.bwi.de/order-finalizer");
//! assert_eq!(meta.key(), ObjectKey::new("team-a", "mirror-images"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical_json;
pub mod error;
pub mod meta;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::meta::{HasStatus, ObjectKey, ObjectMeta, OwnerReference, Resource};
}

pub use error::{Error, Result};
pub use meta::{HasStatus, ObjectKey, ObjectMeta, OwnerReference, Resource};
