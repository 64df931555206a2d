//! Object metadata shared by every stored kind.
//!
//! Every object is identified by an [`ObjectKey`] (namespace + name) and
//! carries an [`ObjectMeta`] with the bookkeeping a store needs for
//! optimistic concurrency, finalizer-gated deletion and ownership.
//!
//! ## Versions
//!
//! - `resource_version` changes on every successful write (spec, status or
//!   metadata) and is the optimistic concurrency token.
//! - `generation` changes only when the desired state of the object changes.
//!   Reference data (endpoints, secrets) feed their generation into content
//!   hashes, so editing them forces dependent work to be recreated.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Namespace and name of an object.
///
/// Cluster-scoped objects use an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace (empty for cluster-scoped objects).
    #[serde(default)]
    pub namespace: String,
    /// Object name, unique within the namespace and kind.
    pub name: String,
}

impl ObjectKey {
    /// Creates a namespaced key.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Creates a key for a cluster-scoped object.
    #[must_use]
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Pointer from an owned object back to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    /// Kind of the owner.
    pub kind: String,
    /// Name of the owner (same namespace as the owned object).
    pub name: String,
    /// UID of the owner, so a recreated owner does not adopt stale children.
    pub uid: String,
    /// Whether the owner is the managing controller.
    #[serde(default)]
    pub controller: bool,
}

impl OwnerReference {
    /// Builds a controller reference pointing at `owner`.
    #[must_use]
    pub fn controller_of<R: Resource>(owner: &R) -> Self {
        Self {
            kind: R::KIND.to_string(),
            name: owner.meta().name.clone(),
            uid: owner.meta().uid.clone(),
            controller: true,
        }
    }
}

/// Metadata carried by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Namespace (empty for cluster-scoped objects).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Unique identity assigned by the store on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub resource_version: u64,
    /// Desired-state counter, bumped when anything outside metadata and
    /// status changes.
    #[serde(default)]
    pub generation: u64,
    /// Set when deletion was requested while finalizers were present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Markers that block removal until their owners clean up.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Owners of this object.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Creates metadata for a namespaced object.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Creates metadata for a cluster-scoped object.
    #[must_use]
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    /// Returns the key of the object.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Returns true once deletion has been requested.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Returns true if the finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds a finalizer. Returns false if it was already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes a finalizer. Returns false if it was not present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// Returns the managing controller, if any.
    #[must_use]
    pub fn controller_owner(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|o| o.controller)
    }

    /// Returns true if an owner reference with the given kind and uid exists.
    #[must_use]
    pub fn is_owned_by(&self, kind: &str, uid: &str) -> bool {
        self.owner_references
            .iter()
            .any(|o| o.kind == kind && o.uid == uid)
    }
}

/// A kind that can be kept in a store.
///
/// Objects are serialized to JSON at the store boundary, the same way an API
/// server keeps them.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind name used in errors, logs and owner references.
    const KIND: &'static str;

    /// Whether objects of this kind live in a namespace.
    const NAMESPACED: bool = true;

    /// Returns the object metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Returns the object metadata mutably.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Returns the key of the object.
    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// A kind with a status portion that is written separately from its spec.
pub trait HasStatus: Resource {
    /// Observed state written by controllers.
    type Status: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Returns the status.
    fn status(&self) -> &Self::Status;

    /// Returns the status mutably.
    fn status_mut(&mut self) -> &mut Self::Status;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalizers_are_idempotent() {
        let mut meta = ObjectMeta::new("ns", "obj");
        assert!(meta.add_finalizer("arc/test"));
        assert!(!meta.add_finalizer("arc/test"));
        assert_eq!(meta.finalizers.len(), 1);
        assert!(meta.remove_finalizer("arc/test"));
        assert!(!meta.remove_finalizer("arc/test"));
        assert!(meta.finalizers.is_empty());
    }

    #[test]
    fn key_display_omits_empty_namespace() {
        assert_eq!(ObjectKey::new("ns", "a").to_string(), "ns/a");
        assert_eq!(ObjectKey::cluster("a").to_string(), "a");
    }

    #[test]
    fn ownership_checks_kind_and_uid() {
        let mut meta = ObjectMeta::new("ns", "child");
        meta.owner_references.push(OwnerReference {
            kind: "Order".into(),
            name: "parent".into(),
            uid: "01J".into(),
            controller: true,
        });
        assert!(meta.is_owned_by("Order", "01J"));
        assert!(!meta.is_owned_by("Order", "other"));
        assert!(!meta.is_owned_by("Endpoint", "01J"));
        assert_eq!(meta.controller_owner().map(|o| o.name.as_str()), Some("parent"));
    }

    #[test]
    fn metadata_serializes_camel_case_and_skips_empty_fields() {
        let meta = ObjectMeta::new("ns", "obj");
        let json = serde_json::to_value(&meta).unwrap_or_else(|e| panic!("serialize: {e}"));
        assert_eq!(json["resourceVersion"], 0);
        assert!(json.get("finalizers").is_none());
        assert!(json.get("deletionTimestamp").is_none());
    }
}
