//! Object storage the reconcilers read from and write to.
//!
//! The [`Store`] trait is the untyped, object-safe boundary: objects cross it
//! as JSON documents tagged with their kind, the way an API server keeps
//! them. [`StoreExt`] layers typed access on top for any [`Resource`].
//!
//! ## Semantics
//!
//! - **Optimistic concurrency**: `update` and `update_status` fail with
//!   `Conflict` unless the caller's `resourceVersion` matches the stored one.
//! - **Status subresource**: `update` never changes `status`, and
//!   `update_status` never changes anything else.
//! - **Finalizer-gated deletion**: `delete` on an object with finalizers only
//!   marks it with a deletion timestamp. The object disappears once an
//!   `update` removes the last finalizer.
//! - **Watch**: every successful write is broadcast as a [`WatchEvent`].

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use arc_core::{HasStatus, ObjectKey, Resource, Result};

pub use memory::InMemoryStore;

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    /// The object was created.
    Added,
    /// The object's spec, status or metadata changed.
    Modified,
    /// The object is gone.
    Deleted,
}

/// A change notification.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// What happened.
    pub event_type: WatchEventType,
    /// Kind of the changed object.
    pub kind: &'static str,
    /// Key of the changed object.
    pub key: ObjectKey,
    /// The object after the change (before it, for deletions).
    pub object: Value,
}

impl WatchEvent {
    /// Decodes the carried object if it is of kind `R`.
    #[must_use]
    pub fn decode<R: Resource>(&self) -> Option<R> {
        if self.kind != R::KIND {
            return None;
        }
        serde_json::from_value(self.object.clone()).ok()
    }
}

/// Untyped object storage.
///
/// All methods are `Send + Sync` so reconcilers on different workers can
/// share one store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches an object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no object of that kind has the key.
    async fn get_object(&self, kind: &'static str, key: &ObjectKey) -> Result<Value>;

    /// Lists objects of a kind, ordered by key. `None` lists all namespaces.
    async fn list_objects(&self, kind: &'static str, namespace: Option<&str>)
    -> Result<Vec<Value>>;

    /// Creates an object and returns it with uid and versions assigned.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the key is taken.
    async fn create_object(&self, kind: &'static str, object: Value) -> Result<Value>;

    /// Replaces everything but the status of an object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict`.
    async fn update_object(&self, kind: &'static str, object: Value) -> Result<Value>;

    /// Replaces only the status of an object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict`.
    async fn update_object_status(&self, kind: &'static str, object: Value) -> Result<Value>;

    /// Requests deletion of an object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object does not exist.
    async fn delete_object(&self, kind: &'static str, key: &ObjectKey) -> Result<()>;

    /// Subscribes to change notifications.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Typed access to a [`Store`].
#[async_trait]
pub trait StoreExt: Store {
    /// Fetches an object of kind `R`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<R> {
        decode(self.get_object(R::KIND, key).await?)
    }

    /// Lists objects of kind `R`.
    async fn list<R: Resource>(&self, namespace: Option<&str>) -> Result<Vec<R>> {
        self.list_objects(R::KIND, namespace)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Creates an object of kind `R`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the key is taken.
    async fn create<R: Resource>(&self, object: &R) -> Result<R> {
        decode(self.create_object(R::KIND, encode(object)?).await?)
    }

    /// Replaces the spec and metadata of an object of kind `R`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict`.
    async fn update<R: Resource>(&self, object: &R) -> Result<R> {
        decode(self.update_object(R::KIND, encode(object)?).await?)
    }

    /// Replaces the status of an object of kind `R`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict`.
    async fn update_status<R: HasStatus>(&self, object: &R) -> Result<R> {
        decode(self.update_object_status(R::KIND, encode(object)?).await?)
    }

    /// Requests deletion of an object of kind `R`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<()> {
        self.delete_object(R::KIND, key).await
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

fn encode<R: Resource>(object: &R) -> Result<Value> {
    Ok(serde_json::to_value(object)?)
}

fn decode<R: Resource>(value: Value) -> Result<R> {
    Ok(serde_json::from_value(value)?)
}
