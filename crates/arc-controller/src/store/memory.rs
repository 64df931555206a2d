//! In-memory store implementation.
//!
//! This module provides [`InMemoryStore`], an implementation of the
//! [`Store`] trait that keeps objects as JSON documents and follows the same
//! versioning, status and deletion rules as an API server.
//!
//! ## Limitations
//!
//! - **No durability**: All state is lost when the process exits
//! - **Single-process only**: State is not shared across process boundaries
//! - **No garbage collection**: Owner references are recorded, never acted on

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;

use arc_core::{Error, ObjectKey, ObjectMeta, Result};

use super::{Store, WatchEvent, WatchEventType};

const WATCH_CAPACITY: usize = 1024;

type ObjectId = (&'static str, ObjectKey);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectId, Value>,
    last_version: u64,
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    fn current(&self, kind: &'static str, key: &ObjectKey) -> Result<Value> {
        self.objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, key))
    }
}

/// Thread-safe in-memory object store.
///
/// ## Example
///
/// ```rust
/// use arc_controller::store::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// let mut events = store.subscribe();
/// // Create objects through `StoreExt`, then observe them on `events`...
/// # drop(events);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<State>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            events,
        }
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// Returns the number of stored objects of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn count(&self, kind: &'static str) -> Result<usize> {
        let count = {
            let state = self.state.read().map_err(poison_err)?;
            state.objects.keys().filter(|(k, _)| *k == kind).count()
        };
        Ok(count)
    }

    fn publish(&self, event_type: WatchEventType, kind: &'static str, object: &Value) {
        let Ok(meta) = read_meta(object) else {
            return;
        };
        // A send only fails when nobody is subscribed.
        let _ = self.events.send(WatchEvent {
            event_type,
            kind,
            key: meta.key(),
            object: object.clone(),
        });
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_object(&self, kind: &'static str, key: &ObjectKey) -> Result<Value> {
        let state = self.state.read().map_err(poison_err)?;
        state.current(kind, key)
    }

    async fn list_objects(
        &self,
        kind: &'static str,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>> {
        let objects = {
            let state = self.state.read().map_err(poison_err)?;
            state
                .objects
                .iter()
                .filter(|((k, key), _)| {
                    *k == kind && namespace.is_none_or(|ns| key.namespace == ns)
                })
                .map(|(_, v)| v.clone())
                .collect()
        };
        Ok(objects)
    }

    async fn create_object(&self, kind: &'static str, mut object: Value) -> Result<Value> {
        let mut meta = read_meta(&object)?;
        if meta.name.is_empty() {
            return Err(Error::InvalidInput(format!("{kind} must have a name")));
        }
        let key = meta.key();

        {
            let mut state = self.state.write().map_err(poison_err)?;
            if state.objects.contains_key(&(kind, key.clone())) {
                return Err(Error::already_exists(kind, &key));
            }
            meta.uid = ulid::Ulid::new().to_string();
            meta.resource_version = state.next_version();
            meta.generation = 1;
            meta.deletion_timestamp = None;
            write_meta(&mut object, &meta)?;
            state.objects.insert((kind, key), object.clone());
        }

        self.publish(WatchEventType::Added, kind, &object);
        Ok(object)
    }

    async fn update_object(&self, kind: &'static str, mut object: Value) -> Result<Value> {
        let mut meta = read_meta(&object)?;
        let key = meta.key();

        let event_type = {
            let mut state = self.state.write().map_err(poison_err)?;
            let current = state.current(kind, &key)?;
            let current_meta = read_meta(&current)?;
            check_version(kind, &key, &meta, &current_meta)?;

            set_field(&mut object, "status", current.get("status").cloned())?;
            meta.uid = current_meta.uid;
            meta.deletion_timestamp = current_meta.deletion_timestamp;
            meta.generation = if desired_state_changed(&current, &object) {
                current_meta.generation + 1
            } else {
                current_meta.generation
            };
            meta.resource_version = state.next_version();
            write_meta(&mut object, &meta)?;

            if meta.is_deleting() && meta.finalizers.is_empty() {
                state.objects.remove(&(kind, key));
                WatchEventType::Deleted
            } else {
                state.objects.insert((kind, key), object.clone());
                WatchEventType::Modified
            }
        };

        self.publish(event_type, kind, &object);
        Ok(object)
    }

    async fn update_object_status(&self, kind: &'static str, object: Value) -> Result<Value> {
        let meta = read_meta(&object)?;
        let key = meta.key();

        let next = {
            let mut state = self.state.write().map_err(poison_err)?;
            let mut next = state.current(kind, &key)?;
            let mut current_meta = read_meta(&next)?;
            check_version(kind, &key, &meta, &current_meta)?;

            set_field(&mut next, "status", object.get("status").cloned())?;
            current_meta.resource_version = state.next_version();
            write_meta(&mut next, &current_meta)?;
            state.objects.insert((kind, key), next.clone());
            next
        };

        self.publish(WatchEventType::Modified, kind, &next);
        Ok(next)
    }

    async fn delete_object(&self, kind: &'static str, key: &ObjectKey) -> Result<()> {
        let (event_type, object) = {
            let mut state = self.state.write().map_err(poison_err)?;
            let mut object = state.current(kind, key)?;
            let mut meta = read_meta(&object)?;

            if meta.finalizers.is_empty() {
                state.objects.remove(&(kind, key.clone()));
                (Some(WatchEventType::Deleted), object)
            } else if meta.is_deleting() {
                (None, object)
            } else {
                meta.deletion_timestamp = Some(Utc::now());
                meta.resource_version = state.next_version();
                write_meta(&mut object, &meta)?;
                state.objects.insert((kind, key.clone()), object.clone());
                (Some(WatchEventType::Modified), object)
            }
        };

        if let Some(event_type) = event_type {
            self.publish(event_type, kind, &object);
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.subscribe()
    }
}

fn read_meta(object: &Value) -> Result<ObjectMeta> {
    let Some(meta) = object.get("metadata") else {
        return Err(Error::InvalidInput("object has no metadata".into()));
    };
    Ok(ObjectMeta::deserialize(meta)?)
}

fn write_meta(object: &mut Value, meta: &ObjectMeta) -> Result<()> {
    set_field(object, "metadata", Some(serde_json::to_value(meta)?))
}

fn set_field(object: &mut Value, field: &str, value: Option<Value>) -> Result<()> {
    let Some(map) = object.as_object_mut() else {
        return Err(Error::InvalidInput("object must be a JSON document".into()));
    };
    match value {
        Some(value) => map.insert(field.to_string(), value),
        None => map.remove(field),
    };
    Ok(())
}

fn check_version(
    kind: &'static str,
    key: &ObjectKey,
    submitted: &ObjectMeta,
    current: &ObjectMeta,
) -> Result<()> {
    if submitted.resource_version == current.resource_version {
        Ok(())
    } else {
        Err(Error::Conflict {
            kind,
            key: key.clone(),
            expected: submitted.resource_version,
            actual: current.resource_version,
        })
    }
}

/// Compares everything outside `metadata` and `status`.
fn desired_state_changed(before: &Value, after: &Value) -> bool {
    fn strip(v: &Value) -> Option<BTreeMap<&String, &Value>> {
        v.as_object().map(|map| {
            map.iter()
                .filter(|(k, _)| k.as_str() != "metadata" && k.as_str() != "status")
                .collect()
        })
    }
    strip(before) != strip(after)
}
