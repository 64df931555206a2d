//! Error types and result aliases for store-level operations.
//!
//! These errors describe what happened to an object in a collaborator store
//! (missing, already present, stale version). Reconcilers decide which of
//! them are tolerable in a given context.

use crate::meta::ObjectKey;

/// The result type used by store-facing code.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested object does not exist.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind of the object that was looked up.
        kind: &'static str,
        /// Namespace and name of the object.
        key: ObjectKey,
    },

    /// An object with the same key already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Kind of the object that was created.
        kind: &'static str,
        /// Namespace and name of the object.
        key: ObjectKey,
    },

    /// Optimistic concurrency check failed.
    #[error("{kind} {key} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        /// Kind of the object that was written.
        kind: &'static str,
        /// Namespace and name of the object.
        key: ObjectKey,
        /// Resource version the writer based its change on.
        expected: u64,
        /// Resource version currently stored.
        actual: u64,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the bad setting.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a not found error for the given kind and key.
    #[must_use]
    pub fn not_found(kind: &'static str, key: &ObjectKey) -> Self {
        Self::NotFound {
            kind,
            key: key.clone(),
        }
    }

    /// Creates an already exists error for the given kind and key.
    #[must_use]
    pub fn already_exists(kind: &'static str, key: &ObjectKey) -> Self {
        Self::AlreadyExists {
            kind,
            key: key.clone(),
        }
    }

    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if the object was absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the object was already present.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if a write lost an optimistic concurrency race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_kind_and_key() {
        let err = Error::not_found("Endpoint", &ObjectKey::new("team-a", "registry"));
        assert_eq!(err.to_string(), "Endpoint team-a/registry not found");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn conflict_display_includes_versions() {
        let err = Error::Conflict {
            kind: "Order",
            key: ObjectKey::new("ns", "order"),
            expected: 3,
            actual: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected version 3"));
        assert!(msg.contains("found 5"));
        assert!(err.is_conflict());
    }

    #[test]
    fn cluster_scoped_keys_render_without_namespace() {
        let err = Error::already_exists("ArtifactType", &ObjectKey::cluster("oci"));
        assert_eq!(err.to_string(), "ArtifactType oci already exists");
        assert!(err.is_already_exists());
    }
}
