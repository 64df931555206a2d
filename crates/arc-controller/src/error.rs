//! Error types for the reconciliation domain.
//!
//! Store errors from `arc-core` are wrapped unchanged so callers can still
//! ask whether something was missing or already present. Everything else
//! describes why a resolution or materialization could not proceed.

/// The result type used throughout arc-controller.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reconciling orders and artifact workflows.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An endpoint reference was empty with no default, or named a missing endpoint.
    #[error("{role} endpoint for artifact {artifact_index} not found: {reason}")]
    ReferenceNotFound {
        /// `source` or `destination`.
        role: &'static str,
        /// Index of the artifact in the order spec.
        artifact_index: usize,
        /// What exactly was missing.
        reason: String,
    },

    /// A secret named by an endpoint or artifact workflow does not exist.
    #[error("secret '{secret}' referenced by '{referenced_by}' not found")]
    CredentialNotFound {
        /// Endpoint or artifact workflow that names the secret.
        referenced_by: String,
        /// Name of the missing secret.
        secret: String,
    },

    /// The artifact type named by an order or workflow does not exist.
    #[error("artifact type '{name}' not found")]
    UnknownArtifactType {
        /// Name of the missing artifact type.
        name: String,
    },

    /// An endpoint cannot be used the way an artifact asks for it.
    #[error("endpoint '{endpoint}' cannot be used as {role}: {reason}")]
    EndpointRuleViolation {
        /// Endpoint name.
        endpoint: String,
        /// `source` or `destination`.
        role: &'static str,
        /// Which rule was violated.
        reason: String,
    },

    /// Workflow parameters failed validation.
    #[error("{message}")]
    Validation {
        /// Description of the problem, naming the offending parameter.
        message: String,
    },

    /// A payload document could not be interpreted.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A store or configuration error from `arc-core`.
    #[error(transparent)]
    Core(#[from] arc_core::Error),
}

impl Error {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Core(arc_core::Error::configuration(message))
    }

    /// Returns true if the error is a store `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_not_found())
    }

    /// Returns true if the error is a store `AlreadyExists`.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_already_exists())
    }

    /// Returns true if the error is an optimistic concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_conflict())
    }

    /// Returns true if the error came from resolving reference data.
    ///
    /// These abort a whole order pass.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::ReferenceNotFound { .. }
                | Self::CredentialNotFound { .. }
                | Self::UnknownArtifactType { .. }
                | Self::EndpointRuleViolation { .. }
        )
    }
}

/// Adapters for the two idempotent cases in which a store error is success.
pub trait ResultExt<T> {
    /// Maps `NotFound` to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns every other error unchanged.
    fn ignore_not_found(self) -> Result<Option<T>>;

    /// Maps `AlreadyExists` to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns every other error unchanged.
    fn ignore_already_exists(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn ignore_not_found(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn ignore_already_exists(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_already_exists() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
