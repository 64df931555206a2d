//! Object kinds read and written by the controllers.
//!
//! | Kind | Scope | Written by |
//! |------|-------|------------|
//! | [`Order`] | namespaced | users (spec), order controller (status) |
//! | [`ArtifactWorkflow`] | namespaced | order controller (spec), artifact workflow controller (status) |
//! | [`Endpoint`] | namespaced | users |
//! | [`Secret`] | namespaced | users |
//! | [`ArtifactType`] | cluster | operators |
//! | [`Workflow`] | namespaced | artifact workflow controller (spec), execution engine (status) |
//!
//! Field names serialize in camelCase to match the published API.

mod artifact_type;
mod artifact_workflow;
mod endpoint;
mod order;
mod secret;
mod workflow;

use serde::{Deserialize, Serialize};

pub use artifact_type::{ArtifactType, ArtifactTypeRules, ArtifactTypeSpec};
pub use artifact_workflow::{
    ARTIFACT_WORKFLOW_FINALIZER, ArtifactWorkflow, ArtifactWorkflowSpec, ArtifactWorkflowStatus,
};
pub use endpoint::{Endpoint, EndpointSpec, EndpointUsage};
pub use order::{
    ORDER_FINALIZER, Order, OrderArtifact, OrderArtifactWorkflowStatus, OrderDefaults, OrderSpec,
    OrderStatus,
};
pub use secret::Secret;
pub use workflow::{
    NodePhase, NodeStatus, NodeType, Volume, VolumeSource, Workflow, WorkflowPhase, WorkflowSpec,
    WorkflowStatus, WorkflowTemplateRef,
};

/// Reference to another object in the same namespace, by name.
///
/// An empty name means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalObjectReference {
    /// Name of the referenced object.
    #[serde(default)]
    pub name: String,
}

impl LocalObjectReference {
    /// Creates a reference to `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns true if no name is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Returns the name, or `None` when unset.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        (!self.name.is_empty()).then_some(self.name.as_str())
    }
}

/// A single named workflow argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name (case-sensitive, unique within a workflow).
    pub name: String,
    /// Stringified value.
    pub value: String,
}

impl Parameter {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Implements [`arc_core::Resource`] for a kind with a `metadata` field.
macro_rules! impl_resource {
    ($ty:ty, $kind:literal) => {
        impl_resource!($ty, $kind, true);
    };
    ($ty:ty, $kind:literal, $namespaced:literal) => {
        impl arc_core::Resource for $ty {
            const KIND: &'static str = $kind;
            const NAMESPACED: bool = $namespaced;

            fn meta(&self) -> &arc_core::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut arc_core::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

/// Implements [`arc_core::HasStatus`] for a kind with a `status` field.
macro_rules! impl_status {
    ($ty:ty, $status:ty) => {
        impl arc_core::HasStatus for $ty {
            type Status = $status;

            fn status(&self) -> &Self::Status {
                &self.status
            }

            fn status_mut(&mut self) -> &mut Self::Status {
                &mut self.status
            }
        }
    };
}

pub(crate) use {impl_resource, impl_status};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reference_has_no_name() {
        assert!(LocalObjectReference::default().is_empty());
        assert_eq!(LocalObjectReference::default().as_name(), None);
        assert_eq!(LocalObjectReference::new("src").as_name(), Some("src"));
    }
}
