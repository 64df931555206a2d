use arc_core::ObjectMeta;
use serde::{Deserialize, Serialize};

use super::{LocalObjectReference, Parameter, WorkflowPhase, impl_resource, impl_status};

/// Finalizer that keeps an artifact workflow alive until its workflow is gone.
pub const ARTIFACT_WORKFLOW_FINALIZER: &str = "arc.bwi.de/artifact-workflow-finalizer";

/// A single resolved artifact, ready to be turned into a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactWorkflowSpec {
    /// Which [`super::ArtifactType`] processes this artifact.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Flattened workflow parameters, in order.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Secret with credentials for the source endpoint.
    #[serde(default)]
    pub src_secret_ref: LocalObjectReference,
    /// Secret with credentials for the destination endpoint.
    #[serde(default)]
    pub dst_secret_ref: LocalObjectReference,
}

/// Observed state of an [`ArtifactWorkflow`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactWorkflowStatus {
    /// Phase mirrored from the workflow; `Unspecified` until it is created.
    #[serde(default)]
    pub phase: WorkflowPhase,
    /// Human readable diagnostics for failed or rejected workflows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Materialized transfer job derived from one order artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactWorkflow {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: ArtifactWorkflowSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ArtifactWorkflowStatus,
}

impl ArtifactWorkflow {
    /// Creates an artifact workflow with the given spec and empty status.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: ArtifactWorkflowSpec,
    ) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: ArtifactWorkflowStatus::default(),
        }
    }
}

impl_resource!(ArtifactWorkflow, "ArtifactWorkflow");
impl_status!(ArtifactWorkflow, ArtifactWorkflowStatus);
