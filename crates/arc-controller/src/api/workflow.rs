use std::collections::BTreeMap;

use arc_core::ObjectMeta;
use serde::{Deserialize, Serialize};

use super::{Parameter, impl_resource, impl_status};

/// Lifecycle phase of a workflow, mirrored onto artifact workflows and orders.
///
/// ```text
/// Unspecified ──► Pending ──► Running ──► Succeeded
///                    │           │
///                    └───────────┴──────► Failed | Errored
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowPhase {
    /// Nothing has been materialized yet.
    #[default]
    Unspecified,
    /// Created, waiting to be scheduled.
    Pending,
    /// At least one step is executing.
    Running,
    /// All steps finished successfully.
    Succeeded,
    /// A step failed.
    Failed,
    /// The engine could not run the workflow.
    Errored,
}

impl WorkflowPhase {
    /// Returns true if the phase will never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Errored)
    }

    /// Returns the phase name as used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the template a workflow instantiates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplateRef {
    /// Template name.
    pub name: String,
    /// Whether the template is cluster-scoped.
    #[serde(default)]
    pub cluster_scope: bool,
}

/// Where a volume's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Empty scratch directory.
    EmptyDir,
    /// Contents of a secret.
    #[serde(rename_all = "camelCase")]
    Secret {
        /// Secret to mount.
        secret_name: String,
    },
}

/// A named volume mounted into workflow steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name referenced by the template.
    pub name: String,
    /// Volume content.
    pub source: VolumeSource,
}

impl Volume {
    /// Mounts `secret` under `name`, or an empty directory when there is none.
    #[must_use]
    pub fn secret_or_empty(name: impl Into<String>, secret: Option<&str>) -> Self {
        let source = match secret {
            Some(secret_name) => VolumeSource::Secret {
                secret_name: secret_name.to_string(),
            },
            None => VolumeSource::EmptyDir,
        };
        Self {
            name: name.into(),
            source,
        }
    }
}

/// Desired state of a [`Workflow`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    /// Template to instantiate.
    pub workflow_template_ref: WorkflowTemplateRef,
    /// Volumes available to the steps.
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Input parameters.
    #[serde(default)]
    pub arguments: Vec<Parameter>,
}

/// Kind of node in a workflow's execution tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// A step backed by a pod. Only these carry logs.
    Pod,
    /// A sequence of step groups.
    #[default]
    Steps,
    /// Steps running in parallel.
    StepGroup,
    /// A DAG of tasks.
    Dag,
    /// A retry wrapper.
    Retry,
    /// A skipped node.
    Skipped,
}

/// Phase of a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodePhase {
    /// Not started.
    #[default]
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Skipped by a condition.
    Skipped,
    /// Finished with a failure.
    Failed,
    /// Could not run.
    Errored,
    /// Not reached.
    Omitted,
}

/// Status of one node in the execution tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Unique node id, `{workflow}-{suffix}`.
    pub id: String,
    /// Step name as written in the template.
    pub display_name: String,
    /// Id of the template boundary the node runs in.
    #[serde(default)]
    pub boundary_id: String,
    /// Node kind.
    #[serde(default, rename = "type")]
    pub node_type: NodeType,
    /// Node phase.
    #[serde(default)]
    pub phase: NodePhase,
    /// Failure reason reported by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NodeStatus {
    /// Returns true for a pod step that failed.
    #[must_use]
    pub fn is_failed_pod(&self) -> bool {
        self.node_type == NodeType::Pod && self.phase == NodePhase::Failed
    }

    /// Name of the pod that ran this node.
    ///
    /// Pods are named `{boundaryId}-{displayName}-{idSuffix}` where the suffix
    /// is the part of the node id after its last `-`.
    #[must_use]
    pub fn pod_name(&self) -> String {
        let suffix = self
            .id
            .rsplit_once('-')
            .map_or(self.id.as_str(), |(_, suffix)| suffix);
        format!("{}-{}-{suffix}", self.boundary_id, self.display_name)
    }
}

/// Observed state of a [`Workflow`], written by the execution engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// Overall phase.
    #[serde(default)]
    pub phase: WorkflowPhase,
    /// Engine message, set when the workflow errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Execution tree keyed by node id.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeStatus>,
}

/// Execution resource run by the external workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: WorkflowSpec,
    /// Observed state.
    #[serde(default)]
    pub status: WorkflowStatus,
}

impl_resource!(Workflow, "Workflow");
impl_status!(Workflow, WorkflowStatus);
