use std::collections::BTreeMap;

use arc_core::ObjectMeta;
use serde::{Deserialize, Serialize};

use super::{LocalObjectReference, WorkflowPhase, impl_resource, impl_status};
use crate::payload::Payload;

/// Finalizer that keeps an order alive until its workflows are gone.
pub const ORDER_FINALIZER: &str = "arc.bwi.de/order-finalizer";

/// Fallback endpoints for every artifact of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDefaults {
    /// Endpoint used as source when an artifact does not name one.
    #[serde(default)]
    pub src_ref: LocalObjectReference,
    /// Endpoint used as destination when an artifact does not name one.
    #[serde(default)]
    pub dst_ref: LocalObjectReference,
}

/// One artifact to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderArtifact {
    /// Which [`super::ArtifactType`] processes this artifact.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Source endpoint (falls back to the order defaults).
    #[serde(default)]
    pub src_ref: LocalObjectReference,
    /// Destination endpoint (falls back to the order defaults).
    #[serde(default)]
    pub dst_ref: LocalObjectReference,
    /// Free-form parameters forwarded to the workflow.
    #[serde(default, rename = "spec")]
    pub payload: Payload,
}

impl OrderArtifact {
    /// Creates an artifact of the given type with no refs and no payload.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            src_ref: LocalObjectReference::default(),
            dst_ref: LocalObjectReference::default(),
            payload: Payload::default(),
        }
    }
}

/// Desired state of an [`Order`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    /// Defaults applied to all artifacts.
    #[serde(default)]
    pub defaults: OrderDefaults,
    /// Artifacts processed by this order, in declaration order.
    #[serde(default)]
    pub artifacts: Vec<OrderArtifact>,
}

/// Last known state of one workflow created for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderArtifactWorkflowStatus {
    /// Index of the artifact in `spec.artifacts`.
    pub artifact_index: usize,
    /// Phase copied from the artifact workflow.
    #[serde(default)]
    pub phase: WorkflowPhase,
}

/// Observed state of an [`Order`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    /// Artifact workflows that exist for this order, keyed by content hash.
    #[serde(default)]
    pub artifact_workflows: BTreeMap<String, OrderArtifactWorkflowStatus>,
    /// Why the last pass could not fully converge, if it could not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A set of artifacts to transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: OrderSpec,
    /// Observed state.
    #[serde(default)]
    pub status: OrderStatus,
}

impl Order {
    /// Creates an order with the given spec and empty status.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: OrderSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: OrderStatus::default(),
        }
    }

    /// Returns the name of the artifact workflow for a content hash.
    #[must_use]
    pub fn workflow_name(&self, hash: &str) -> String {
        format!("{}-{hash}", self.metadata.name)
    }

    /// Returns true if any artifact (or the defaults) points at the endpoint.
    #[must_use]
    pub fn references_endpoint(&self, endpoint: &str) -> bool {
        let defaults = &self.spec.defaults;
        defaults.src_ref.name == endpoint
            || defaults.dst_ref.name == endpoint
            || self
                .spec
                .artifacts
                .iter()
                .any(|a| a.src_ref.name == endpoint || a.dst_ref.name == endpoint)
    }
}

impl_resource!(Order, "Order");
impl_status!(Order, OrderStatus);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_published_shape() {
        let order: Order = serde_json::from_value(json!({
            "metadata": {"name": "mirror", "namespace": "team-a"},
            "spec": {
                "defaults": {"srcRef": {"name": "docker-hub"}, "dstRef": {"name": "internal"}},
                "artifacts": [
                    {"type": "oci", "spec": {"image": "library/nginx:1.25"}},
                    {"type": "helm", "srcRef": {"name": "charts"}}
                ]
            }
        }))
        .unwrap_or_else(|e| panic!("deserialize: {e}"));

        assert_eq!(order.spec.artifacts.len(), 2);
        assert_eq!(order.spec.artifacts[0].type_name, "oci");
        assert!(order.spec.artifacts[0].src_ref.is_empty());
        assert_eq!(order.spec.artifacts[1].src_ref.name, "charts");
        assert!(order.status.artifact_workflows.is_empty());
    }

    #[test]
    fn references_endpoint_checks_defaults_and_artifacts() {
        let mut spec = OrderSpec::default();
        spec.defaults.dst_ref = LocalObjectReference::new("internal");
        let mut artifact = OrderArtifact::new("oci");
        artifact.src_ref = LocalObjectReference::new("docker-hub");
        spec.artifacts.push(artifact);
        let order = Order::new("ns", "o", spec);

        assert!(order.references_endpoint("internal"));
        assert!(order.references_endpoint("docker-hub"));
        assert!(!order.references_endpoint("quay"));
    }

    #[test]
    fn workflow_name_joins_order_name_and_hash() {
        let order = Order::new("ns", "mirror", OrderSpec::default());
        assert_eq!(order.workflow_name("0123456789abcdef"), "mirror-0123456789abcdef");
    }
}
