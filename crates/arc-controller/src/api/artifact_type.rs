use arc_core::ObjectMeta;
use serde::{Deserialize, Serialize};

use super::{LocalObjectReference, Parameter, impl_resource};

/// Endpoint types an artifact type can work with. Empty lists allow any type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactTypeRules {
    /// Endpoint types supported as source.
    #[serde(default)]
    pub src_types: Vec<String>,
    /// Endpoint types supported as destination.
    #[serde(default)]
    pub dst_types: Vec<String>,
}

impl ArtifactTypeRules {
    /// Returns true if an endpoint of `endpoint_type` may be used as source.
    #[must_use]
    pub fn allows_src(&self, endpoint_type: &str) -> bool {
        self.src_types.is_empty() || self.src_types.iter().any(|t| t == endpoint_type)
    }

    /// Returns true if an endpoint of `endpoint_type` may be used as destination.
    #[must_use]
    pub fn allows_dst(&self, endpoint_type: &str) -> bool {
        self.dst_types.is_empty() || self.dst_types.iter().any(|t| t == endpoint_type)
    }
}

/// Desired state of an [`ArtifactType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactTypeSpec {
    /// Endpoint type rules.
    #[serde(default)]
    pub rules: ArtifactTypeRules,
    /// Extra parameters appended to every workflow of this type.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Cluster workflow template that implements the transfer.
    pub workflow_template_ref: LocalObjectReference,
}

/// A kind of artifact and the workflow template that transfers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactType {
    /// Object metadata (cluster-scoped).
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: ArtifactTypeSpec,
}

impl ArtifactType {
    /// Creates a cluster-scoped artifact type.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: ArtifactTypeSpec) -> Self {
        Self {
            metadata: ObjectMeta::cluster(name),
            spec,
        }
    }
}

impl_resource!(ArtifactType, "ArtifactType", false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rules_allow_everything() {
        let rules = ArtifactTypeRules::default();
        assert!(rules.allows_src("oci"));
        assert!(rules.allows_dst("s3"));
    }

    #[test]
    fn rules_restrict_listed_directions_only() {
        let rules = ArtifactTypeRules {
            src_types: vec!["oci".into()],
            dst_types: vec![],
        };
        assert!(rules.allows_src("oci"));
        assert!(!rules.allows_src("helm"));
        assert!(rules.allows_dst("helm"));
    }
}
