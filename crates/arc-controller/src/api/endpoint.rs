use arc_core::ObjectMeta;
use serde::{Deserialize, Serialize};

use super::{LocalObjectReference, impl_resource};

/// How an endpoint may be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointUsage {
    /// Only usable as a source.
    PullOnly,
    /// Only usable as a destination.
    PushOnly,
    /// Usable both ways.
    #[default]
    All,
}

impl EndpointUsage {
    /// Returns true if the endpoint may be read from.
    #[must_use]
    pub const fn allows_pull(self) -> bool {
        matches!(self, Self::PullOnly | Self::All)
    }

    /// Returns true if the endpoint may be written to.
    #[must_use]
    pub const fn allows_push(self) -> bool {
        matches!(self, Self::PushOnly | Self::All)
    }
}

/// Desired state of an [`Endpoint`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// Endpoint type (for example `oci` or `helm`).
    #[serde(rename = "type")]
    pub type_name: String,
    /// URL used to reach the endpoint.
    #[serde(rename = "remoteURL")]
    pub remote_url: String,
    /// Secret holding credentials for the endpoint.
    #[serde(default)]
    pub secret_ref: LocalObjectReference,
    /// Allowed usage.
    #[serde(default)]
    pub usage: EndpointUsage,
}

/// A remote registry or repository artifacts are pulled from or pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: EndpointSpec,
}

impl Endpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: EndpointSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
        }
    }
}

impl_resource!(Endpoint, "Endpoint");

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn usage_defaults_to_all() {
        let spec: EndpointSpec =
            serde_json::from_value(json!({"type": "oci", "remoteURL": "https://r.example"}))
                .unwrap_or_else(|e| panic!("deserialize: {e}"));
        assert_eq!(spec.usage, EndpointUsage::All);
        assert!(spec.secret_ref.is_empty());
    }

    #[test]
    fn usage_restricts_direction() {
        assert!(EndpointUsage::PullOnly.allows_pull());
        assert!(!EndpointUsage::PullOnly.allows_push());
        assert!(EndpointUsage::PushOnly.allows_push());
        assert!(!EndpointUsage::PushOnly.allows_pull());
    }
}
