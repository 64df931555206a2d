use std::collections::BTreeMap;

use arc_core::ObjectMeta;
use serde::{Deserialize, Serialize};

use super::impl_resource;

/// Opaque credentials referenced by endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Credential material, never logged.
    #[serde(default)]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    /// Creates a secret.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            data,
        }
    }
}

impl_resource!(Secret, "Secret");
