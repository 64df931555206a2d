//! Content-addressed identity for resolved jobs.
//!
//! A [`ContentHash`] is the first 16 hex characters of a SHA-256 digest over
//! the canonical JSON of a fixed-shape preimage. The preimage covers the
//! order namespace, the artifact type and payload, and the name and
//! generation of every endpoint and secret the job resolved to. Editing any
//! of those yields a new hash, which the order reconciler turns into a
//! replace of the artifact workflow.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use arc_core::canonical_json;

use crate::error::{Error, Result};
use crate::payload::Payload;
use crate::resolver::{ResolvedEndpoint, ResolvedJob};

/// Bumped whenever the preimage layout changes.
pub const CONTENT_HASH_VERSION: u32 = 1;

/// Number of hex characters kept from the digest.
pub const CONTENT_HASH_LEN: usize = 16;

/// Stable identity of a resolved job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialIdentity<'a> {
    name: &'a str,
    generation: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceIdentity<'a> {
    name: &'a str,
    generation: u64,
    credential: Option<CredentialIdentity<'a>>,
}

impl<'a> From<&'a ResolvedEndpoint> for ReferenceIdentity<'a> {
    fn from(resolved: &'a ResolvedEndpoint) -> Self {
        Self {
            name: &resolved.endpoint.metadata.name,
            generation: resolved.endpoint.metadata.generation,
            credential: resolved.secret.as_ref().map(|s| CredentialIdentity {
                name: &s.metadata.name,
                generation: s.metadata.generation,
            }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentHashPreimage<'a> {
    version: u32,
    namespace: &'a str,
    #[serde(rename = "type")]
    type_name: &'a str,
    payload: &'a Payload,
    src: ReferenceIdentity<'a>,
    dst: ReferenceIdentity<'a>,
}

/// Computes the content hash of a resolved job within a namespace.
///
/// # Errors
///
/// Returns `Error::Serialization` if the payload cannot be written as
/// canonical JSON.
pub fn content_hash(namespace: &str, job: &ResolvedJob) -> Result<ContentHash> {
    let preimage = ContentHashPreimage {
        version: CONTENT_HASH_VERSION,
        namespace,
        type_name: &job.artifact.type_name,
        payload: &job.artifact.payload,
        src: ReferenceIdentity::from(&job.src),
        dst: ReferenceIdentity::from(&job.dst),
    };

    let canonical = canonical_json::to_canonical_bytes(&preimage).map_err(|e| {
        Error::serialization(format!(
            "failed to serialize content hash preimage to canonical JSON: {e}"
        ))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(format!("arc-artifact-workflow:v{CONTENT_HASH_VERSION}:").as_bytes());
    hasher.update(&canonical);
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(CONTENT_HASH_LEN);
    Ok(ContentHash(digest))
}
