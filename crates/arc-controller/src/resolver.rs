//! Resolution of artifact references against current reference data.
//!
//! Each artifact of an order names (or inherits) a source and a destination
//! endpoint. Resolution looks those up together with the artifact type and
//! the endpoints' credentials, and checks that the endpoints may be used the
//! way the artifact asks for. Any failure aborts the whole order pass.

use arc_core::ObjectKey;

use crate::api::{
    ArtifactType, Endpoint, LocalObjectReference, Order, OrderArtifact, OrderDefaults, Secret,
};
use crate::error::{Error, Result, ResultExt};
use crate::store::{Store, StoreExt};

/// Which side of a transfer an endpoint is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The endpoint artifacts are pulled from.
    Source,
    /// The endpoint artifacts are pushed to.
    Destination,
}

impl Role {
    /// Returns the role name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

/// An endpoint together with its credentials, if it declares any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// The endpoint as currently stored.
    pub endpoint: Endpoint,
    /// The secret named by the endpoint.
    pub secret: Option<Secret>,
}

impl ResolvedEndpoint {
    /// Name of the endpoint's secret, if it has one.
    #[must_use]
    pub fn secret_name(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.metadata.name.as_str())
    }
}

/// Everything needed to identify and materialize one artifact workflow.
///
/// Computed fresh on every pass and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJob {
    /// Index of the artifact in the order spec.
    pub artifact_index: usize,
    /// The artifact as declared.
    pub artifact: OrderArtifact,
    /// Resolved source.
    pub src: ResolvedEndpoint,
    /// Resolved destination.
    pub dst: ResolvedEndpoint,
}

/// Picks the explicit reference if set, otherwise the default.
#[must_use]
pub fn effective_ref<'a>(
    explicit: &'a LocalObjectReference,
    default: &'a LocalObjectReference,
) -> Option<&'a str> {
    explicit.as_name().or_else(|| default.as_name())
}

/// Resolves every artifact of an order, in declaration order.
///
/// # Errors
///
/// Returns the first resolution error: `ReferenceNotFound`,
/// `CredentialNotFound`, `UnknownArtifactType` or `EndpointRuleViolation`.
/// Store failures other than `NotFound` are returned unchanged.
pub async fn resolve_order<S: Store + ?Sized>(store: &S, order: &Order) -> Result<Vec<ResolvedJob>> {
    let namespace = order.metadata.namespace.as_str();
    let mut jobs = Vec::with_capacity(order.spec.artifacts.len());
    for (index, artifact) in order.spec.artifacts.iter().enumerate() {
        jobs.push(resolve_artifact(store, namespace, &order.spec.defaults, index, artifact).await?);
    }
    Ok(jobs)
}

/// Resolves a single artifact.
///
/// # Errors
///
/// See [`resolve_order`].
pub async fn resolve_artifact<S: Store + ?Sized>(
    store: &S,
    namespace: &str,
    defaults: &OrderDefaults,
    artifact_index: usize,
    artifact: &OrderArtifact,
) -> Result<ResolvedJob> {
    let artifact_type = resolve_artifact_type(store, &artifact.type_name).await?;

    let src = resolve_endpoint(
        store,
        namespace,
        Role::Source,
        artifact_index,
        effective_ref(&artifact.src_ref, &defaults.src_ref),
    )
    .await?;
    check_endpoint_rules(&artifact_type, Role::Source, &src.endpoint)?;

    let dst = resolve_endpoint(
        store,
        namespace,
        Role::Destination,
        artifact_index,
        effective_ref(&artifact.dst_ref, &defaults.dst_ref),
    )
    .await?;
    check_endpoint_rules(&artifact_type, Role::Destination, &dst.endpoint)?;

    Ok(ResolvedJob {
        artifact_index,
        artifact: artifact.clone(),
        src,
        dst,
    })
}

/// Fetches a cluster-scoped artifact type.
///
/// # Errors
///
/// Returns `UnknownArtifactType` if it does not exist.
pub async fn resolve_artifact_type<S: Store + ?Sized>(
    store: &S,
    name: &str,
) -> Result<ArtifactType> {
    store
        .get::<ArtifactType>(&ObjectKey::cluster(name))
        .await
        .map_err(Error::from)
        .ignore_not_found()?
        .ok_or_else(|| Error::UnknownArtifactType {
            name: name.to_string(),
        })
}

/// Fetches a secret by name.
///
/// # Errors
///
/// Returns `CredentialNotFound` naming `referenced_by` if it does not exist.
pub async fn resolve_secret<S: Store + ?Sized>(
    store: &S,
    namespace: &str,
    referenced_by: &str,
    name: &str,
) -> Result<Secret> {
    store
        .get::<Secret>(&ObjectKey::new(namespace, name))
        .await
        .map_err(Error::from)
        .ignore_not_found()?
        .ok_or_else(|| Error::CredentialNotFound {
            referenced_by: referenced_by.to_string(),
            secret: name.to_string(),
        })
}

async fn resolve_endpoint<S: Store + ?Sized>(
    store: &S,
    namespace: &str,
    role: Role,
    artifact_index: usize,
    name: Option<&str>,
) -> Result<ResolvedEndpoint> {
    let Some(name) = name else {
        return Err(Error::ReferenceNotFound {
            role: role.as_str(),
            artifact_index,
            reason: "no endpoint named and no default set".into(),
        });
    };

    let endpoint = store
        .get::<Endpoint>(&ObjectKey::new(namespace, name))
        .await
        .map_err(Error::from)
        .ignore_not_found()?
        .ok_or_else(|| Error::ReferenceNotFound {
            role: role.as_str(),
            artifact_index,
            reason: format!("endpoint '{name}' does not exist"),
        })?;

    let secret = match endpoint.spec.secret_ref.as_name() {
        Some(secret) => Some(resolve_secret(store, namespace, name, secret).await?),
        None => None,
    };

    Ok(ResolvedEndpoint { endpoint, secret })
}

fn check_endpoint_rules(artifact_type: &ArtifactType, role: Role, endpoint: &Endpoint) -> Result<()> {
    let rules = &artifact_type.spec.rules;
    let endpoint_type = endpoint.spec.type_name.as_str();
    let usage = endpoint.spec.usage;

    let violation = match role {
        Role::Source if !usage.allows_pull() => Some(format!("usage is {usage:?}")),
        Role::Destination if !usage.allows_push() => Some(format!("usage is {usage:?}")),
        Role::Source if !rules.allows_src(endpoint_type) => Some(format!(
            "artifact type '{}' does not accept '{endpoint_type}' sources",
            artifact_type.metadata.name
        )),
        Role::Destination if !rules.allows_dst(endpoint_type) => Some(format!(
            "artifact type '{}' does not accept '{endpoint_type}' destinations",
            artifact_type.metadata.name
        )),
        _ => None,
    };

    match violation {
        Some(reason) => Err(Error::EndpointRuleViolation {
            endpoint: endpoint.metadata.name.clone(),
            role: role.as_str(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::api::{
        ArtifactTypeRules, ArtifactTypeSpec, EndpointSpec, EndpointUsage, OrderSpec,
    };
    use crate::store::InMemoryStore;

    fn endpoint(name: &str, secret: Option<&str>, usage: EndpointUsage) -> Endpoint {
        Endpoint::new(
            "ns",
            name,
            EndpointSpec {
                type_name: "oci".into(),
                remote_url: format!("https://{name}.example"),
                secret_ref: secret.map(LocalObjectReference::new).unwrap_or_default(),
                usage,
            },
        )
    }

    async fn seeded() -> Result<InMemoryStore> {
        let store = InMemoryStore::new();
        store
            .create(&ArtifactType::new(
                "oci",
                ArtifactTypeSpec {
                    workflow_template_ref: LocalObjectReference::new("oci-transfer"),
                    ..ArtifactTypeSpec::default()
                },
            ))
            .await?;
        store
            .create(&endpoint("hub", Some("hub-creds"), EndpointUsage::PullOnly))
            .await?;
        store
            .create(&endpoint("internal", None, EndpointUsage::All))
            .await?;
        store
            .create(&Secret::new("ns", "hub-creds", BTreeMap::new()))
            .await?;
        Ok(store)
    }

    fn order_with(artifact: OrderArtifact, defaults: OrderDefaults) -> Order {
        Order::new(
            "ns",
            "o",
            OrderSpec {
                defaults,
                artifacts: vec![artifact],
            },
        )
    }

    #[test]
    fn explicit_ref_wins_over_default() {
        let explicit = LocalObjectReference::new("a");
        let default = LocalObjectReference::new("b");
        let empty = LocalObjectReference::default();
        assert_eq!(effective_ref(&explicit, &default), Some("a"));
        assert_eq!(effective_ref(&empty, &default), Some("b"));
        assert_eq!(effective_ref(&empty, &empty), None);
    }

    #[tokio::test]
    async fn defaults_fill_missing_refs() -> Result<()> {
        let store = seeded().await?;
        let defaults = OrderDefaults {
            src_ref: LocalObjectReference::new("hub"),
            dst_ref: LocalObjectReference::new("internal"),
        };
        let jobs = resolve_order(&store, &order_with(OrderArtifact::new("oci"), defaults)).await?;

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].src.endpoint.metadata.name, "hub");
        assert_eq!(jobs[0].src.secret_name(), Some("hub-creds"));
        assert_eq!(jobs[0].dst.endpoint.metadata.name, "internal");
        assert!(jobs[0].dst.secret.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn missing_ref_without_default_fails() -> Result<()> {
        let store = seeded().await?;
        let mut artifact = OrderArtifact::new("oci");
        artifact.src_ref = LocalObjectReference::new("hub");
        let err = resolve_order(&store, &order_with(artifact, OrderDefaults::default())).await;

        assert!(matches!(
            err,
            Err(Error::ReferenceNotFound { role: "destination", artifact_index: 0, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_endpoint_and_secret_are_distinguished() -> Result<()> {
        let store = seeded().await?;
        let mut artifact = OrderArtifact::new("oci");
        artifact.src_ref = LocalObjectReference::new("nope");
        artifact.dst_ref = LocalObjectReference::new("internal");
        let err = resolve_order(&store, &order_with(artifact, OrderDefaults::default())).await;
        assert!(matches!(err, Err(Error::ReferenceNotFound { role: "source", .. })));

        store
            .create(&endpoint("locked", Some("gone"), EndpointUsage::All))
            .await?;
        let mut artifact = OrderArtifact::new("oci");
        artifact.src_ref = LocalObjectReference::new("locked");
        artifact.dst_ref = LocalObjectReference::new("internal");
        let err = resolve_order(&store, &order_with(artifact, OrderDefaults::default())).await;
        assert!(matches!(
            err,
            Err(Error::CredentialNotFound { ref referenced_by, ref secret })
                if referenced_by == "locked" && secret == "gone"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn usage_and_type_rules_are_enforced() -> Result<()> {
        let store = seeded().await?;
        let mut artifact = OrderArtifact::new("oci");
        artifact.src_ref = LocalObjectReference::new("internal");
        artifact.dst_ref = LocalObjectReference::new("hub");
        let err = resolve_order(&store, &order_with(artifact, OrderDefaults::default())).await;
        assert!(matches!(
            err,
            Err(Error::EndpointRuleViolation { role: "destination", .. })
        ));

        store
            .create(&ArtifactType::new(
                "helm",
                ArtifactTypeSpec {
                    rules: ArtifactTypeRules {
                        src_types: vec!["helm".into()],
                        dst_types: vec![],
                    },
                    ..ArtifactTypeSpec::default()
                },
            ))
            .await?;
        let mut artifact = OrderArtifact::new("helm");
        artifact.src_ref = LocalObjectReference::new("hub");
        artifact.dst_ref = LocalObjectReference::new("internal");
        let err = resolve_order(&store, &order_with(artifact, OrderDefaults::default())).await;
        assert!(matches!(
            err,
            Err(Error::EndpointRuleViolation { role: "source", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_artifact_type_fails() -> Result<()> {
        let store = seeded().await?;
        let err = resolve_order(
            &store,
            &order_with(OrderArtifact::new("deb"), OrderDefaults::default()),
        )
        .await;
        assert!(matches!(err, Err(Error::UnknownArtifactType { ref name }) if name == "deb"));
        Ok(())
    }
}
