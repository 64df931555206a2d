//! Order reconciler.
//!
//! Drives one [`Order`] towards the set of [`ArtifactWorkflow`]s its
//! artifacts describe.
//!
//! ## State machine
//!
//! | Order state | Action |
//! |-------------|--------|
//! | active, no finalizer | add finalizer, requeue |
//! | active | resolve, hash, diff, create/delete children, copy child phases |
//! | deleting, children tracked | delete tracked children, clear status, requeue |
//! | deleting, owned children still present | delete them, requeue |
//! | deleting, nothing left | remove finalizer |
//!
//! Every pass recomputes the full desired state, so running it again on
//! unchanged inputs changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;

use arc_core::{ObjectKey, OwnerReference, Resource};

use crate::api::{
    ArtifactWorkflow, ArtifactWorkflowSpec, LocalObjectReference, ORDER_FINALIZER, Order,
    OrderArtifactWorkflowStatus, OrderStatus, WorkflowPhase,
};
use crate::config::ControllerConfig;
use crate::diff::diff_children;
use crate::error::{Error, Result, ResultExt};
use crate::hash::content_hash;
use crate::metrics::ControllerMetrics;
use crate::params::job_parameters;
use crate::resolver::{ResolvedJob, resolve_order};
use crate::runtime::{Outcome, Reconciler};
use crate::status::patch_status;
use crate::store::{Store, StoreExt};

/// Label set on artifact workflows with the name of their order.
pub const ORDER_LABEL: &str = "arc.bwi.de/order";

/// Changes to an order's status, applied to whatever version is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    /// Entries to insert or replace.
    pub upserts: BTreeMap<String, OrderArtifactWorkflowStatus>,
    /// Entries to drop.
    pub removals: BTreeSet<String>,
    /// New message, if the message should change.
    pub message: Option<Option<String>>,
}

impl StatusPatch {
    /// Applies the patch.
    pub fn apply(&self, status: &mut OrderStatus) {
        for hash in &self.removals {
            status.artifact_workflows.remove(hash);
        }
        for (hash, entry) in &self.upserts {
            status.artifact_workflows.insert(hash.clone(), entry.clone());
        }
        if let Some(message) = &self.message {
            status.message.clone_from(message);
        }
    }
}

/// A child that should exist, keyed by content hash.
#[derive(Debug, Clone)]
struct DesiredChild {
    artifact_index: usize,
    spec: ArtifactWorkflowSpec,
}

/// Reconciles orders.
pub struct OrderReconciler<S: ?Sized> {
    store: Arc<S>,
    status_retries: u32,
    metrics: ControllerMetrics,
}

impl<S: Store + ?Sized> OrderReconciler<S> {
    /// Controller name used in logs and metrics.
    pub const NAME: &'static str = "order";

    /// Creates a reconciler.
    #[must_use]
    pub fn new(store: Arc<S>, config: &ControllerConfig) -> Self {
        Self {
            store,
            status_retries: config.status_retries,
            metrics: ControllerMetrics::new(Self::NAME),
        }
    }

    /// Runs one reconcile pass for the order at `key`.
    ///
    /// # Errors
    ///
    /// Returns resolution errors (after recording them on the order status)
    /// and store errors other than the tolerated `NotFound`/`AlreadyExists`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome> {
        let Some(order) = self
            .store
            .get::<Order>(key)
            .await
            .map_err(Error::from)
            .ignore_not_found()?
        else {
            tracing::debug!("order no longer exists");
            return Ok(Outcome::done());
        };

        if order.metadata.is_deleting() {
            return self.finalize(order).await;
        }

        if !order.metadata.has_finalizer(ORDER_FINALIZER) {
            let mut order = order;
            order.metadata.add_finalizer(ORDER_FINALIZER);
            self.store.update(&order).await?;
            tracing::debug!("added order finalizer");
            return Ok(Outcome::requeue());
        }

        self.converge(order).await
    }

    async fn converge(&self, order: Order) -> Result<Outcome> {
        let resolved = resolve_order(self.store.as_ref(), &order).await;
        let jobs = match resolved {
            Ok(jobs) => jobs,
            Err(err) if err.is_resolution() => {
                tracing::warn!(error = %err, "failed to resolve order artifacts");
                let message = Some(err.to_string());
                self.write_status(
                    order,
                    StatusPatch {
                        message: Some(message),
                        ..StatusPatch::default()
                    },
                )
                .await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let namespace = order.metadata.namespace.clone();
        let mut desired: BTreeMap<String, DesiredChild> = BTreeMap::new();
        let mut failures = Vec::new();
        for job in &jobs {
            match desired_child(&namespace, job) {
                Ok((hash, child)) => {
                    desired.entry(hash).or_insert(child);
                }
                Err(err @ Error::Serialization { .. }) => {
                    tracing::warn!(
                        artifact_index = job.artifact_index,
                        error = %err,
                        "skipping artifact with malformed payload"
                    );
                    failures.push(format!("artifact {}: {err}", job.artifact_index));
                }
                Err(err) => return Err(err),
            }
        }

        let tracked = &order.status.artifact_workflows;
        let diff = diff_children(&desired, tracked);
        let mut patch = StatusPatch {
            message: Some((!failures.is_empty()).then(|| failures.join("; "))),
            ..StatusPatch::default()
        };

        for hash in &diff.to_create {
            let Some(child) = desired.get(hash) else {
                continue;
            };
            self.create_child(&order, hash, &child.spec).await?;
            patch.upserts.insert(
                hash.clone(),
                OrderArtifactWorkflowStatus {
                    artifact_index: child.artifact_index,
                    phase: WorkflowPhase::Unspecified,
                },
            );
        }

        for hash in &diff.to_delete {
            self.delete_child(&order, hash).await?;
            patch.removals.insert(hash.clone());
        }

        for hash in &diff.to_check {
            let (Some(child), Some(entry)) = (desired.get(hash), tracked.get(hash)) else {
                continue;
            };
            let key = ObjectKey::new(namespace.clone(), order.workflow_name(hash));
            let phase = match self
                .store
                .get::<ArtifactWorkflow>(&key)
                .await
                .map_err(Error::from)
                .ignore_not_found()?
            {
                Some(aw) => aw.status.phase,
                None => {
                    tracing::info!(hash = %hash, "artifact workflow disappeared, recreating");
                    self.create_child(&order, hash, &child.spec).await?;
                    WorkflowPhase::Unspecified
                }
            };
            if phase != entry.phase || child.artifact_index != entry.artifact_index {
                tracing::debug!(hash = %hash, phase = %phase, "artifact workflow phase changed");
                patch.upserts.insert(
                    hash.clone(),
                    OrderArtifactWorkflowStatus {
                        artifact_index: child.artifact_index,
                        phase,
                    },
                );
            }
        }

        let order = self.write_status(order, patch).await?;
        let pending = order
            .status
            .artifact_workflows
            .values()
            .any(|entry| !entry.phase.is_terminal());

        tracing::debug!(
            created = diff.to_create.len(),
            deleted = diff.to_delete.len(),
            checked = diff.to_check.len(),
            "order reconciled"
        );
        Ok(if pending {
            Outcome::requeue()
        } else {
            Outcome::done()
        })
    }

    async fn finalize(&self, order: Order) -> Result<Outcome> {
        if !order.metadata.has_finalizer(ORDER_FINALIZER) {
            return Ok(Outcome::done());
        }

        if !order.status.artifact_workflows.is_empty() {
            let mut patch = StatusPatch::default();
            for hash in order.status.artifact_workflows.keys() {
                self.delete_child(&order, hash).await?;
                patch.removals.insert(hash.clone());
            }
            self.write_status(order, patch).await?;
            return Ok(Outcome::requeue());
        }

        let remaining: Vec<ArtifactWorkflow> = self
            .store
            .list::<ArtifactWorkflow>(Some(&order.metadata.namespace))
            .await?
            .into_iter()
            .filter(|aw| aw.metadata.is_owned_by(Order::KIND, &order.metadata.uid))
            .collect();
        if !remaining.is_empty() {
            for aw in remaining.iter().filter(|aw| !aw.metadata.is_deleting()) {
                self.store
                    .delete::<ArtifactWorkflow>(&aw.metadata.key())
                    .await
                    .map_err(Error::from)
                    .ignore_not_found()?;
            }
            tracing::debug!(
                remaining = remaining.len(),
                "waiting for artifact workflows to finish deleting"
            );
            return Ok(Outcome::requeue());
        }

        let mut order = order;
        order.metadata.remove_finalizer(ORDER_FINALIZER);
        self.store.update(&order).await?;
        tracing::info!("order finalized");
        Ok(Outcome::done())
    }

    async fn create_child(&self, order: &Order, hash: &str, spec: &ArtifactWorkflowSpec) -> Result<()> {
        let mut aw = ArtifactWorkflow::new(
            order.metadata.namespace.clone(),
            order.workflow_name(hash),
            spec.clone(),
        );
        aw.metadata
            .owner_references
            .push(OwnerReference::controller_of(order));
        aw.metadata
            .labels
            .insert(ORDER_LABEL.to_string(), order.metadata.name.clone());

        match self.store.create(&aw).await.map_err(Error::from).ignore_already_exists()? {
            Some(_) => {
                self.metrics.record_child_created(ArtifactWorkflow::KIND);
                tracing::info!(hash = %hash, name = %aw.metadata.name, "created artifact workflow");
            }
            None => tracing::debug!(hash = %hash, "artifact workflow already exists"),
        }
        Ok(())
    }

    async fn delete_child(&self, order: &Order, hash: &str) -> Result<()> {
        let key = ObjectKey::new(order.metadata.namespace.clone(), order.workflow_name(hash));
        if self
            .store
            .delete::<ArtifactWorkflow>(&key)
            .await
            .map_err(Error::from)
            .ignore_not_found()?
            .is_some()
        {
            self.metrics.record_child_deleted(ArtifactWorkflow::KIND);
            tracing::info!(hash = %hash, "deleted artifact workflow");
        }
        Ok(())
    }

    async fn write_status(&self, order: Order, patch: StatusPatch) -> Result<Order> {
        patch_status(
            self.store.as_ref(),
            order,
            self.status_retries,
            &self.metrics,
            |status| patch.apply(status),
        )
        .await
    }
}

#[async_trait]
impl<S: Store + ?Sized + 'static> Reconciler for OrderReconciler<S> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome> {
        OrderReconciler::reconcile(self, key).await
    }
}

/// Computes the identity and spec of the child for a resolved job.
fn desired_child(namespace: &str, job: &ResolvedJob) -> Result<(String, DesiredChild)> {
    let hash = content_hash(namespace, job)?;
    let spec = ArtifactWorkflowSpec {
        type_name: job.artifact.type_name.clone(),
        parameters: job_parameters(job)?,
        src_secret_ref: secret_ref(job.src.secret_name()),
        dst_secret_ref: secret_ref(job.dst.secret_name()),
    };
    Ok((
        hash.into(),
        DesiredChild {
            artifact_index: job.artifact_index,
            spec,
        },
    ))
}

fn secret_ref(name: Option<&str>) -> LocalObjectReference {
    name.map(LocalObjectReference::new).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_applies_removals_upserts_and_message() {
        let mut status = OrderStatus::default();
        status.artifact_workflows.insert(
            "old".into(),
            OrderArtifactWorkflowStatus {
                artifact_index: 0,
                phase: WorkflowPhase::Running,
            },
        );
        status.message = Some("stale".into());

        let mut patch = StatusPatch {
            message: Some(None),
            ..StatusPatch::default()
        };
        patch.removals.insert("old".into());
        patch.upserts.insert(
            "new".into(),
            OrderArtifactWorkflowStatus {
                artifact_index: 1,
                phase: WorkflowPhase::Unspecified,
            },
        );
        patch.apply(&mut status);

        assert!(!status.artifact_workflows.contains_key("old"));
        assert_eq!(status.artifact_workflows["new"].artifact_index, 1);
        assert_eq!(status.message, None);
    }

    #[test]
    fn empty_patch_keeps_message() {
        let mut status = OrderStatus {
            message: Some("keep".into()),
            ..OrderStatus::default()
        };
        StatusPatch::default().apply(&mut status);
        assert_eq!(status.message.as_deref(), Some("keep"));
    }
}
