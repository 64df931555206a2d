//! Artifact workflow reconciler.
//!
//! Turns one [`ArtifactWorkflow`] into a [`Workflow`] for the execution
//! engine and mirrors the workflow's phase back.
//!
//! ```text
//!   Unspecified ── materialize ──► Pending ── poll ──► Running ── poll ──► terminal
//!        │                                                                   │
//!        └── duplicate parameters ──► Failed                          (no-op afterwards)
//! ```
//!
//! The finalizer is in place before the workflow is created and is only
//! dropped once the workflow is confirmed gone.

use std::sync::Arc;

use async_trait::async_trait;

use arc_core::{ObjectKey, ObjectMeta, OwnerReference, Resource};

use crate::api::{
    ARTIFACT_WORKFLOW_FINALIZER, ArtifactWorkflow, Volume, Workflow, WorkflowPhase, WorkflowSpec,
    WorkflowStatus, WorkflowTemplateRef,
};
use crate::config::ControllerConfig;
use crate::error::{Error, Result, ResultExt};
use crate::logs::{LogSource, MAIN_CONTAINER};
use crate::metrics::ControllerMetrics;
use crate::params::validate_no_duplicate_parameters;
use crate::resolver::{resolve_artifact_type, resolve_secret};
use crate::runtime::{Outcome, Reconciler};
use crate::status::patch_status;
use crate::store::{Store, StoreExt};

/// Volume carrying source credentials.
pub const SRC_SECRET_VOLUME: &str = "src-secret-vol";
/// Volume carrying destination credentials.
pub const DST_SECRET_VOLUME: &str = "dst-secret-vol";

/// Reconciles artifact workflows.
pub struct ArtifactWorkflowReconciler<S: ?Sized, L: ?Sized> {
    store: Arc<S>,
    logs: Arc<L>,
    status_retries: u32,
    log_tail_lines: usize,
    metrics: ControllerMetrics,
}

impl<S, L> ArtifactWorkflowReconciler<S, L>
where
    S: Store + ?Sized,
    L: LogSource + ?Sized,
{
    /// Controller name used in logs and metrics.
    pub const NAME: &'static str = "artifact_workflow";

    /// Creates a reconciler.
    #[must_use]
    pub fn new(store: Arc<S>, logs: Arc<L>, config: &ControllerConfig) -> Self {
        Self {
            store,
            logs,
            status_retries: config.status_retries,
            log_tail_lines: config.log_tail_lines,
            metrics: ControllerMetrics::new(Self::NAME),
        }
    }

    /// Runs one reconcile pass for the artifact workflow at `key`.
    ///
    /// # Errors
    ///
    /// Returns a missing artifact type or secret (after recording it on the
    /// status) and store errors other than the tolerated ones.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome> {
        let Some(aw) = self
            .store
            .get::<ArtifactWorkflow>(key)
            .await
            .map_err(Error::from)
            .ignore_not_found()?
        else {
            tracing::debug!("artifact workflow no longer exists");
            return Ok(Outcome::done());
        };

        if aw.metadata.is_deleting() {
            return self.finalize(aw).await;
        }

        if !aw.metadata.has_finalizer(ARTIFACT_WORKFLOW_FINALIZER) {
            let mut aw = aw;
            aw.metadata.add_finalizer(ARTIFACT_WORKFLOW_FINALIZER);
            self.store.update(&aw).await?;
            tracing::debug!("added artifact workflow finalizer");
            return Ok(Outcome::requeue());
        }

        match aw.status.phase {
            WorkflowPhase::Unspecified => self.materialize(aw).await,
            phase if phase.is_terminal() => Ok(Outcome::done()),
            _ => self.check(aw).await,
        }
    }

    async fn materialize(&self, aw: ArtifactWorkflow) -> Result<Outcome> {
        let namespace = aw.metadata.namespace.clone();

        let resolved = resolve_artifact_type(self.store.as_ref(), &aw.spec.type_name).await;
        let artifact_type = match resolved {
            Ok(artifact_type) => artifact_type,
            Err(err) => return self.fail_pass(aw, err).await,
        };

        let secret_names = [
            aw.spec.src_secret_ref.as_name().map(str::to_string),
            aw.spec.dst_secret_ref.as_name().map(str::to_string),
        ];
        let mut secrets = Vec::with_capacity(secret_names.len());
        for name in secret_names {
            let Some(name) = name else {
                secrets.push(None);
                continue;
            };
            let resolved =
                resolve_secret(self.store.as_ref(), &namespace, &aw.metadata.name, &name).await;
            match resolved {
                Ok(secret) => secrets.push(Some(secret.metadata.name)),
                Err(err) => return self.fail_pass(aw, err).await,
            }
        }
        let dst_secret = secrets.pop().flatten();
        let src_secret = secrets.pop().flatten();

        let mut arguments = aw.spec.parameters.clone();
        arguments.extend(artifact_type.spec.parameters.iter().cloned());
        if let Err(err) = validate_no_duplicate_parameters(&arguments) {
            tracing::warn!(error = %err, "rejecting artifact workflow");
            let message = err.to_string();
            self.write_status(aw, move |status| {
                status.phase = WorkflowPhase::Failed;
                status.message = Some(message.clone());
            })
            .await?;
            self.metrics.record_phase_transition(WorkflowPhase::Failed.as_str());
            return Ok(Outcome::done());
        }

        let mut metadata = ObjectMeta::new(namespace, aw.metadata.name.clone());
        metadata
            .owner_references
            .push(OwnerReference::controller_of(&aw));
        let workflow = Workflow {
            metadata,
            spec: WorkflowSpec {
                workflow_template_ref: WorkflowTemplateRef {
                    name: artifact_type.spec.workflow_template_ref.name.clone(),
                    cluster_scope: true,
                },
                volumes: vec![
                    Volume::secret_or_empty(SRC_SECRET_VOLUME, src_secret.as_deref()),
                    Volume::secret_or_empty(DST_SECRET_VOLUME, dst_secret.as_deref()),
                ],
                arguments,
            },
            status: WorkflowStatus::default(),
        };

        if self
            .store
            .create(&workflow)
            .await
            .map_err(Error::from)
            .ignore_already_exists()?
            .is_some()
        {
            self.metrics.record_child_created(Workflow::KIND);
            tracing::info!(
                template = %workflow.spec.workflow_template_ref.name,
                "created workflow"
            );
        }

        self.write_status(aw, |status| {
            status.phase = WorkflowPhase::Pending;
            status.message = None;
        })
        .await?;
        self.metrics.record_phase_transition(WorkflowPhase::Pending.as_str());
        Ok(Outcome::requeue())
    }

    async fn check(&self, aw: ArtifactWorkflow) -> Result<Outcome> {
        let key = aw.metadata.key();
        let Some(workflow) = self
            .store
            .get::<Workflow>(&key)
            .await
            .map_err(Error::from)
            .ignore_not_found()?
        else {
            tracing::info!("workflow disappeared, recreating");
            return self.materialize(aw).await;
        };

        // The engine has not picked the workflow up yet.
        let phase = match workflow.status.phase {
            WorkflowPhase::Unspecified => WorkflowPhase::Pending,
            phase => phase,
        };

        let message = match (&aw.status.message, phase) {
            (Some(existing), _) => Some(existing.clone()),
            (None, WorkflowPhase::Failed) => self.diagnose(&workflow).await,
            (None, WorkflowPhase::Errored) => workflow.status.message.clone(),
            (None, _) => None,
        };

        if phase != aw.status.phase {
            tracing::info!(from = %aw.status.phase, to = %phase, "workflow phase changed");
            self.metrics.record_phase_transition(phase.as_str());
        }
        self.write_status(aw, move |status| {
            status.phase = phase;
            status.message.clone_from(&message);
        })
        .await?;

        Ok(if phase.is_terminal() {
            Outcome::done()
        } else {
            Outcome::requeue()
        })
    }

    /// Builds a message from the failed pod steps of a workflow and their logs.
    async fn diagnose(&self, workflow: &Workflow) -> Option<String> {
        let namespace = &workflow.metadata.namespace;
        let mut message = String::new();
        for node in workflow.status.nodes.values().filter(|n| n.is_failed_pod()) {
            let pod = node.pod_name();
            let logs = match self
                .logs
                .tail(namespace, &pod, MAIN_CONTAINER, self.log_tail_lines)
                .await
            {
                Ok(logs) => logs,
                Err(err) => {
                    tracing::debug!(pod = %pod, error = %err, "failed to fetch pod logs");
                    String::new()
                }
            };
            message.push_str(&format!(
                "Step '{}' failed:\n{}\nLogs:\n{}\n\n",
                node.display_name,
                node.message.as_deref().unwrap_or_default(),
                logs
            ));
        }
        (!message.is_empty()).then_some(message)
    }

    async fn finalize(&self, aw: ArtifactWorkflow) -> Result<Outcome> {
        if !aw.metadata.has_finalizer(ARTIFACT_WORKFLOW_FINALIZER) {
            return Ok(Outcome::done());
        }

        let key = aw.metadata.key();
        if self
            .store
            .delete::<Workflow>(&key)
            .await
            .map_err(Error::from)
            .ignore_not_found()?
            .is_some()
        {
            self.metrics.record_child_deleted(Workflow::KIND);
            tracing::info!("deleted workflow");
        }

        let still_there = self
            .store
            .get::<Workflow>(&key)
            .await
            .map_err(Error::from)
            .ignore_not_found()?
            .is_some();
        if still_there {
            tracing::debug!("waiting for workflow deletion");
            return Ok(Outcome::requeue());
        }

        let mut aw = aw;
        aw.metadata.remove_finalizer(ARTIFACT_WORKFLOW_FINALIZER);
        self.store.update(&aw).await?;
        tracing::info!("artifact workflow finalized");
        Ok(Outcome::done())
    }

    /// Records why the pass could not proceed and returns the error for retry.
    async fn fail_pass(&self, aw: ArtifactWorkflow, err: Error) -> Result<Outcome> {
        tracing::warn!(error = %err, "cannot materialize workflow");
        let message = err.to_string();
        self.write_status(aw, move |status| {
            status.message = Some(message.clone());
        })
        .await?;
        Err(err)
    }

    async fn write_status<F>(&self, aw: ArtifactWorkflow, mutate: F) -> Result<ArtifactWorkflow>
    where
        F: Fn(&mut crate::api::ArtifactWorkflowStatus) + Send + Sync,
    {
        patch_status(
            self.store.as_ref(),
            aw,
            self.status_retries,
            &self.metrics,
            mutate,
        )
        .await
    }
}

#[async_trait]
impl<S, L> Reconciler for ArtifactWorkflowReconciler<S, L>
where
    S: Store + ?Sized + 'static,
    L: LogSource + ?Sized + 'static,
{
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome> {
        ArtifactWorkflowReconciler::reconcile(self, key).await
    }
}
