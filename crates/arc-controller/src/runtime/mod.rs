//! Controller runtime: queues, workers and change notifications.
//!
//! Each controller owns a [`WorkQueue`] of object keys and a pool of workers
//! calling its [`Reconciler`]. Store changes are mapped to keys by
//! [`watch::keys_for_event`] so a parent is woken when a child, or the
//! reference data it depends on, changes. Requeued keys are polled again
//! after the resync interval; failed keys back off exponentially.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use arc_controller::config::ControllerConfig;
//! use arc_controller::logs::InMemoryLogSource;
//! use arc_controller::runtime::Manager;
//! use arc_controller::store::InMemoryStore;
//!
//! # async fn example() -> arc_controller::error::Result<()> {
//! let (stop, shutdown) = tokio::sync::watch::channel(false);
//! let manager = Manager::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryLogSource::new()),
//!     ControllerConfig::default(),
//! );
//! let running = tokio::spawn(manager.run(shutdown));
//! // ...
//! let _ = stop.send(true);
//! running.await.ok();
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod queue;
pub mod watch;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use arc_core::ObjectKey;

use crate::artifact_workflow::ArtifactWorkflowReconciler;
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::logs::LogSource;
use crate::order::OrderReconciler;
use crate::store::Store;

pub use controller::run_worker;
pub use queue::WorkQueue;
pub use watch::{Queues, Triggered, all_keys, keys_for_event};

/// What to do with a key after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Whether the key should be polled again after the resync interval.
    pub requeue: bool,
}

impl Outcome {
    /// Nothing left to do until something changes.
    #[must_use]
    pub const fn done() -> Self {
        Self { requeue: false }
    }

    /// Poll again later.
    #[must_use]
    pub const fn requeue() -> Self {
        Self { requeue: true }
    }
}

/// One controller's reconcile logic.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Controller name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Drives the object at `key` one step towards its desired state.
    ///
    /// Must be idempotent: running it again on unchanged inputs changes
    /// nothing.
    async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome>;
}

/// Runs both controllers against one store.
pub struct Manager<S: ?Sized, L: ?Sized> {
    store: Arc<S>,
    logs: Arc<L>,
    config: ControllerConfig,
}

impl<S, L> Manager<S, L>
where
    S: Store + ?Sized + 'static,
    L: LogSource + ?Sized + 'static,
{
    /// Creates a manager.
    #[must_use]
    pub fn new(store: Arc<S>, logs: Arc<L>, config: ControllerConfig) -> Self {
        Self {
            store,
            logs,
            config,
        }
    }

    /// Runs until `shutdown` becomes `true`.
    ///
    /// Subscribes to store changes first, then enqueues every existing order
    /// and artifact workflow, so nothing created in between is missed.
    /// Workers finish their current pass before the call returns.
    ///
    /// # Errors
    ///
    /// Returns a store error if the initial listing fails.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let config = Arc::new(self.config);
        let queues = Queues::new();
        let events = self.store.watch();

        queues.enqueue(all_keys(self.store.as_ref()).await?);

        let orders = Arc::new(OrderReconciler::new(Arc::clone(&self.store), &config));
        let artifact_workflows = Arc::new(ArtifactWorkflowReconciler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.logs),
            &config,
        ));

        let mut tasks = JoinSet::new();
        for _ in 0..config.workers {
            tasks.spawn(run_worker(
                Arc::clone(&orders),
                Arc::clone(&queues.orders),
                Arc::clone(&config),
            ));
            tasks.spawn(run_worker(
                Arc::clone(&artifact_workflows),
                Arc::clone(&queues.artifact_workflows),
                Arc::clone(&config),
            ));
        }
        tasks.spawn(watch::run_watch(
            Arc::clone(&self.store),
            queues.clone(),
            events,
            shutdown.clone(),
        ));
        tracing::info!(workers = config.workers, "controllers started");

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        tracing::info!("shutting down controllers");
        queues.shutdown();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "controller task panicked");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_constructors() {
        assert!(!Outcome::done().requeue);
        assert!(Outcome::requeue().requeue);
    }
}
