//! Worker loop shared by both controllers.

use std::sync::Arc;

use tracing::Instrument;

use arc_core::observability::reconcile_span;

use super::{Outcome, Reconciler, WorkQueue};
use crate::config::ControllerConfig;
use crate::metrics::ControllerMetrics;

/// Result labels recorded per pass.
pub(crate) mod results {
    pub const SUCCESS: &str = "success";
    pub const REQUEUE: &str = "requeue";
    pub const ERROR: &str = "error";
}

/// Takes keys from `queue` until it shuts down and reconciles each one.
///
/// A requeue is scheduled after the resync interval, an error after the
/// backoff for the key's consecutive failures.
pub async fn run_worker<R>(reconciler: Arc<R>, queue: Arc<WorkQueue>, config: Arc<ControllerConfig>)
where
    R: Reconciler + ?Sized,
{
    let metrics = ControllerMetrics::new(reconciler.name());
    while let Some(key) = queue.next().await {
        let span = reconcile_span(reconciler.name(), &key.namespace, &key.name);
        let result = async {
            let _timer = metrics.time_reconcile();
            reconciler.reconcile(&key).await
        }
        .instrument(span.clone())
        .await;
        queue.done(&key);

        match result {
            Ok(Outcome { requeue: false }) => {
                metrics.record_reconcile(results::SUCCESS);
                queue.forget(&key);
            }
            Ok(Outcome { requeue: true }) => {
                metrics.record_reconcile(results::REQUEUE);
                queue.forget(&key);
                queue.add_after(key, config.resync_interval);
            }
            Err(err) => {
                metrics.record_reconcile(results::ERROR);
                let failures = queue.record_failure(&key);
                let delay = config.backoff(failures);
                tracing::warn!(
                    parent: &span,
                    error = %err,
                    failures,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconcile failed"
                );
                queue.add_after(key, delay);
            }
        }
        metrics.set_queue_depth(queue.len());
    }
    tracing::debug!(controller = reconciler.name(), "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use arc_core::ObjectKey;

    use super::*;
    use crate::error::{Error, Result};

    /// Fails the first pass, asks for one requeue, then finishes.
    struct Flaky {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Reconciler for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn reconcile(&self, _key: &ObjectKey) -> Result<Outcome> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(Error::configuration("not yet")),
                1 => Ok(Outcome::requeue()),
                _ => Ok(Outcome::done()),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn errors_back_off_and_requeues_resync() {
        let reconciler = Arc::new(Flaky {
            calls: AtomicU32::new(0),
        });
        let queue = Arc::new(WorkQueue::new());
        let config = Arc::new(ControllerConfig::default());
        queue.add(ObjectKey::new("ns", "a"));

        let worker = tokio::spawn(run_worker(
            Arc::clone(&reconciler),
            Arc::clone(&queue),
            Arc::clone(&config),
        ));

        tokio::time::sleep(config.backoff(1) + Duration::from_millis(1)).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(config.resync_interval + Duration::from_millis(1)).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(config.resync_interval * 2).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 3);

        queue.shutdown();
        assert!(worker.await.is_ok());
    }
}
