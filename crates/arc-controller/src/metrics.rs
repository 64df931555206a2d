//! Controller metrics.
//!
//! Metrics are recorded through the `metrics` crate facade. The binary
//! installs a Prometheus recorder with [`init_metrics`] and serves the
//! rendered text from [`serve_metrics`] at `/metrics`.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `arc_controller_reconciles_total` | Counter | `controller`, `result` | Reconcile passes by outcome |
//! | `arc_controller_reconcile_duration_seconds` | Histogram | `controller` | Reconcile pass latency |
//! | `arc_controller_children_created_total` | Counter | `kind` | Child objects created |
//! | `arc_controller_children_deleted_total` | Counter | `kind` | Child objects deleted |
//! | `arc_controller_status_conflicts_total` | Counter | `kind` | Status writes retried after a conflict |
//! | `arc_controller_phase_transitions_total` | Counter | `phase` | Artifact workflow phase changes |
//! | `arc_controller_queue_depth` | Gauge | `controller` | Keys waiting in the work queue |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use arc_controller::metrics::ControllerMetrics;
//!
//! let metrics = ControllerMetrics::new("order");
//! metrics.record_reconcile("success");
//! metrics.record_child_created("ArtifactWorkflow");
//! ```

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{Error, Result};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Reconcile passes by outcome.
    pub const RECONCILES_TOTAL: &str = "arc_controller_reconciles_total";
    /// Histogram: Reconcile pass latency in seconds.
    pub const RECONCILE_DURATION_SECONDS: &str = "arc_controller_reconcile_duration_seconds";
    /// Counter: Child objects created.
    pub const CHILDREN_CREATED_TOTAL: &str = "arc_controller_children_created_total";
    /// Counter: Child objects deleted.
    pub const CHILDREN_DELETED_TOTAL: &str = "arc_controller_children_deleted_total";
    /// Counter: Status writes retried after a version conflict.
    pub const STATUS_CONFLICTS_TOTAL: &str = "arc_controller_status_conflicts_total";
    /// Counter: Artifact workflow phase changes.
    pub const PHASE_TRANSITIONS_TOTAL: &str = "arc_controller_phase_transitions_total";
    /// Gauge: Keys waiting in the work queue.
    pub const QUEUE_DEPTH: &str = "arc_controller_queue_depth";
}

/// Label keys used across metrics.
pub mod labels {
    /// Controller name (`order`, `artifact_workflow`).
    pub const CONTROLLER: &str = "controller";
    /// Reconcile outcome (`success`, `requeue`, `error`).
    pub const RESULT: &str = "result";
    /// Object kind.
    pub const KIND: &str = "kind";
    /// Workflow phase.
    pub const PHASE: &str = "phase";
}

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder and registers metric descriptions.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns a configuration error if another recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::configuration(format!("failed to install prometheus recorder: {e}")))?;

    describe_counter!(names::RECONCILES_TOTAL, "Reconcile passes by outcome");
    describe_histogram!(
        names::RECONCILE_DURATION_SECONDS,
        "Duration of reconcile passes in seconds"
    );
    describe_counter!(names::CHILDREN_CREATED_TOTAL, "Child objects created");
    describe_counter!(names::CHILDREN_DELETED_TOTAL, "Child objects deleted");
    describe_counter!(
        names::STATUS_CONFLICTS_TOTAL,
        "Status writes retried after a version conflict"
    );
    describe_counter!(
        names::PHASE_TRANSITIONS_TOTAL,
        "Artifact workflow phase changes"
    );
    describe_gauge!(names::QUEUE_DEPTH, "Keys waiting in the work queue");

    tracing::info!("prometheus metrics recorder installed");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Returns the global Prometheus handle, if installed.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Handler for the `/metrics` endpoint.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; version=0.0.4")],
            "metrics not initialized".to_string(),
        ),
    }
}

/// Records metrics on behalf of one controller.
#[derive(Debug, Clone)]
pub struct ControllerMetrics {
    controller: &'static str,
}

impl ControllerMetrics {
    /// Creates a recorder labelled with the controller name.
    #[must_use]
    pub const fn new(controller: &'static str) -> Self {
        Self { controller }
    }

    /// Returns the controller name used as label.
    #[must_use]
    pub const fn controller(&self) -> &'static str {
        self.controller
    }

    /// Records the outcome of a reconcile pass.
    pub fn record_reconcile(&self, result: &'static str) {
        counter!(
            names::RECONCILES_TOTAL,
            labels::CONTROLLER => self.controller,
            labels::RESULT => result,
        )
        .increment(1);
    }

    /// Records how long a reconcile pass took.
    pub fn observe_reconcile_duration(&self, duration: Duration) {
        histogram!(
            names::RECONCILE_DURATION_SECONDS,
            labels::CONTROLLER => self.controller,
        )
        .record(duration.as_secs_f64());
    }

    /// Records a created child object.
    pub fn record_child_created(&self, kind: &'static str) {
        counter!(names::CHILDREN_CREATED_TOTAL, labels::KIND => kind).increment(1);
    }

    /// Records a deleted child object.
    pub fn record_child_deleted(&self, kind: &'static str) {
        counter!(names::CHILDREN_DELETED_TOTAL, labels::KIND => kind).increment(1);
    }

    /// Records a status write that lost a version race.
    pub fn record_status_conflict(&self, kind: &'static str) {
        counter!(names::STATUS_CONFLICTS_TOTAL, labels::KIND => kind).increment(1);
    }

    /// Records an artifact workflow entering a phase.
    pub fn record_phase_transition(&self, phase: &'static str) {
        counter!(names::PHASE_TRANSITIONS_TOTAL, labels::PHASE => phase).increment(1);
    }

    /// Sets the number of keys waiting in the work queue.
    #[allow(clippy::cast_precision_loss)] // Queue depths are small
    pub fn set_queue_depth(&self, depth: usize) {
        gauge!(names::QUEUE_DEPTH, labels::CONTROLLER => self.controller).set(depth as f64);
    }

    /// Starts timing a reconcile pass.
    #[must_use]
    pub fn time_reconcile(&self) -> TimingGuard<impl FnOnce(Duration) + use<>> {
        let metrics = self.clone();
        TimingGuard::new(move |duration| metrics.observe_reconcile_duration(duration))
    }
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a new timing guard that will call `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_helpers_accept_every_label() {
        let metrics = ControllerMetrics::new("order");
        metrics.record_reconcile("success");
        metrics.record_child_created("ArtifactWorkflow");
        metrics.record_child_deleted("ArtifactWorkflow");
        metrics.record_status_conflict("Order");
        metrics.record_phase_transition("running");
        metrics.set_queue_depth(3);
        assert_eq!(metrics.controller(), "order");
    }

    #[tokio::test]
    async fn installed_recorder_renders_recorded_metrics() {
        let handle = init_metrics().unwrap_or_else(|e| panic!("init: {e}"));
        let again = init_metrics().unwrap_or_else(|e| panic!("second init: {e}"));

        ControllerMetrics::new("order").record_reconcile("success");
        let rendered = handle.render();
        assert!(rendered.contains(names::RECONCILES_TOTAL), "{rendered}");
        assert!(again.render().contains("controller=\"order\""));

        let response = serve_metrics().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn timing_guard_measures_duration() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| recorded = Some(d));
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(recorded.is_some_and(|d| d >= Duration::from_millis(10)));
    }

    #[test]
    fn reconcile_timer_records_on_drop() {
        let metrics = ControllerMetrics::new("artifact_workflow");
        let guard = metrics.time_reconcile();
        std::thread::sleep(Duration::from_millis(2));
        assert!(guard.elapsed() >= Duration::from_millis(2));
    }
}
