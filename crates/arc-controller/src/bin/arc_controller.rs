//! Artifact Conduit controller service.
//!
//! Runs the order and artifact workflow controllers against an in-process
//! store, optionally seeded from a JSON file, and serves health and
//! Prometheus metrics endpoints.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `ARC_SEED_FILE` | unset | JSON list of `{"kind": ..., "object": ...}` loaded at startup |
//! | `ARC_HEALTH_ADDR` | `0.0.0.0:8080` | Listen address of `/health` and `/metrics` |
//!
//! Controller tuning is read as described in [`arc_controller::config`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use serde::Deserialize;
use serde_json::Value;

use arc_controller::api::{ArtifactType, ArtifactWorkflow, Endpoint, Order, Secret, Workflow};
use arc_controller::config::ControllerConfig;
use arc_controller::error::{Error, Result};
use arc_controller::logs::InMemoryLogSource;
use arc_controller::metrics::{init_metrics, serve_metrics};
use arc_controller::runtime::Manager;
use arc_controller::store::{InMemoryStore, Store};
use arc_core::Resource;
use arc_core::observability::init_logging;

const ENV_SEED_FILE: &str = "ARC_SEED_FILE";
const ENV_HEALTH_ADDR: &str = "ARC_HEALTH_ADDR";
const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Deserialize)]
struct SeedObject {
    kind: String,
    object: Value,
}

fn known_kind(kind: &str) -> Option<&'static str> {
    [
        Order::KIND,
        ArtifactWorkflow::KIND,
        Workflow::KIND,
        Endpoint::KIND,
        Secret::KIND,
        ArtifactType::KIND,
    ]
    .into_iter()
    .find(|known| *known == kind)
}

async fn seed(store: &InMemoryStore, path: &str) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::configuration(format!("failed to read {path}: {e}")))?;
    let objects: Vec<SeedObject> = serde_json::from_str(&raw)
        .map_err(|e| Error::serialization(format!("invalid seed file {path}: {e}")))?;

    let count = objects.len();
    for seed in objects {
        let kind = known_kind(&seed.kind).ok_or_else(|| {
            Error::configuration(format!("unknown kind '{}' in seed file", seed.kind))
        })?;
        store.create_object(kind, seed.object).await?;
    }
    Ok(count)
}

fn health_addr() -> Result<SocketAddr> {
    let raw = std::env::var(ENV_HEALTH_ADDR).unwrap_or_else(|_| DEFAULT_HEALTH_ADDR.to_string());
    raw.parse()
        .map_err(|_| Error::configuration(format!("invalid {ENV_HEALTH_ADDR} '{raw}'")))
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    init_logging(config.log_format);
    init_metrics()?;

    let store = Arc::new(InMemoryStore::new());
    if let Ok(path) = std::env::var(ENV_SEED_FILE) {
        let count = seed(&store, &path).await?;
        tracing::info!(path = %path, count, "seeded store");
    }
    let logs = Arc::new(InMemoryLogSource::new());

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let manager = Manager::new(store, logs, config);
    let controllers = tokio::spawn(manager.run(shutdown.clone()));

    let addr = health_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::configuration(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "serving health and metrics endpoints");

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(serve_metrics));
    let mut server_shutdown = shutdown;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        while !*server_shutdown.borrow() {
            if server_shutdown.changed().await.is_err() {
                break;
            }
        }
    });
    let server = tokio::spawn(async move { server.await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
    let _ = stop.send(true);

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "health server failed"),
        Err(e) => tracing::error!(error = %e, "health server task panicked"),
    }
    controllers
        .await
        .map_err(|e| Error::configuration(format!("controller task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use arc_controller::store::StoreExt;
    use arc_core::ObjectKey;

    use super::*;

    #[tokio::test]
    async fn seed_file_populates_the_store() {
        let path = std::env::temp_dir().join(format!("arc-seed-{}.json", ulid::Ulid::new()));
        let objects = serde_json::json!([
            {
                "kind": "ArtifactType",
                "object": {
                    "metadata": {"name": "oci"},
                    "spec": {"workflowTemplateRef": {"name": "oci-transfer"}}
                }
            },
            {
                "kind": "Endpoint",
                "object": {
                    "metadata": {"namespace": "team-a", "name": "hub"},
                    "spec": {"type": "oci", "remoteURL": "https://hub"}
                }
            }
        ]);
        tokio::fs::write(&path, objects.to_string()).await.unwrap();

        let store = InMemoryStore::new();
        let count = seed(&store, path.to_str().unwrap()).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(count, 2);
        let hub = store
            .get::<Endpoint>(&ObjectKey::new("team-a", "hub"))
            .await
            .unwrap();
        assert_eq!(hub.spec.remote_url, "https://hub");
    }

    #[tokio::test]
    async fn unknown_kinds_and_missing_files_are_rejected() {
        let store = InMemoryStore::new();
        let missing = std::env::temp_dir().join(format!("arc-missing-{}.json", ulid::Ulid::new()));
        assert!(seed(&store, missing.to_str().unwrap()).await.is_err());

        let path = std::env::temp_dir().join(format!("arc-seed-{}.json", ulid::Ulid::new()));
        tokio::fs::write(&path, r#"[{"kind": "Pod", "object": {}}]"#)
            .await
            .unwrap();
        let err = seed(&store, path.to_str().unwrap()).await.unwrap_err();
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(err.to_string().contains("unknown kind 'Pod'"));
    }
}
