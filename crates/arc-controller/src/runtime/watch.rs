//! Maps store changes to the keys that must be reconciled.
//!
//! | Changed kind | Enqueued |
//! |--------------|----------|
//! | `Order` | the order |
//! | `ArtifactWorkflow` | the artifact workflow and its owning order |
//! | `Workflow` | its owning artifact workflow |
//! | `Endpoint` | orders in the namespace referencing it |
//! | `Secret` | orders using an endpoint that references it, artifact workflows mounting it |
//! | `ArtifactType` | artifact workflows and orders of that type |

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

use arc_core::{ObjectKey, Resource};

use super::WorkQueue;
use crate::api::{ArtifactType, ArtifactWorkflow, Endpoint, Order, Secret, Workflow};
use crate::error::Result;
use crate::store::{Store, StoreExt, WatchEvent};

/// Keys to enqueue for one change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triggered {
    /// Orders to reconcile.
    pub orders: BTreeSet<ObjectKey>,
    /// Artifact workflows to reconcile.
    pub artifact_workflows: BTreeSet<ObjectKey>,
}

impl Triggered {
    /// Returns true if nothing needs to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.artifact_workflows.is_empty()
    }
}

/// Work queues of the two controllers.
#[derive(Debug, Clone)]
pub struct Queues {
    /// Order keys.
    pub orders: Arc<WorkQueue>,
    /// Artifact workflow keys.
    pub artifact_workflows: Arc<WorkQueue>,
}

impl Queues {
    /// Creates empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: Arc::new(WorkQueue::new()),
            artifact_workflows: Arc::new(WorkQueue::new()),
        }
    }

    /// Adds every triggered key to its queue.
    pub fn enqueue(&self, triggered: Triggered) {
        for key in triggered.orders {
            self.orders.add(key);
        }
        for key in triggered.artifact_workflows {
            self.artifact_workflows.add(key);
        }
    }

    /// Stops both queues.
    pub fn shutdown(&self) {
        self.orders.shutdown();
        self.artifact_workflows.shutdown();
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes which keys a change affects.
///
/// # Errors
///
/// Returns store errors from the reverse lookups.
pub async fn keys_for_event<S: Store + ?Sized>(store: &S, event: &WatchEvent) -> Result<Triggered> {
    let mut triggered = Triggered::default();
    let namespace = event.key.namespace.as_str();
    let name = event.key.name.as_str();

    match event.kind {
        Order::KIND => {
            triggered.orders.insert(event.key.clone());
        }
        ArtifactWorkflow::KIND => {
            triggered.artifact_workflows.insert(event.key.clone());
            if let Some(owner) = event
                .decode::<ArtifactWorkflow>()
                .and_then(|aw| owner_of_kind(&aw.metadata, Order::KIND))
            {
                triggered.orders.insert(owner);
            }
        }
        Workflow::KIND => {
            if let Some(owner) = event
                .decode::<Workflow>()
                .and_then(|wf| owner_of_kind(&wf.metadata, ArtifactWorkflow::KIND))
            {
                triggered.artifact_workflows.insert(owner);
            }
        }
        Endpoint::KIND => {
            triggered
                .orders
                .extend(orders_referencing(store, namespace, &[name]).await?);
        }
        Secret::KIND => {
            let endpoints: Vec<String> = store
                .list::<Endpoint>(Some(namespace))
                .await?
                .into_iter()
                .filter(|e| e.spec.secret_ref.name == name)
                .map(|e| e.metadata.name)
                .collect();
            let endpoints: Vec<&str> = endpoints.iter().map(String::as_str).collect();
            triggered
                .orders
                .extend(orders_referencing(store, namespace, &endpoints).await?);

            triggered.artifact_workflows.extend(
                store
                    .list::<ArtifactWorkflow>(Some(namespace))
                    .await?
                    .into_iter()
                    .filter(|aw| {
                        aw.spec.src_secret_ref.name == name || aw.spec.dst_secret_ref.name == name
                    })
                    .map(|aw| aw.metadata.key()),
            );
        }
        ArtifactType::KIND => {
            triggered.artifact_workflows.extend(
                store
                    .list::<ArtifactWorkflow>(None)
                    .await?
                    .into_iter()
                    .filter(|aw| aw.spec.type_name == name)
                    .map(|aw| aw.metadata.key()),
            );
            triggered.orders.extend(
                store
                    .list::<Order>(None)
                    .await?
                    .into_iter()
                    .filter(|o| o.spec.artifacts.iter().any(|a| a.type_name == name))
                    .map(|o| o.metadata.key()),
            );
        }
        _ => {}
    }
    Ok(triggered)
}

/// Every order and artifact workflow in the store.
///
/// # Errors
///
/// Returns store errors from the listings.
pub async fn all_keys<S: Store + ?Sized>(store: &S) -> Result<Triggered> {
    Ok(Triggered {
        orders: store
            .list::<Order>(None)
            .await?
            .into_iter()
            .map(|o| o.metadata.key())
            .collect(),
        artifact_workflows: store
            .list::<ArtifactWorkflow>(None)
            .await?
            .into_iter()
            .map(|aw| aw.metadata.key())
            .collect(),
    })
}

/// Feeds store changes into the queues until `shutdown` flips or the store
/// closes its channel.
///
/// When the receiver falls behind, every order and artifact workflow is
/// enqueued since individual changes were lost.
pub async fn run_watch<S: Store + ?Sized>(
    store: Arc<S>,
    queues: Queues,
    mut events: tokio::sync::broadcast::Receiver<WatchEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let event = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            event = events.recv() => event,
        };

        let triggered = match event {
            Ok(event) => keys_for_event(store.as_ref(), &event).await.map_err(|err| {
                tracing::warn!(kind = event.kind, key = %event.key, error = %err, "failed to map change");
                err
            }),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "watch fell behind, resyncing everything");
                all_keys(store.as_ref()).await.map_err(|err| {
                    tracing::warn!(error = %err, "failed to list objects for resync");
                    err
                })
            }
            Err(RecvError::Closed) => {
                tracing::info!("store closed its watch channel");
                break;
            }
        };
        if let Ok(triggered) = triggered {
            queues.enqueue(triggered);
        }
    }
    tracing::debug!("watch loop stopped");
}

fn owner_of_kind(meta: &arc_core::ObjectMeta, kind: &str) -> Option<ObjectKey> {
    meta.controller_owner()
        .filter(|owner| owner.kind == kind)
        .map(|owner| ObjectKey::new(meta.namespace.clone(), owner.name.clone()))
}

async fn orders_referencing<S: Store + ?Sized>(
    store: &S,
    namespace: &str,
    endpoints: &[&str],
) -> Result<Vec<ObjectKey>> {
    if endpoints.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store
        .list::<Order>(Some(namespace))
        .await?
        .into_iter()
        .filter(|o| endpoints.iter().any(|e| o.references_endpoint(e)))
        .map(|o| o.metadata.key())
        .collect())
}
