//! Property-based tests for reconcile invariants.
//!
//! Random orders are driven to convergence; the resulting object graph must
//! be a fixed point and contain exactly one child per distinct artifact.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;
use tokio_test::block_on;

use arc_controller::api::{
    ArtifactType, ArtifactTypeSpec, ArtifactWorkflow, Endpoint, EndpointSpec,
    LocalObjectReference, Order, OrderArtifact, OrderDefaults, OrderSpec, Workflow,
};
use arc_controller::artifact_workflow::ArtifactWorkflowReconciler;
use arc_controller::config::ControllerConfig;
use arc_controller::logs::InMemoryLogSource;
use arc_controller::order::OrderReconciler;
use arc_controller::payload::Payload;
use arc_controller::store::{InMemoryStore, StoreExt};
use arc_core::{ObjectKey, Resource};

const NS: &str = "prop";

/// Generates a flat payload with lowercase keys and string values.
fn arb_payload() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9:.]{0,12}", 0..4)
}

async fn seed(store: &InMemoryStore) {
    store
        .create(&ArtifactType::new(
            "oci",
            ArtifactTypeSpec {
                workflow_template_ref: LocalObjectReference::new("oci-transfer"),
                ..ArtifactTypeSpec::default()
            },
        ))
        .await
        .unwrap();
    for name in ["src", "dst"] {
        store
            .create(&Endpoint::new(
                NS,
                name,
                EndpointSpec {
                    type_name: "oci".into(),
                    remote_url: format!("https://{name}"),
                    ..EndpointSpec::default()
                },
            ))
            .await
            .unwrap();
    }
}

async fn snapshot(store: &InMemoryStore) -> Vec<(String, u64)> {
    let mut versions: Vec<(String, u64)> = Vec::new();
    for order in store.list::<Order>(Some(NS)).await.unwrap() {
        versions.push((format!("order/{}", order.metadata.name), order.metadata.resource_version));
    }
    for aw in store.list::<ArtifactWorkflow>(Some(NS)).await.unwrap() {
        versions.push((format!("aw/{}", aw.metadata.name), aw.metadata.resource_version));
    }
    for wf in store.list::<Workflow>(Some(NS)).await.unwrap() {
        versions.push((format!("wf/{}", wf.metadata.name), wf.metadata.resource_version));
    }
    versions
}

async fn pass(
    store: &InMemoryStore,
    orders: &OrderReconciler<InMemoryStore>,
    aws: &ArtifactWorkflowReconciler<InMemoryStore, InMemoryLogSource>,
    key: &ObjectKey,
) {
    orders.reconcile(key).await.unwrap();
    for aw in store.list::<ArtifactWorkflow>(Some(NS)).await.unwrap() {
        aws.reconcile(&aw.key()).await.unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn converged_orders_are_a_fixed_point(payloads in prop::collection::vec(arb_payload(), 1..5)) {
        block_on(async {
            let store = Arc::new(InMemoryStore::new());
            seed(&store).await;
            let config = ControllerConfig::default();
            let orders = OrderReconciler::new(Arc::clone(&store), &config);
            let aws = ArtifactWorkflowReconciler::new(
                Arc::clone(&store),
                Arc::new(InMemoryLogSource::new()),
                &config,
            );

            let artifacts: Vec<OrderArtifact> = payloads
                .iter()
                .map(|fields| {
                    let mut artifact = OrderArtifact::new("oci");
                    artifact.payload = Payload::from(Value::Object(
                        fields
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                            .collect(),
                    ));
                    artifact
                })
                .collect();
            store
                .create(&Order::new(
                    NS,
                    "random",
                    OrderSpec {
                        defaults: OrderDefaults {
                            src_ref: LocalObjectReference::new("src"),
                            dst_ref: LocalObjectReference::new("dst"),
                        },
                        artifacts,
                    },
                ))
                .await
                .unwrap();

            let key = ObjectKey::new(NS, "random");
            for _ in 0..4 {
                pass(&store, &orders, &aws, &key).await;
            }

            let distinct: BTreeSet<&BTreeMap<String, String>> = payloads.iter().collect();
            let children = store.list::<ArtifactWorkflow>(Some(NS)).await.unwrap();
            assert_eq!(children.len(), distinct.len());
            assert_eq!(store.list::<Workflow>(Some(NS)).await.unwrap().len(), distinct.len());

            let before = snapshot(&store).await;
            pass(&store, &orders, &aws, &key).await;
            assert_eq!(snapshot(&store).await, before);
        });
    }
}
