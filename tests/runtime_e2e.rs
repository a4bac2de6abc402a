//! Runtime completo: particiones, ruteo de sesiones, timers y subsistemas.
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use flow_adapters::flows::{DELAY_FLOW, TRANSFER_FLOW};
use flow_adapters::standard_registry;
use flow_core::{FlowStatus, FlowStatusUpdate};
use flowline::{AppConfig, FlowRuntime, SharedCheckpointStore};

fn runtime(store: &SharedCheckpointStore) -> FlowRuntime {
    let config = AppConfig { partitions: 2,
                             ..AppConfig::default() };
    let store = store.clone();
    tokio_test::assert_ok!(FlowRuntime::start(&config, standard_registry(), move |_| Ok(store.clone())))
}

/// Espera el estado terminal de `flow_id`.
async fn finished(statuses: &mut broadcast::Receiver<FlowStatusUpdate>, flow_id: Uuid) -> FlowStatusUpdate {
    let wait = async {
        loop {
            let update = tokio_test::assert_ok!(statuses.recv().await);
            if update.flow_id == flow_id && update.status != FlowStatus::Running {
                return update;
            }
        }
    };
    tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(10), wait).await)
}

#[tokio::test]
async fn transfer_completes_between_two_identities() {
    let store = SharedCheckpointStore::new();
    let rt = runtime(&store);
    let mut statuses = rt.subscribe();

    let flow_id = tokio_test::assert_ok!(rt.start_flow("alice", TRANSFER_FLOW, json!({ "counterparty": "bob", "amount": 40 })));
    let done = finished(&mut statuses, flow_id).await;

    assert_eq!(done.status, FlowStatus::Completed, "error: {:?}", done.error);
    let result = done.result.unwrap_or_default();
    assert_eq!(result["amount"], 40);
    assert_eq!(rt.subsystems().ledger_len(), 1);
    rt.shutdown();
}

#[tokio::test]
async fn rejected_transfer_fails_with_reason() {
    let store = SharedCheckpointStore::new();
    let rt = runtime(&store);
    let mut statuses = rt.subscribe();

    let flow_id = tokio_test::assert_ok!(rt.start_flow("alice", TRANSFER_FLOW, json!({ "counterparty": "bob", "amount": 5_000 })));
    let done = finished(&mut statuses, flow_id).await;

    assert_eq!(done.status, FlowStatus::Failed);
    assert!(done.error.unwrap_or_default().contains("transfer rejected"));
    assert_eq!(rt.subsystems().ledger_len(), 0);
    rt.shutdown();
}

#[tokio::test]
async fn delay_flow_is_woken_by_timer() {
    let store = SharedCheckpointStore::new();
    let rt = runtime(&store);
    let mut statuses = rt.subscribe();

    let flow_id = tokio_test::assert_ok!(rt.start_flow("bob", DELAY_FLOW, json!({ "millis": 50 })));
    let done = finished(&mut statuses, flow_id).await;

    assert_eq!(done.status, FlowStatus::Completed);
    assert_eq!(done.result, Some(json!({ "slept_ms": 50 })));
    // Un flow terminado no deja checkpoint.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.is_empty());
    rt.shutdown();
}
