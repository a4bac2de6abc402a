//! Store Postgres contra una base real. Sin `DATABASE_URL` los tests se
//! saltan.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::json;
use uuid::Uuid;

use flow_core::checkpoint::FlowStartContext;
use flow_core::{CheckpointStore, FlowCheckpoint, FlowEngine, FlowEvent, StartFlow, WaitingFor};
use flow_persistence::{build_pool, DbConfig, PgCheckpointStore, PgPool, PoolProvider};

static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    let cfg = DbConfig::from_env().ok()?;
    match build_pool(&cfg.url, 1, 2) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

fn store() -> Option<PgCheckpointStore<PoolProvider>> {
    TEST_POOL.as_ref()
             .map(|pool| PgCheckpointStore::new(PoolProvider { pool: pool.clone() }))
}

fn checkpoint() -> FlowCheckpoint {
    let start = FlowStartContext { flow_type: "delay".into(),
                                   arguments: json!({ "millis": 5 }),
                                   initiated_by: None,
                                   started_at: Utc::now() };
    let mut cp = FlowCheckpoint::new(Uuid::new_v4(), "alice", start, 5);
    cp.waiting_for = Some(WaitingFor::Start);
    cp
}

#[test]
fn upsert_load_delete() {
    let Some(mut store) = store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let mut cp = checkpoint();
    store.put(&cp).expect("insert");
    assert_eq!(store.load(cp.flow_id).expect("load"), Some(cp.clone()));

    cp.suspend_count = 3;
    cp.waiting_for = None;
    store.put(&cp).expect("update");
    let row = store.row(cp.flow_id).expect("row").expect("present");
    assert_eq!(row.suspend_count, 3);
    assert_eq!(row.waiting_for, None);

    store.delete(cp.flow_id).expect("delete");
    assert_eq!(store.load(cp.flow_id).expect("load"), None);
    assert!(!store.purge(cp.flow_id).expect("purge"), "ya no existía");
}

#[test]
fn rows_filter_by_waiting_tag() {
    let Some(mut store) = store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let cp = checkpoint();
    store.put(&cp).expect("insert");
    let starting = store.rows(Some("start")).expect("rows");
    assert!(starting.iter().any(|r| r.flow_id == cp.flow_id));
    let sleeping = store.rows(Some("wakeup")).expect("rows");
    assert!(sleeping.iter().all(|r| r.flow_id != cp.flow_id));
    store.delete(cp.flow_id).expect("cleanup");
}

#[test]
fn engine_runs_on_postgres() {
    let Some(store) = store() else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let mut engine = FlowEngine::builder(store).flows(nap_registry())
                                               .build()
                                               .expect("engine");
    let flow_id = Uuid::new_v4();
    let now = Utc::now();
    let start = StartFlow { owning_identity: "alice".into(),
                            flow_type: "nap".into(),
                            arguments: json!(null),
                            initiated_by: None };
    engine.process(&FlowEvent::start(flow_id, now, start)).expect("start");
    let cp = engine.checkpoint(flow_id).expect("load").expect("persisted");
    assert!(matches!(cp.waiting_for, Some(WaitingFor::Wakeup { .. })));

    engine.process(&FlowEvent::wakeup(flow_id, now + chrono::Duration::seconds(2)))
          .expect("wakeup");
    assert!(engine.checkpoint(flow_id).expect("load").is_none());
}

/// Registro con un único flow que duerme un segundo.
fn nap_registry() -> flow_core::FlowRegistry {
    use flow_core::{async_trait, Flow, FlowContext, FlowError};

    struct Nap;

    #[async_trait(?Send)]
    impl Flow for Nap {
        fn flow_type(&self) -> &str {
            "nap"
        }

        async fn call(&self, ctx: FlowContext) -> Result<serde_json::Value, FlowError> {
            ctx.sleep(chrono::Duration::seconds(1)).await?;
            Ok(json!("rested"))
        }
    }

    let mut registry = flow_core::FlowRegistry::new();
    registry.register(Nap);
    registry
}
