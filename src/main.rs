//! Demo de flowline: arranca el runtime, lanza una transferencia entre
//! `alice` y `bob`, una notificación firmada y un flow de espera, y muestra
//! los estados hasta que todos terminan.
use std::collections::HashSet;
use std::time::Duration;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flow_adapters::flows::{DELAY_FLOW, NOTIFY_AND_SIGN_FLOW, TRANSFER_FLOW};
use flow_adapters::standard_registry;
use flow_core::FlowStatus;
use flowline::{AppConfig, CoreError, FlowRuntime};

const DEMO_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .init();
    if let Err(e) = run_demo().await {
        error!(error = %e, "demo:failed");
        std::process::exit(1);
    }
}

async fn run_demo() -> Result<(), CoreError> {
    let config = AppConfig::from_env()?;
    let runtime = start_runtime(&config)?;
    let mut statuses = runtime.subscribe();

    let mut pending = HashSet::new();
    pending.insert(runtime.start_flow("alice", TRANSFER_FLOW, json!({ "counterparty": "bob", "amount": 250, "memo": "demo" }))?);
    pending.insert(runtime.start_flow("alice", NOTIFY_AND_SIGN_FLOW, json!({ "counterparty": "carol", "document": { "title": "terms" } }))?);
    pending.insert(runtime.start_flow("bob", DELAY_FLOW, json!({ "millis": 200 }))?);

    let deadline = tokio::time::sleep(DEMO_TIMEOUT);
    tokio::pin!(deadline);
    while !pending.is_empty() {
        tokio::select! {
            update = statuses.recv() => {
                let update = update.map_err(|_| CoreError::ChannelClosed("status"))?;
                match update.status {
                    FlowStatus::Running => continue,
                    FlowStatus::Completed => info!(flow_id = %update.flow_id, flow_type = %update.flow_type, result = ?update.result, "demo:completed"),
                    FlowStatus::Failed => warn!(flow_id = %update.flow_id, flow_type = %update.flow_type, error = ?update.error, "demo:failed_flow"),
                }
                pending.remove(&update.flow_id);
            }
            _ = &mut deadline => {
                warn!(pending = pending.len(), "demo:timeout");
                break;
            }
        }
    }
    info!(ledger = runtime.subsystems().ledger_len(), "demo:done");
    runtime.shutdown();
    Ok(())
}

#[cfg(not(feature = "pg_store"))]
fn start_runtime(config: &AppConfig) -> Result<FlowRuntime, CoreError> {
    let store = flowline::SharedCheckpointStore::new();
    FlowRuntime::start(config, standard_registry(), |_| Ok(store.clone()))
}

#[cfg(feature = "pg_store")]
fn start_runtime(config: &AppConfig) -> Result<FlowRuntime, CoreError> {
    use flow_persistence::{build_pool, PgCheckpointStore, PoolProvider};

    let url = config.database_url
                    .as_deref()
                    .ok_or_else(|| CoreError::Config("pg_store requiere DATABASE_URL".into()))?;
    let pool = build_pool(url, 1, config.partitions as u32 + 1)?;
    info!("demo:postgres_store");
    FlowRuntime::start(config, standard_registry(), |_| Ok(PgCheckpointStore::new(PoolProvider { pool: pool.clone() })))
}
