//! Implementación Postgres (Diesel) de `CheckpointStore`.
//!
//! - Una fila por flow vivo; `put` es un upsert y `delete` borra la fila al
//!   terminar el flow.
//! - El checkpoint completo se guarda como JSONB en `state`. `waiting_for`,
//!   `flow_type` y `suspend_count` se duplican en columnas para listar sin
//!   deserializar.
//! - Errores transitorios (pool, serialización) se reintentan con un backoff
//!   corto antes de devolverse al engine como `CoreEngineError::Store`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use flow_core::constants::CHECKPOINT_SCHEMA_VERSION;
use flow_core::{CheckpointStore, CoreEngineError, FlowCheckpoint};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::flow_checkpoints;

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real en producción y tests de
/// integración).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila de lectura (inspección/listado).
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = flow_checkpoints)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CheckpointRow {
    pub flow_id: Uuid,
    pub owning_identity: String,
    pub flow_type: String,
    pub waiting_for: Option<String>,
    pub suspend_count: i64,
    pub state: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = flow_checkpoints)]
#[diesel(primary_key(flow_id))]
#[diesel(treat_none_as_null = true)]
struct NewCheckpointRow<'a> {
    flow_id: Uuid,
    owning_identity: &'a str,
    flow_type: &'a str,
    waiting_for: Option<&'a str>,
    suspend_count: i64,
    state: Value,
    updated_at: DateTime<Utc>,
}

/// Errores que vale la pena reintentar.
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos drivers entregan estos casos como texto.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected") || m.contains("connection closed") || m.contains("connection refused") || m.contains("timeout")
        }
        _ => false,
    }
}

/// Hasta 3 reintentos con backoff de 15ms, 30ms, 45ms.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Reconstruye el checkpoint desde la columna `state`.
pub fn decode_checkpoint(flow_id: Uuid, state: Value) -> Result<FlowCheckpoint, PersistenceError> {
    let cp: FlowCheckpoint = serde_json::from_value(state).map_err(|e| PersistenceError::Corrupt { flow_id: flow_id.to_string(),
                                                                                                  reason: e.to_string() })?;
    if cp.schema_version != CHECKPOINT_SCHEMA_VERSION {
        return Err(PersistenceError::Corrupt { flow_id: flow_id.to_string(),
                                               reason: format!("schema version {} (expected {})",
                                                               cp.schema_version, CHECKPOINT_SCHEMA_VERSION) });
    }
    if cp.flow_id != flow_id {
        return Err(PersistenceError::Corrupt { flow_id: flow_id.to_string(),
                                               reason: format!("row holds checkpoint of {}", cp.flow_id) });
    }
    Ok(cp)
}

pub struct PgCheckpointStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgCheckpointStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Filas crudas, opcionalmente filtradas por tag de `waiting_for`.
    pub fn rows(&self, waiting_for: Option<&str>) -> Result<Vec<CheckpointRow>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut query = flow_checkpoints::table.select(CheckpointRow::as_select())
                                                   .order(flow_checkpoints::updated_at.asc())
                                                   .into_boxed();
            if let Some(tag) = waiting_for {
                query = query.filter(flow_checkpoints::waiting_for.eq(tag.to_string()));
            }
            query.load::<CheckpointRow>(&mut conn).map_err(PersistenceError::from)
        })
    }

    pub fn row(&self, flow_id: Uuid) -> Result<Option<CheckpointRow>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            flow_checkpoints::table.find(flow_id)
                                   .select(CheckpointRow::as_select())
                                   .first::<CheckpointRow>(&mut conn)
                                   .optional()
                                   .map_err(PersistenceError::from)
        })
    }

    /// Borra el checkpoint; devuelve si existía.
    pub fn purge(&self, flow_id: Uuid) -> Result<bool, PersistenceError> {
        let deleted = with_retry(|| {
                          let mut conn = self.provider.connection()?;
                          diesel::delete(flow_checkpoints::table.find(flow_id)).execute(&mut conn)
                                                                               .map_err(PersistenceError::from)
                      })?;
        Ok(deleted > 0)
    }
}

impl<P: ConnectionProvider> CheckpointStore for PgCheckpointStore<P> {
    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>, CoreEngineError> {
        let state = with_retry(|| {
                        let mut conn = self.provider.connection()?;
                        flow_checkpoints::table.find(flow_id)
                                               .select(flow_checkpoints::state)
                                               .first::<Value>(&mut conn)
                                               .optional()
                                               .map_err(PersistenceError::from)
                    })?;
        match state {
            Some(state) => Ok(Some(decode_checkpoint(flow_id, state)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, checkpoint: &FlowCheckpoint) -> Result<(), CoreEngineError> {
        let state = serde_json::to_value(checkpoint).map_err(|e| CoreEngineError::Internal(format!("serialize checkpoint: {e}")))?;
        let waiting = checkpoint.waiting_for.as_ref().map(|w| w.kind().as_str());
        let row = NewCheckpointRow { flow_id: checkpoint.flow_id,
                                     owning_identity: &checkpoint.owning_identity,
                                     flow_type: checkpoint.flow_type(),
                                     waiting_for: waiting,
                                     suspend_count: checkpoint.suspend_count as i64,
                                     state,
                                     updated_at: Utc::now() };
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(flow_checkpoints::table).values(&row)
                                                        .on_conflict(flow_checkpoints::flow_id)
                                                        .do_update()
                                                        .set(&row)
                                                        .execute(&mut conn)
                                                        .map_err(PersistenceError::from)
        })?;
        debug!("pg:put flow_id={} waiting_for={:?}", checkpoint.flow_id, waiting);
        Ok(())
    }

    fn delete(&mut self, flow_id: Uuid) -> Result<(), CoreEngineError> {
        let existed = self.purge(flow_id)?;
        debug!("pg:delete flow_id={} existed={}", flow_id, existed);
        Ok(())
    }

    fn list(&self) -> Result<Vec<FlowCheckpoint>, CoreEngineError> {
        let rows = self.rows(None)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(decode_checkpoint(row.flow_id, row.state)?);
        }
        Ok(out)
    }
}

/// Construye el pool y corre las migraciones pendientes.
///
/// `min_size`/`max_size` en 0 se tratan como 1; si `min > max` se usa
/// `min = max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DATABASE_URL` y tamaños, y construye un pool migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
