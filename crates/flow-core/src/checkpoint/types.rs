//! `FlowCheckpoint`: estado completo de un flow entre dos eventos.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ExternalEventState, SessionState, WaitingFor};
use crate::constants::CHECKPOINT_SCHEMA_VERSION;
use crate::errors::CoreEngineError;
use crate::event::FlowEventKind;
use crate::runner::ContinuationState;

/// Sesión con la que un responder fue iniciado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatingSession {
    pub session_id: String,
    pub initiator: String,
    pub protocol: String,
    pub payload: Option<Value>,
}

/// Datos de arranque; la lógica los lee a través de `FlowContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStartContext {
    pub flow_type: String,
    pub arguments: Value,
    pub initiated_by: Option<InitiatingSession>,
    pub started_at: DateTime<Utc>,
}

/// Procesamiento suspendido por un fallo transitorio. `events` guarda el
/// evento que falló y los que llegaron después; se aplican en orden con el
/// primer `Wakeup` a partir de `next_attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRetry {
    pub events: Vec<FlowEventKind>,
    pub error: String,
    pub first_failure: DateTime<Utc>,
    pub next_attempt: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    pub schema_version: u32,
    pub flow_id: Uuid,
    pub owning_identity: String,
    pub start_context: FlowStartContext,
    /// Se incrementa en cada suspensión; nonce para valores derivados.
    pub suspend_count: u64,
    /// Opaco para el pipeline: sólo el runner lo interpreta.
    pub continuation: ContinuationState,
    /// `None` sólo de forma transitoria, antes del primer handler.
    pub waiting_for: Option<WaitingFor>,
    pub sessions: IndexMap<String, SessionState>,
    pub pending_external_event: Option<ExternalEventState>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub pipeline_retry: Option<PipelineRetry>,
}

impl FlowCheckpoint {
    pub fn new(flow_id: Uuid, owning_identity: impl Into<String>, start_context: FlowStartContext, max_retries: u32) -> Self {
        Self { schema_version: CHECKPOINT_SCHEMA_VERSION,
               flow_id,
               owning_identity: owning_identity.into(),
               start_context,
               suspend_count: 0,
               continuation: ContinuationState::default(),
               waiting_for: None,
               sessions: IndexMap::new(),
               pending_external_event: None,
               retry_count: 0,
               max_retries,
               pipeline_retry: None }
    }

    pub fn flow_type(&self) -> &str {
        &self.start_context.flow_type
    }

    pub fn session(&self, session_id: &str) -> Result<&SessionState, CoreEngineError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| CoreEngineError::UnknownSession(session_id.to_string()))
    }

    pub fn session_mut(&mut self, session_id: &str) -> Result<&mut SessionState, CoreEngineError> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreEngineError::UnknownSession(session_id.to_string()))
    }

    /// Sesiones que siguen abiertas (no cerradas por nosotros ni en error).
    pub fn open_session_ids(&self) -> Vec<String> {
        self.sessions
            .values()
            .filter(|s| !s.status.is_terminal() && !s.has_sent_close)
            .map(|s| s.session_id.clone())
            .collect()
    }
}
