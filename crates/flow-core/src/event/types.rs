//! Eventos entrantes (`FlowEvent`).
//!
//! Rol en el flujo:
//! - El bus entrega los eventos particionados por `flow_id`, en orden y al
//!   menos una vez.
//! - `timestamp` es el "ahora" del pipeline para ese evento: reenvíos,
//!   expiraciones y `sleep` se evalúan contra él, no contra el reloj del
//!   proceso. Reaplicar el mismo evento produce el mismo resultado.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::{ExternalEventResponse, InitiatingSession, SessionPayload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartFlow {
    pub owning_identity: String,
    pub flow_type: String,
    pub arguments: Value,
    /// `Some` cuando el flow es el responder de una sesión iniciada por otro.
    pub initiated_by: Option<InitiatingSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub sequence_number: u64,
    pub payload: SessionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEventKind {
    StartFlow(StartFlow),
    SessionEvent(SessionEvent),
    /// Timer disparado.
    Wakeup,
    ExternalEventResponse(ExternalEventResponse),
}

impl FlowEventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            FlowEventKind::StartFlow(_) => "StartFlow",
            FlowEventKind::SessionEvent(_) => "SessionEvent",
            FlowEventKind::Wakeup => "Wakeup",
            FlowEventKind::ExternalEventResponse(_) => "ExternalEventResponse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub flow_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: FlowEventKind,
}

impl FlowEvent {
    pub fn new(flow_id: Uuid, timestamp: DateTime<Utc>, kind: FlowEventKind) -> Self {
        Self { flow_id, timestamp, kind }
    }

    pub fn start(flow_id: Uuid, timestamp: DateTime<Utc>, start: StartFlow) -> Self {
        Self::new(flow_id, timestamp, FlowEventKind::StartFlow(start))
    }

    pub fn wakeup(flow_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self::new(flow_id, timestamp, FlowEventKind::Wakeup)
    }

    pub fn session(flow_id: Uuid, timestamp: DateTime<Utc>, session_id: impl Into<String>, sequence_number: u64, payload: SessionPayload) -> Self {
        Self::new(flow_id,
                  timestamp,
                  FlowEventKind::SessionEvent(SessionEvent { session_id: session_id.into(),
                                                             sequence_number,
                                                             payload }))
    }

    pub fn external_response(flow_id: Uuid, timestamp: DateTime<Utc>, response: ExternalEventResponse) -> Self {
        Self::new(flow_id, timestamp, FlowEventKind::ExternalEventResponse(response))
    }
}
