//! Valores que cruzan la frontera runner <-> pipeline: lo que la lógica pide
//! al suspenderse y con qué se la reanuda.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::checkpoint::ExternalEventKind;

/// Sesión vista desde la lógica de negocio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionRef {
    pub session_id: String,
    pub counterparty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub session: SessionRef,
    pub payload: Value,
}

/// Petición de suspensión (o fin) emitida por la lógica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum FlowIoRequest {
    Send { messages: Vec<SessionMessage> },
    Receive { sessions: Vec<SessionRef> },
    CloseSessions { sessions: Vec<SessionRef> },
    Sleep { millis: i64 },
    ExternalEvent { kind: ExternalEventKind, payload: Value },
    FlowFinished { result: Value },
    FlowFailed { error: FlowError },
}

impl FlowIoRequest {
    pub fn name(&self) -> &'static str {
        match self {
            FlowIoRequest::Send { .. } => "send",
            FlowIoRequest::Receive { .. } => "receive",
            FlowIoRequest::CloseSessions { .. } => "close_sessions",
            FlowIoRequest::Sleep { .. } => "sleep",
            FlowIoRequest::ExternalEvent { .. } => "external_event",
            FlowIoRequest::FlowFinished { .. } => "flow_finished",
            FlowIoRequest::FlowFailed { .. } => "flow_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalEventFailureKind {
    /// El subsistema respondió con un error recuperable.
    Platform,
    /// No hubo respuesta tras agotar los reenvíos.
    RetriesExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEventFailure {
    pub kind: ExternalEventFailureKind,
    pub message: String,
    pub retries: u32,
}

impl fmt::Display for ExternalEventFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ExternalEventFailureKind::Platform => write!(f, "platform error: {}", self.message),
            ExternalEventFailureKind::RetriesExhausted => {
                write!(f, "no response after {} retries: {}", self.retries, self.message)
            }
        }
    }
}

/// Valor con el que se reanuda la lógica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResumption {
    /// Primera ejecución.
    Start,
    /// La petición se completó sin valor (send, close, sleep).
    Unit,
    /// Un payload por sesión, clave `session_id`.
    SessionData { payloads: BTreeMap<String, Value> },
    SessionError { session_id: String, message: String },
    ExternalEventResponse { payload: Value },
    ExternalEventFailed { failure: ExternalEventFailure },
}

/// Errores que ve la lógica de negocio.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowError {
    #[error("session {session_id} failed: {reason}")]
    Session { session_id: String, reason: String },
    #[error("external event failed: {0}")]
    ExternalEvent(ExternalEventFailure),
    #[error("{0}")]
    Business(String),
    /// El flow no puede avanzar ahora; el pipeline reintenta el evento.
    #[error("transient: {0}")]
    Transient(String),
    #[error("unexpected resumption, expected {expected}")]
    UnexpectedResumption { expected: String },
}

impl FlowError {
    pub fn business(msg: impl Into<String>) -> Self {
        FlowError::Business(msg.into())
    }
}
