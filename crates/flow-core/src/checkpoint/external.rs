//! Estado de la (única) llamada asíncrona en curso a un subsistema.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{PERSISTENCE_REQUEST_TOPIC, SIGNING_REQUEST_TOPIC, VERIFICATION_REQUEST_TOPIC};

/// Subsistemas que atienden eventos externos. La lógica de reenvío es la
/// misma para todos; sólo cambia el topic de destino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalEventKind {
    Signing,
    Persistence,
    Verification,
}

impl ExternalEventKind {
    pub fn topic(&self) -> &'static str {
        match self {
            ExternalEventKind::Signing => SIGNING_REQUEST_TOPIC,
            ExternalEventKind::Persistence => PERSISTENCE_REQUEST_TOPIC,
            ExternalEventKind::Verification => VERIFICATION_REQUEST_TOPIC,
        }
    }

    pub fn request_name(&self) -> &'static str {
        match self {
            ExternalEventKind::Signing => "SigningRequest",
            ExternalEventKind::Persistence => "PersistenceRequest",
            ExternalEventKind::Verification => "VerificationRequest",
        }
    }
}

/// Request tal como se publica en el topic del subsistema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEventRequest {
    pub kind: ExternalEventKind,
    pub request_id: String,
    pub flow_id: Uuid,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalEventErrorKind {
    /// El subsistema pide reintentar: la request sigue pendiente.
    Transient,
    /// Error recuperable que se entrega al flow.
    Platform,
    /// El flow no puede continuar.
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExternalEventOutcome {
    Payload { payload: Value },
    Error { kind: ExternalEventErrorKind, message: String },
}

/// Respuesta entrante de un subsistema (eco del `request_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEventResponse {
    pub request_id: String,
    pub outcome: ExternalEventOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEventState {
    pub request_id: String,
    pub request: ExternalEventRequest,
    /// Sólo se fija para el `request_id` pendiente.
    pub response: Option<ExternalEventOutcome>,
    /// Reenvíos realizados (0 tras el primer envío).
    pub retries: u32,
    /// Instante del último envío.
    pub send_timestamp: DateTime<Utc>,
    /// Último error transitorio informado por el subsistema.
    pub last_error: Option<String>,
    /// Se agotaron los reenvíos sin respuesta.
    pub retries_exhausted: bool,
}

impl ExternalEventState {
    /// Hay una request enviada sin respuesta y todavía con reenvíos posibles.
    pub fn is_outstanding(&self) -> bool {
        self.response.is_none() && !self.retries_exhausted
    }
}
