//! Estado por sesión (conversación con una contraparte).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Estado de una sesión.
///
/// Transiciones válidas:
/// - `Creating` -> `Confirmed` (se consume el `Confirm` de la contraparte)
/// - `Confirmed` -> `Closing` (un lado envió/recibió `Close`)
/// - `Closing` -> `Closed` (ambos lados cerraron)
/// - cualquiera -> `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Creating,
    Confirmed,
    Closing,
    Closed,
    Error,
}

impl SessionStatus {
    /// La sesión no admite más tráfico.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Error)
    }
}

/// Payload interno de un `SessionEvent` (ambas direcciones).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionPayload {
    /// Primer mensaje del iniciador. `protocol` identifica el flow iniciador
    /// para que la contraparte elija su responder.
    Init { protocol: String, payload: Option<Value> },
    /// Handshake del responder.
    Confirm,
    Data { payload: Value },
    Close,
    Error { message: String },
}

impl SessionPayload {
    /// Payloads que la lógica de negocio consume vía `receive`.
    pub fn data(&self) -> Option<&Value> {
        match self {
            SessionPayload::Data { payload } => Some(payload),
            SessionPayload::Init { payload: Some(payload), .. } => Some(payload),
            _ => None,
        }
    }

    pub fn is_control(&self) -> bool {
        self.data().is_none()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            SessionPayload::Init { .. } => "init",
            SessionPayload::Confirm => "confirm",
            SessionPayload::Data { .. } => "data",
            SessionPayload::Close => "close",
            SessionPayload::Error { .. } => "error",
        }
    }
}

/// Evento recibido y aún no consumido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedSessionEvent {
    pub sequence_number: u64,
    pub payload: SessionPayload,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub counterparty: String,
    pub status: SessionStatus,
    /// Próximo número de secuencia a asignar en un envío.
    pub send_sequence_number: u64,
    /// Buffer ordenado de eventos recibidos pendientes de consumir.
    pub received_events: BTreeMap<u64, ReceivedSessionEvent>,
    /// `None` hasta consumir el primer evento (las secuencias empiezan en 0).
    pub last_processed_received_sequence_number: Option<u64>,
    pub has_sent_close: bool,
    pub has_received_close: bool,
    pub error_message: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

impl SessionState {
    /// Secuencia que debe consumirse a continuación.
    pub fn next_expected_sequence_number(&self) -> u64 {
        self.last_processed_received_sequence_number.map_or(0, |s| s + 1)
    }
}
