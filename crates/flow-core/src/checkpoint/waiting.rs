use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::runner::FlowResumption;

/// Motivo por el que el flow está suspendido, con sus parámetros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitingFor {
    /// Checkpoint recién creado, todavía sin ejecutar la lógica.
    Start,
    /// La petición no necesita nada externo; se reanuda en el mismo ciclo.
    /// Nunca queda persistido.
    Immediate { value: FlowResumption },
    /// `sleep` hasta `until` (se evalúa con el timestamp de cada evento).
    Wakeup { until: DateTime<Utc> },
    /// Handshake pendiente en las sesiones indicadas.
    SessionInit { session_ids: Vec<String> },
    /// `receive` pendiente: un evento de datos en cada sesión.
    SessionData { session_ids: Vec<String> },
    /// Respuesta de un subsistema para `request_id`.
    ExternalEventResponse { request_id: String },
}

impl WaitingFor {
    pub fn kind(&self) -> WaitingForKind {
        match self {
            WaitingFor::Start => WaitingForKind::Start,
            WaitingFor::Immediate { .. } => WaitingForKind::Immediate,
            WaitingFor::Wakeup { .. } => WaitingForKind::Wakeup,
            WaitingFor::SessionInit { .. } => WaitingForKind::SessionInit,
            WaitingFor::SessionData { .. } => WaitingForKind::SessionData,
            WaitingFor::ExternalEventResponse { .. } => WaitingForKind::ExternalEventResponse,
        }
    }

    /// Sesiones sobre las que el flow está bloqueado (para expiración).
    pub fn session_ids(&self) -> &[String] {
        match self {
            WaitingFor::SessionInit { session_ids } | WaitingFor::SessionData { session_ids } => session_ids,
            _ => &[],
        }
    }
}

/// Tag usado como clave del `WaitingForRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingForKind {
    Start,
    Immediate,
    Wakeup,
    SessionInit,
    SessionData,
    ExternalEventResponse,
}

impl WaitingForKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitingForKind::Start => "start",
            WaitingForKind::Immediate => "immediate",
            WaitingForKind::Wakeup => "wakeup",
            WaitingForKind::SessionInit => "session_init",
            WaitingForKind::SessionData => "session_data",
            WaitingForKind::ExternalEventResponse => "external_event_response",
        }
    }
}

impl fmt::Display for WaitingForKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
