//! Records salientes acumulados durante el procesamiento de un evento.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::{ExternalEventRequest, SessionPayload};
use crate::constants::{FLOW_SESSION_OUT_TOPIC, FLOW_STATUS_TOPIC, FLOW_WAKEUP_TOPIC};

/// Mensaje de sesión dirigido a la contraparte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundSessionEvent {
    pub source: String,
    pub destination: String,
    pub session_id: String,
    pub sequence_number: u64,
    pub payload: SessionPayload,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStatusUpdate {
    pub flow_id: Uuid,
    pub owning_identity: String,
    pub flow_type: String,
    pub status: FlowStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Pide al servicio de timers un `Wakeup` para el flow en `at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledWakeup {
    pub flow_id: Uuid,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum OutboundRecord {
    Session(OutboundSessionEvent),
    ExternalEvent(ExternalEventRequest),
    Status(FlowStatusUpdate),
    Wakeup(ScheduledWakeup),
}

impl OutboundRecord {
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundRecord::Session(_) => FLOW_SESSION_OUT_TOPIC,
            OutboundRecord::ExternalEvent(req) => req.kind.topic(),
            OutboundRecord::Status(_) => FLOW_STATUS_TOPIC,
            OutboundRecord::Wakeup(_) => FLOW_WAKEUP_TOPIC,
        }
    }

    /// Clave de partición del record en su topic.
    pub fn key(&self) -> String {
        match self {
            OutboundRecord::Session(ev) => format!("{}|{}", ev.destination, ev.session_id),
            OutboundRecord::ExternalEvent(req) => req.request_id.clone(),
            OutboundRecord::Status(st) => st.flow_id.to_string(),
            OutboundRecord::Wakeup(w) => w.flow_id.to_string(),
        }
    }
}
