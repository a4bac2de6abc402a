//! External Event Coordinator.
//!
//! Bookkeeping genérica de la única llamada en curso a un subsistema
//! (firma, persistencia, verificación). Las funciones son puras: reciben el
//! estado y devuelven uno nuevo, el pipeline decide qué hacer con él.
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::checkpoint::{ExternalEventErrorKind, ExternalEventKind, ExternalEventOutcome, ExternalEventRequest, ExternalEventResponse,
                        ExternalEventState};
use crate::config::deadline_after;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalEventManager;

impl ExternalEventManager {
    /// Estado inicial tras el primer envío.
    pub fn process_message_to_send(&self,
                                   request_id: &str,
                                   kind: ExternalEventKind,
                                   flow_id: Uuid,
                                   payload: Value,
                                   now: DateTime<Utc>)
                                   -> ExternalEventState {
        ExternalEventState { request_id: request_id.to_string(),
                             request: ExternalEventRequest { kind,
                                                             request_id: request_id.to_string(),
                                                             flow_id,
                                                             payload },
                             response: None,
                             retries: 0,
                             send_timestamp: now,
                             last_error: None,
                             retries_exhausted: false }
    }

    /// Instala la respuesta si corresponde a la request pendiente. Respuestas
    /// de otra request o repetidas devuelven el estado sin cambios. Un error
    /// transitorio sólo se anota: la request sigue pendiente de reenvío.
    pub fn process_message_received(&self, state: &ExternalEventState, response: &ExternalEventResponse) -> ExternalEventState {
        if response.request_id != state.request_id {
            debug!("external:stale request_id={} pending={}", response.request_id, state.request_id);
            return state.clone();
        }
        if state.response.is_some() {
            debug!("external:duplicate request_id={}", state.request_id);
            return state.clone();
        }
        let mut next = state.clone();
        match &response.outcome {
            ExternalEventOutcome::Error { kind: ExternalEventErrorKind::Transient,
                                          message, } => {
                warn!("external:transient request_id={} error={}", state.request_id, message);
                next.last_error = Some(message.clone());
            }
            outcome => next.response = Some(outcome.clone()),
        }
        next
    }

    /// Toca reenviar: sigue pendiente y pasó la ventana desde el último envío.
    pub fn is_resend_due(&self, state: &ExternalEventState, now: DateTime<Utc>, resend_window: Duration) -> bool {
        state.is_outstanding() && now - state.send_timestamp >= resend_window
    }

    /// Devuelve la request a reenviar (si toca) junto con el estado avanzado:
    /// `send_timestamp = now` y un reintento más.
    pub fn get_message_to_send(&self,
                               state: &ExternalEventState,
                               now: DateTime<Utc>,
                               resend_window: Duration)
                               -> (ExternalEventState, Option<ExternalEventRequest>) {
        if !self.is_resend_due(state, now, resend_window) {
            return (state.clone(), None);
        }
        let mut next = state.clone();
        next.send_timestamp = now;
        next.retries += 1;
        debug!("external:resend request_id={} retries={}", next.request_id, next.retries);
        let request = next.request.clone();
        (next, Some(request))
    }

    /// Marca la request como agotada; el flow recibirá un fallo recuperable.
    pub fn mark_retries_exhausted(&self, state: &ExternalEventState) -> ExternalEventState {
        warn!("external:exhausted request_id={} retries={}", state.request_id, state.retries);
        let mut next = state.clone();
        next.retries_exhausted = true;
        next
    }

    /// Instante del próximo reenvío, si la request sigue pendiente.
    pub fn next_resend_at(&self, state: &ExternalEventState, resend_window: Duration) -> Option<DateTime<Utc>> {
        state.is_outstanding().then(|| deadline_after(state.send_timestamp, resend_window))
    }
}
