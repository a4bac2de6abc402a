//! Interpretación de la petición con la que se suspende la lógica.
use chrono::Duration;
use log::{info, warn};

use super::PipelineContext;
use crate::checkpoint::{SessionPayload, SessionStatus, WaitingFor};
use crate::errors::{CoreEngineError, FlowProcessingError};
use crate::event::{FlowStatus, OutboundRecord};
use crate::hashing::derive_id;
use crate::runner::{FlowError, FlowIoRequest, FlowResumption, SessionMessage, SessionRef};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RequestOutcome {
    Suspend(WaitingFor),
    /// El flow terminó (bien o mal); el checkpoint se borra.
    Terminated,
}

pub(crate) fn apply_request(ctx: &mut PipelineContext<'_>, request: FlowIoRequest) -> Result<RequestOutcome, FlowProcessingError> {
    match request {
        FlowIoRequest::Send { messages } => send(ctx, messages),
        FlowIoRequest::Receive { sessions } => receive(ctx, sessions),
        FlowIoRequest::CloseSessions { sessions } => {
            for s in &sessions {
                ctx.close_session(&s.session_id)?;
            }
            Ok(RequestOutcome::Suspend(WaitingFor::Immediate { value: FlowResumption::Unit }))
        }
        FlowIoRequest::Sleep { millis } => {
            let until = Duration::try_milliseconds(millis.max(0)).and_then(|d| ctx.now.checked_add_signed(d));
            match until {
                Some(until) => Ok(RequestOutcome::Suspend(WaitingFor::Wakeup { until })),
                None => {
                    let error = FlowError::business(format!("sleep of {millis} ms ends outside the representable time range"));
                    apply_request(ctx, FlowIoRequest::FlowFailed { error })
                }
            }
        }
        FlowIoRequest::ExternalEvent { kind, payload } => {
            if let Some(pending) = &ctx.checkpoint.pending_external_event {
                return Err(CoreEngineError::ExternalEventAlreadyPending(pending.request_id.clone()).into());
            }
            let flow_id = ctx.checkpoint.flow_id;
            let request_id = derive_id(&[&flow_id.to_string(), "external-event", &ctx.checkpoint.suspend_count.to_string()]);
            let state = ctx.external
                           .process_message_to_send(&request_id, kind, flow_id, payload, ctx.now);
            ctx.records.push(OutboundRecord::ExternalEvent(state.request.clone()));
            ctx.checkpoint.pending_external_event = Some(state);
            Ok(RequestOutcome::Suspend(WaitingFor::ExternalEventResponse { request_id }))
        }
        FlowIoRequest::FlowFinished { result } => {
            for id in ctx.checkpoint.open_session_ids() {
                ctx.close_session(&id)?;
            }
            info!("flow:completed flow_id={}", ctx.checkpoint.flow_id);
            ctx.push_status(FlowStatus::Completed, Some(result), None);
            Ok(RequestOutcome::Terminated)
        }
        FlowIoRequest::FlowFailed { error } => {
            let message = error.to_string();
            warn!("flow:failed flow_id={} error={}", ctx.checkpoint.flow_id, message);
            for id in ctx.checkpoint.open_session_ids() {
                ctx.fail_session(&id, &message)?;
            }
            ctx.push_status(FlowStatus::Failed, None, Some(message));
            Ok(RequestOutcome::Terminated)
        }
    }
}

/// Sesión nueva: se crea en `Creating` y el primer mensaje es el `Init`.
fn open_session(ctx: &mut PipelineContext<'_>, session: &SessionRef, payload: Option<serde_json::Value>) {
    let source = ctx.source();
    let mut state = ctx.sessions
                       .create_initiating(&session.session_id, &session.counterparty, ctx.now);
    let init = SessionPayload::Init { protocol: ctx.checkpoint.flow_type().to_string(),
                                      payload };
    let out = ctx.sessions.next_message(&mut state, &source, init, ctx.now);
    ctx.checkpoint.sessions.insert(session.session_id.clone(), state);
    ctx.push_session(out);
}

fn send(ctx: &mut PipelineContext<'_>, messages: Vec<SessionMessage>) -> Result<RequestOutcome, FlowProcessingError> {
    // Se valida todo antes de enviar nada.
    for msg in &messages {
        if let Some(session) = ctx.checkpoint.sessions.get(&msg.session.session_id) {
            if session.status.is_terminal() || session.has_sent_close {
                let message = session.error_message
                                     .clone()
                                     .unwrap_or_else(|| "session already closed".to_string());
                let value = FlowResumption::SessionError { session_id: session.session_id.clone(),
                                                           message };
                return Ok(RequestOutcome::Suspend(WaitingFor::Immediate { value }));
            }
        }
    }

    let source = ctx.source();
    let mut creating = Vec::new();
    for msg in messages {
        let id = msg.session.session_id.clone();
        if !ctx.checkpoint.sessions.contains_key(&id) {
            open_session(ctx, &msg.session, Some(msg.payload));
            creating.push(id);
            continue;
        }
        let sessions = ctx.sessions;
        let now = ctx.now;
        let session = ctx.checkpoint.session_mut(&id)?;
        let out = sessions.next_message(session, &source, SessionPayload::Data { payload: msg.payload }, now);
        let still_creating = session.status == SessionStatus::Creating;
        ctx.push_session(out);
        if still_creating && !creating.contains(&id) {
            creating.push(id);
        }
    }
    Ok(if creating.is_empty() {
           RequestOutcome::Suspend(WaitingFor::Immediate { value: FlowResumption::Unit })
       } else {
           RequestOutcome::Suspend(WaitingFor::SessionInit { session_ids: creating })
       })
}

fn receive(ctx: &mut PipelineContext<'_>, sessions: Vec<SessionRef>) -> Result<RequestOutcome, FlowProcessingError> {
    let mut session_ids = Vec::with_capacity(sessions.len());
    for s in &sessions {
        if !ctx.checkpoint.sessions.contains_key(&s.session_id) {
            open_session(ctx, s, None);
        }
        session_ids.push(s.session_id.clone());
    }
    Ok(RequestOutcome::Suspend(WaitingFor::SessionData { session_ids }))
}
