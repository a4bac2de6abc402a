use log::debug;
use std::collections::BTreeMap;

use super::{RunOrContinue, WaitingForHandler};
use crate::checkpoint::{ExternalEventErrorKind, ExternalEventOutcome, SessionStatus, WaitingFor};
use crate::errors::{CoreEngineError, FlowProcessingError};
use crate::pipeline::PipelineContext;
use crate::runner::{ExternalEventFailure, ExternalEventFailureKind, FlowResumption};

fn mismatch(expected: &str, got: &WaitingFor) -> FlowProcessingError {
    CoreEngineError::Internal(format!("{expected} handler invoked for {}", got.kind())).into()
}

#[derive(Debug, Clone, Copy)]
pub struct StartHandler;

impl WaitingForHandler for StartHandler {
    fn run_or_continue(&self, _ctx: &mut PipelineContext<'_>, _waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        Ok(RunOrContinue::Run(FlowResumption::Start))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImmediateHandler;

impl WaitingForHandler for ImmediateHandler {
    fn run_or_continue(&self, _ctx: &mut PipelineContext<'_>, waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        match waiting_for {
            WaitingFor::Immediate { value } => Ok(RunOrContinue::Run(value.clone())),
            other => Err(mismatch("immediate", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WakeupHandler;

impl WaitingForHandler for WakeupHandler {
    fn run_or_continue(&self, ctx: &mut PipelineContext<'_>, waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        match waiting_for {
            WaitingFor::Wakeup { until } if ctx.now >= *until => Ok(RunOrContinue::Run(FlowResumption::Unit)),
            WaitingFor::Wakeup { .. } => Ok(RunOrContinue::Continue),
            other => Err(mismatch("wakeup", other)),
        }
    }
}

/// Handshake: todas las sesiones confirmadas (o más allá). Una sesión en
/// error reanuda con el error.
#[derive(Debug, Clone, Copy)]
pub struct SessionInitHandler;

impl WaitingForHandler for SessionInitHandler {
    fn run_or_continue(&self, ctx: &mut PipelineContext<'_>, waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        let WaitingFor::SessionInit { session_ids } = waiting_for else {
            return Err(mismatch("session_init", waiting_for));
        };
        let mut all_confirmed = true;
        for id in session_ids {
            let session = ctx.checkpoint.session(id)?;
            match session.status {
                SessionStatus::Error => return Ok(RunOrContinue::Run(session_error(id, session.error_message.as_deref()))),
                SessionStatus::Creating => all_confirmed = false,
                SessionStatus::Confirmed | SessionStatus::Closing | SessionStatus::Closed => {}
            }
        }
        Ok(if all_confirmed { RunOrContinue::Run(FlowResumption::Unit) } else { RunOrContinue::Continue })
    }
}

/// `receive`: se reanuda sólo cuando cada sesión tiene su siguiente evento de
/// datos en orden. Hasta entonces no se consume nada.
#[derive(Debug, Clone, Copy)]
pub struct SessionDataHandler;

impl WaitingForHandler for SessionDataHandler {
    fn run_or_continue(&self, ctx: &mut PipelineContext<'_>, waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        let WaitingFor::SessionData { session_ids } = waiting_for else {
            return Err(mismatch("session_data", waiting_for));
        };
        let sessions = ctx.sessions;
        for id in session_ids {
            let session = ctx.checkpoint.session_mut(id)?;
            sessions.process_control_events(session);
            if session.status == SessionStatus::Error {
                return Ok(RunOrContinue::Run(session_error(id, session.error_message.as_deref())));
            }
            match sessions.get_next_received_event(session) {
                Some(ev) if ev.payload.data().is_some() => {}
                _ if session.has_received_close => {
                    return Ok(RunOrContinue::Run(session_error(id, Some("session closed by counterparty"))));
                }
                _ => return Ok(RunOrContinue::Continue),
            }
        }

        let mut payloads = BTreeMap::new();
        for id in session_ids {
            let session = ctx.checkpoint.session_mut(id)?;
            let Some(next) = sessions.get_next_received_event(session) else {
                return Err(CoreEngineError::Internal(format!("session {id} lost its buffered event")).into());
            };
            let seq = next.sequence_number;
            let data = next.payload.data().cloned().unwrap_or_default();
            sessions.acknowledge_received_event(session, seq);
            sessions.process_control_events(session);
            debug!("waiting:session_data session_id={} seq={}", id, seq);
            payloads.insert(id.clone(), data);
        }
        Ok(RunOrContinue::Run(FlowResumption::SessionData { payloads }))
    }
}

/// Respuesta del subsistema instalada por el coordinador, o reenvíos
/// agotados. Al reanudar se retira el evento externo del checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct ExternalEventResponseHandler;

impl WaitingForHandler for ExternalEventResponseHandler {
    fn run_or_continue(&self, ctx: &mut PipelineContext<'_>, waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError> {
        let WaitingFor::ExternalEventResponse { request_id } = waiting_for else {
            return Err(mismatch("external_event_response", waiting_for));
        };
        let state = match &ctx.checkpoint.pending_external_event {
            Some(state) if &state.request_id == request_id => state,
            _ => return Err(CoreEngineError::ExternalEventNotPending(request_id.clone()).into()),
        };
        let resumption = match &state.response {
            Some(ExternalEventOutcome::Payload { payload }) => FlowResumption::ExternalEventResponse { payload: payload.clone() },
            Some(ExternalEventOutcome::Error { kind: ExternalEventErrorKind::Fatal,
                                               message, }) => {
                return Err(CoreEngineError::ExternalEventFatal { request_id: request_id.clone(),
                                                                 message: message.clone() }.into());
            }
            Some(ExternalEventOutcome::Error { message, .. }) => {
                FlowResumption::ExternalEventFailed { failure: ExternalEventFailure { kind: ExternalEventFailureKind::Platform,
                                                                                      message: message.clone(),
                                                                                      retries: state.retries } }
            }
            None if state.retries_exhausted => {
                let message = state.last_error
                                   .clone()
                                   .unwrap_or_else(|| format!("no response to {}", state.request.kind.request_name()));
                FlowResumption::ExternalEventFailed { failure: ExternalEventFailure { kind: ExternalEventFailureKind::RetriesExhausted,
                                                                                      message,
                                                                                      retries: state.retries } }
            }
            None => return Ok(RunOrContinue::Continue),
        };
        ctx.checkpoint.pending_external_event = None;
        Ok(RunOrContinue::Run(resumption))
    }
}

fn session_error(session_id: &str, message: Option<&str>) -> FlowResumption {
    FlowResumption::SessionError { session_id: session_id.to_string(),
                                   message: message.unwrap_or("session error").to_string() }
}
