use log::warn;

use super::{unexpected, FlowEventHandler};
use crate::errors::FlowProcessingError;
use crate::event::{FlowEventKind, OutboundRecord};
use crate::pipeline::PipelineContext;

pub const SESSION_TIMEOUT_MESSAGE: &str = "session timed out";

/// Timer: reenvío del evento externo pendiente y expiración de las sesiones
/// sobre las que el flow espera. El fin de un `sleep` lo decide el handler de
/// waiting-for.
#[derive(Debug, Clone, Copy)]
pub struct WakeupEventHandler;

impl FlowEventHandler for WakeupEventHandler {
    fn handle(&self, ctx: &mut PipelineContext<'_>, event: &FlowEventKind) -> Result<(), FlowProcessingError> {
        if !matches!(event, FlowEventKind::Wakeup) {
            return Err(unexpected("wakeup", event));
        }

        if let Some(state) = ctx.checkpoint.pending_external_event.take() {
            let window = ctx.config.external_event_resend_window;
            let next = if !ctx.external.is_resend_due(&state, ctx.now, window) {
                state
            } else if state.retries >= ctx.checkpoint.max_retries {
                ctx.external.mark_retries_exhausted(&state)
            } else {
                let (next, request) = ctx.external.get_message_to_send(&state, ctx.now, window);
                if let Some(request) = request {
                    ctx.records.push(OutboundRecord::ExternalEvent(request));
                }
                next
            };
            ctx.checkpoint.pending_external_event = Some(next);
        }

        let waited: Vec<String> = ctx.checkpoint
                                     .waiting_for
                                     .as_ref()
                                     .map(|w| w.session_ids().to_vec())
                                     .unwrap_or_default();
        for id in waited {
            let expired = ctx.sessions.is_expired(ctx.checkpoint.session(&id)?, ctx.now);
            if expired {
                warn!("wakeup:session_expired flow_id={} session_id={}", ctx.checkpoint.flow_id, id);
                ctx.fail_session(&id, SESSION_TIMEOUT_MESSAGE)?;
            }
        }
        Ok(())
    }
}
