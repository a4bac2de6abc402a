use log::{debug, info};

use super::{unexpected, FlowEventHandler};
use crate::checkpoint::SessionPayload;
use crate::errors::FlowProcessingError;
use crate::event::{FlowEventKind, FlowStatus};
use crate::pipeline::PipelineContext;

/// Arranque del flow. Un `StartFlow` repetido sobre un flow que ya corrió
/// no hace nada.
#[derive(Debug, Clone, Copy)]
pub struct StartFlowHandler;

impl FlowEventHandler for StartFlowHandler {
    fn handle(&self, ctx: &mut PipelineContext<'_>, event: &FlowEventKind) -> Result<(), FlowProcessingError> {
        if !matches!(event, FlowEventKind::StartFlow(_)) {
            return Err(unexpected("start_flow", event));
        }
        if ctx.checkpoint.suspend_count > 0 {
            debug!("start:duplicate flow_id={}", ctx.checkpoint.flow_id);
            return Ok(());
        }

        // Responder: la sesión nace confirmada y se contesta con Confirm (seq 0).
        if let Some(init) = ctx.checkpoint.start_context.initiated_by.clone() {
            if !ctx.checkpoint.sessions.contains_key(&init.session_id) {
                let source = ctx.source();
                let mut session = ctx.sessions.create_initiated(&init, ctx.now);
                let confirm = ctx.sessions
                                 .next_message(&mut session, &source, SessionPayload::Confirm, ctx.now);
                ctx.checkpoint.sessions.insert(init.session_id.clone(), session);
                ctx.push_session(confirm);
            }
        }
        info!("start:flow flow_id={} flow_type={} identity={}",
              ctx.checkpoint.flow_id,
              ctx.checkpoint.flow_type(),
              ctx.checkpoint.owning_identity);
        ctx.push_status(FlowStatus::Running, None, None);
        Ok(())
    }
}
