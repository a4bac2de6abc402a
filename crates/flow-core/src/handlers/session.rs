use log::debug;

use super::{unexpected, FlowEventHandler};
use crate::errors::FlowProcessingError;
use crate::event::FlowEventKind;
use crate::pipeline::PipelineContext;

/// Mete el evento en el buffer de su sesión (descartando duplicados) y aplica
/// los de control que queden en cabeza. Sesión desconocida es fatal.
#[derive(Debug, Clone, Copy)]
pub struct SessionEventHandler;

impl FlowEventHandler for SessionEventHandler {
    fn handle(&self, ctx: &mut PipelineContext<'_>, event: &FlowEventKind) -> Result<(), FlowProcessingError> {
        let FlowEventKind::SessionEvent(ev) = event else {
            return Err(unexpected("session_event", event));
        };
        let sessions = ctx.sessions;
        let now = ctx.now;
        let session = ctx.checkpoint.session_mut(&ev.session_id)?;
        if sessions.process_message_received(session, ev, now) {
            let applied = sessions.process_control_events(session);
            debug!("session:received session_id={} seq={} payload={} control_applied={}",
                   ev.session_id,
                   ev.sequence_number,
                   ev.payload.type_name(),
                   applied);
        }
        Ok(())
    }
}
