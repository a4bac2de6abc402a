use log::debug;

use super::{unexpected, FlowEventHandler};
use crate::errors::FlowProcessingError;
use crate::event::FlowEventKind;
use crate::pipeline::PipelineContext;

/// Respuesta de un subsistema. Sin evento pendiente (o de otra request) se
/// ignora: son reentregas o respuestas a un reenvío ya contestado.
#[derive(Debug, Clone, Copy)]
pub struct ExternalEventResponseEventHandler;

impl FlowEventHandler for ExternalEventResponseEventHandler {
    fn handle(&self, ctx: &mut PipelineContext<'_>, event: &FlowEventKind) -> Result<(), FlowProcessingError> {
        let FlowEventKind::ExternalEventResponse(response) = event else {
            return Err(unexpected("external_event_response", event));
        };
        match &ctx.checkpoint.pending_external_event {
            Some(state) => {
                let next = ctx.external.process_message_received(state, response);
                ctx.checkpoint.pending_external_event = Some(next);
            }
            None => debug!("external:no_pending flow_id={} request_id={}",
                           ctx.checkpoint.flow_id, response.request_id),
        }
        Ok(())
    }
}
