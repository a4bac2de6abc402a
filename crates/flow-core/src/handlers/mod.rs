//! Handlers de eventos entrantes, uno por tipo de `FlowEvent`.
//!
//! Aplican el evento al sub-estado del checkpoint (sesiones, evento externo,
//! timers) pero no deciden si la lógica se reanuda: eso es cosa del
//! `WaitingForRegistry`.
mod external;
mod session;
mod start;
mod wakeup;

pub use external::ExternalEventResponseEventHandler;
pub use session::SessionEventHandler;
pub use start::StartFlowHandler;
pub use wakeup::WakeupEventHandler;

use crate::errors::FlowProcessingError;
use crate::event::FlowEventKind;
use crate::pipeline::PipelineContext;

pub trait FlowEventHandler: Send + Sync {
    fn handle(&self, ctx: &mut PipelineContext<'_>, event: &FlowEventKind) -> Result<(), FlowProcessingError>;
}

static START: StartFlowHandler = StartFlowHandler;
static SESSION: SessionEventHandler = SessionEventHandler;
static WAKEUP: WakeupEventHandler = WakeupEventHandler;
static EXTERNAL: ExternalEventResponseEventHandler = ExternalEventResponseEventHandler;

/// Handler según el tipo de evento.
pub fn handler_for(event: &FlowEventKind) -> &'static dyn FlowEventHandler {
    match event {
        FlowEventKind::StartFlow(_) => &START,
        FlowEventKind::SessionEvent(_) => &SESSION,
        FlowEventKind::Wakeup => &WAKEUP,
        FlowEventKind::ExternalEventResponse(_) => &EXTERNAL,
    }
}

fn unexpected(handler: &str, event: &FlowEventKind) -> FlowProcessingError {
    crate::errors::CoreEngineError::InvalidEvent(format!("{handler} handler got {}", event.type_name())).into()
}
