//! Modelo persistido de un flow suspendido.
//!
//! Un `FlowCheckpoint` se crea con `StartFlow`, sólo lo muta el pipeline y se
//! borra cuando el flow termina. Todo el estado por sesión y por evento
//! externo vive dentro del checkpoint: no hay mapas compartidos entre flows.

mod external;
mod session;
mod types;
mod waiting;

pub use external::{ExternalEventErrorKind, ExternalEventKind, ExternalEventOutcome, ExternalEventRequest,
                   ExternalEventResponse, ExternalEventState};
pub use session::{ReceivedSessionEvent, SessionPayload, SessionState, SessionStatus};
pub use types::{FlowCheckpoint, FlowStartContext, InitiatingSession, PipelineRetry};
pub use waiting::{WaitingFor, WaitingForKind};
