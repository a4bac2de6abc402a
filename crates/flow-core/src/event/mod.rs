//! Eventos entrantes del flow y records salientes del pipeline.

mod record;
mod types;

pub use record::{FlowStatus, FlowStatusUpdate, OutboundRecord, OutboundSessionEvent, ScheduledWakeup};
pub use types::{FlowEvent, FlowEventKind, SessionEvent, StartFlow};
