//! flow-core: motor de flows durables (pipeline de eventos + checkpoints)
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod external;
pub mod handlers;
pub mod hashing;
pub mod pipeline;
pub mod repo;
pub mod runner;
pub mod session;
pub mod waiting;

pub use checkpoint::{ExternalEventErrorKind, ExternalEventKind, ExternalEventOutcome, ExternalEventRequest, ExternalEventResponse,
                     ExternalEventState, FlowCheckpoint, InitiatingSession, SessionPayload, SessionState, SessionStatus, WaitingFor,
                     WaitingForKind};
pub use config::FlowConfig;
pub use engine::{EngineBuilder, FlowEngine};
pub use errors::{classify_error, CoreEngineError, ErrorClass, FlowProcessingError};
pub use event::{FlowEvent, FlowEventKind, FlowStatus, FlowStatusUpdate, OutboundRecord, OutboundSessionEvent, ScheduledWakeup, SessionEvent,
                StartFlow};
pub use external::ExternalEventManager;
pub use pipeline::{FlowEventPipeline, PipelineContext, PipelineOutput};
pub use repo::{CheckpointStore, InMemoryCheckpointStore};
pub use runner::{ExternalEventFailure, ExternalEventFailureKind, Flow, FlowContext, FlowError, FlowRegistry, FlowResumption, FlowRunner,
                 ReplayFlowRunner, SessionMessage, SessionRef};
pub use session::SessionManager;
pub use waiting::{RunOrContinue, WaitingForHandler, WaitingForRegistry};

// Re-export para implementar `Flow` sin depender directamente de async-trait.
pub use async_trait::async_trait;
