//! Flow Continuation Runner.
//!
//! La lógica de negocio es un `async fn` sobre `FlowContext`. El runner la
//! ejecuta con un único `poll`: los pasos ya vividos se resuelven con el
//! journal del checkpoint y el primero sin valor deja su petición, que el
//! pipeline interpreta. El snapshot persistido es el journal, no el futuro.
mod context;
mod continuation;
mod flow;
mod replay;
mod request;

pub use context::FlowContext;
pub use continuation::{ContinuationState, JournalEntry};
pub use flow::{Flow, FlowRegistry};
pub use replay::{FlowRunner, ReplayFlowRunner, RunOutcome};
pub use request::{ExternalEventFailure, ExternalEventFailureKind, FlowError, FlowIoRequest, FlowResumption, SessionMessage, SessionRef};
