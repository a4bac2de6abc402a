//! Waiting-For Registry.
//!
//! Un handler por motivo de suspensión. Cada uno mira el checkpoint (tras
//! aplicar el evento) y decide si la lógica puede reanudarse. No hacen I/O:
//! como mucho consumen eventos de sesión ya recibidos o retiran el evento
//! externo completado.
mod standard;

use std::collections::HashMap;
use std::sync::Arc;

pub use standard::{ExternalEventResponseHandler, ImmediateHandler, SessionDataHandler, SessionInitHandler, StartHandler,
                   WakeupHandler};

use crate::checkpoint::{WaitingFor, WaitingForKind};
use crate::errors::FlowProcessingError;
use crate::pipeline::PipelineContext;
use crate::runner::FlowResumption;

#[derive(Debug, Clone, PartialEq)]
pub enum RunOrContinue {
    Run(FlowResumption),
    Continue,
}

pub trait WaitingForHandler: Send + Sync {
    fn run_or_continue(&self, ctx: &mut PipelineContext<'_>, waiting_for: &WaitingFor) -> Result<RunOrContinue, FlowProcessingError>;
}

#[derive(Clone, Default)]
pub struct WaitingForRegistry {
    handlers: HashMap<WaitingForKind, Arc<dyn WaitingForHandler>>,
}

impl WaitingForRegistry {
    /// Registro vacío; sin handlers cualquier suspensión es fatal.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Handlers estándar para todos los `WaitingFor`.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(WaitingForKind::Start, StartHandler)
                .register(WaitingForKind::Immediate, ImmediateHandler)
                .register(WaitingForKind::Wakeup, WakeupHandler)
                .register(WaitingForKind::SessionInit, SessionInitHandler)
                .register(WaitingForKind::SessionData, SessionDataHandler)
                .register(WaitingForKind::ExternalEventResponse, ExternalEventResponseHandler);
        registry
    }

    /// Registra (o reemplaza) el handler de `kind`.
    pub fn register<H>(&mut self, kind: WaitingForKind, handler: H) -> &mut Self
        where H: WaitingForHandler + 'static
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn get(&self, kind: WaitingForKind) -> Option<&dyn WaitingForHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }
}

impl std::fmt::Debug for WaitingForRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("WaitingForRegistry").field("handlers", &kinds).finish()
    }
}
