//! Builder para `FlowEngine`.
//!
//! Reúne el store de checkpoints, los flows (y sus responders), los handlers
//! de waiting-for y la configuración.
//!
//! ```ignore
//! let mut engine = FlowEngine::in_memory()
//!     .flow(PingFlow)
//!     .responder("ping", PongFlow)
//!     .config(FlowConfig::default())
//!     .build()?;
//! ```

use crate::checkpoint::WaitingForKind;
use crate::config::FlowConfig;
use crate::engine::FlowEngine;
use crate::errors::CoreEngineError;
use crate::repo::CheckpointStore;
use crate::runner::{Flow, FlowRegistry};
use crate::waiting::{WaitingForHandler, WaitingForRegistry};

#[derive(Debug)]
pub struct EngineBuilder<S: CheckpointStore> {
    store: S,
    flows: FlowRegistry,
    waiting: WaitingForRegistry,
    config: FlowConfig,
}

impl<S: CheckpointStore> EngineBuilder<S> {
    pub fn new(store: S) -> Self {
        Self { store,
               flows: FlowRegistry::new(),
               waiting: WaitingForRegistry::standard(),
               config: FlowConfig::default() }
    }

    /// Registra un flow que se arranca por su tipo.
    #[inline]
    pub fn flow<F>(mut self, flow: F) -> Self
        where F: Flow + 'static
    {
        self.flows.register(flow);
        self
    }

    /// Registra el flow que responde a sesiones abiertas por
    /// `initiator_protocol`.
    #[inline]
    pub fn responder<F>(mut self, initiator_protocol: &str, flow: F) -> Self
        where F: Flow + 'static
    {
        let responder_type = flow.flow_type().to_string();
        self.flows.register(flow);
        self.flows.register_responder(initiator_protocol, &responder_type);
        self
    }

    /// Usa un registro de flows ya armado (reemplaza los registrados).
    pub fn flows(mut self, flows: FlowRegistry) -> Self {
        self.flows = flows;
        self
    }

    /// Añade o reemplaza el handler de un motivo de suspensión.
    pub fn waiting_handler<H>(mut self, kind: WaitingForKind, handler: H) -> Self
        where H: WaitingForHandler + 'static
    {
        self.waiting.register(kind, handler);
        self
    }

    pub fn waiting_registry(mut self, waiting: WaitingForRegistry) -> Self {
        self.waiting = waiting;
        self
    }

    pub fn config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    /// Valida la configuración y construye el engine.
    pub fn build(self) -> Result<FlowEngine<S>, CoreEngineError> {
        self.config.validate()?;
        Ok(FlowEngine::from_parts(self.store, self.flows, self.waiting, self.config))
    }
}
