//! flow-adapters: flows de negocio concretos sobre `flow-core`
//!
//! Este crate provee:
//! - Payloads tipados (`messages`) compartidos por ambos lados de cada
//!   conversación.
//! - Flows iniciadores y sus responders (`flows`).
//! - `standard_registry()` con todo registrado, que usan el binario y los
//!   tests de integración.
//!
//! Nota: el core sólo conoce `serde_json::Value`; la forma de los mensajes
//! vive aquí.

pub mod flows;
pub mod messages;

use flow_core::{CheckpointStore, EngineBuilder, FlowRegistry};

use flows::{DelayFlow, NotifyAndSignFlow, NotifyResponderFlow, TransferFlow, TransferResponderFlow, NOTIFY_AND_SIGN_FLOW,
            NOTIFY_RESPONDER_FLOW, TRANSFER_FLOW, TRANSFER_RESPONDER_FLOW};

/// Registro con todos los flows y el mapeo iniciador -> responder.
pub fn standard_registry() -> FlowRegistry {
    let mut registry = FlowRegistry::new();
    registry.register(TransferFlow)
            .register(TransferResponderFlow::default())
            .register(NotifyAndSignFlow)
            .register(NotifyResponderFlow)
            .register(DelayFlow)
            .register_responder(TRANSFER_FLOW, TRANSFER_RESPONDER_FLOW)
            .register_responder(NOTIFY_AND_SIGN_FLOW, NOTIFY_RESPONDER_FLOW);
    registry
}

/// Atajo para registrar todo en un builder de engine.
pub fn register_all<S: CheckpointStore>(builder: EngineBuilder<S>) -> EngineBuilder<S> {
    builder.flows(standard_registry())
}
