use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{FlowContext, FlowError};

/// Lógica de negocio de un tipo de flow.
///
/// `call` se re-ejecuta desde el principio en cada reanudación, así que debe
/// ser determinista: todo efecto pasa por `FlowContext`.
#[async_trait(?Send)]
pub trait Flow: Send + Sync {
    fn flow_type(&self) -> &str;

    async fn call(&self, ctx: FlowContext) -> Result<Value, FlowError>;
}

/// Flows registrados por tipo, más el mapeo protocolo iniciador -> responder.
#[derive(Clone, Default)]
pub struct FlowRegistry {
    flows: HashMap<String, Arc<dyn Flow>>,
    responders: HashMap<String, String>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, flow: F) -> &mut Self
        where F: Flow + 'static
    {
        self.flows.insert(flow.flow_type().to_string(), Arc::new(flow));
        self
    }

    /// Sesiones abiertas por `initiator_protocol` arrancan un `responder_type`.
    pub fn register_responder(&mut self, initiator_protocol: &str, responder_type: &str) -> &mut Self {
        self.responders
            .insert(initiator_protocol.to_string(), responder_type.to_string());
        self
    }

    pub fn get(&self, flow_type: &str) -> Option<Arc<dyn Flow>> {
        self.flows.get(flow_type).cloned()
    }

    pub fn responder_for(&self, initiator_protocol: &str) -> Option<&str> {
        self.responders.get(initiator_protocol).map(String::as_str)
    }

    pub fn flow_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
         .field("flows", &self.flow_types())
         .field("responders", &self.responders)
         .finish()
    }
}
