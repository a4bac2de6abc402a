use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FlowIoRequest, FlowResumption};
use crate::constants::CONTINUATION_VERSION;
use crate::hashing::hash_value;

/// Un paso ya resuelto: la petición (por huella) y el valor con el que se
/// reanudó.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub(crate) fingerprint: String,
    pub(crate) resumption: FlowResumption,
}

/// Snapshot opaco de la continuación: el journal de reanudaciones que
/// permite reconstruir la lógica hasta su última suspensión.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationState {
    pub(crate) version: u32,
    pub(crate) journal: Vec<JournalEntry>,
    /// Huella de la petición en la que está suspendida la lógica.
    pub(crate) awaiting: Option<String>,
}

impl Default for ContinuationState {
    fn default() -> Self {
        Self { version: CONTINUATION_VERSION,
               journal: Vec::new(),
               awaiting: None }
    }
}

impl ContinuationState {
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Pasos reanudados hasta ahora.
    pub fn steps(&self) -> usize {
        self.journal.len()
    }

    pub fn is_suspended(&self) -> bool {
        self.awaiting.is_some()
    }
}

pub(crate) fn fingerprint(request: &FlowIoRequest) -> String {
    let value = serde_json::to_value(request).unwrap_or(Value::Null);
    hash_value(&value)
}
