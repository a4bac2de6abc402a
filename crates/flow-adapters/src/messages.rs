//! Payloads tipados que viajan por las sesiones y hacia los subsistemas.
//!
//! El core sólo ve `serde_json::Value`; aquí fijamos la forma de cada
//! mensaje para que ambos lados de la conversación la compartan.
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use flow_core::hashing::to_canonical_json;
use flow_core::FlowError;

/// Argumentos de `TransferFlow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferArgs {
    pub counterparty: String,
    pub amount: u64,
    #[serde(default)]
    pub memo: Option<String>,
}

/// Propuesta que el iniciador envía a la contraparte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub tx_id: String,
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub memo: Option<String>,
    /// Sal de privacidad del iniciador; entra en el `tx_id`.
    pub salt: String,
}

impl Proposal {
    pub fn new(from: &str, to: &str, amount: u64, memo: Option<String>, salt: String) -> Self {
        let mut p = Self { tx_id: String::new(),
                           from: from.to_string(),
                           to: to.to_string(),
                           amount,
                           memo,
                           salt };
        p.tx_id = p.digest();
        p
    }

    /// SHA-256 del JSON canónico de la propuesta sin `tx_id`.
    pub fn digest(&self) -> String {
        let mut body = serde_json::json!(self);
        if let Some(obj) = body.as_object_mut() {
            obj.remove("tx_id");
        }
        let mut h = Sha256::new();
        h.update(to_canonical_json(&body).as_bytes());
        format!("{:x}", h.finalize())
    }
}

/// Respuesta de la contraparte a una propuesta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acceptance {
    pub tx_id: String,
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Firma enviada por sesión.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMessage {
    pub tx_id: String,
    pub signer: String,
    pub signature: Value,
}

/// Argumentos de `NotifyAndSignFlow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyArgs {
    pub counterparty: String,
    pub document: Value,
}

pub fn decode<T: DeserializeOwned>(what: &str, value: Value) -> Result<T, FlowError> {
    serde_json::from_value(value).map_err(|e| FlowError::business(format!("invalid {what}: {e}")))
}

pub fn encode<T: Serialize>(value: &T) -> Result<Value, FlowError> {
    serde_json::to_value(value).map_err(|e| FlowError::business(format!("encode: {e}")))
}
