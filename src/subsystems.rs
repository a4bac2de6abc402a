//! Subsistemas de demostración que atienden los eventos externos: firma
//! (SHA-256 con clave), persistencia en un ledger en memoria y verificación.
//!
//! Respetan el contrato del core: una respuesta por `request_id`, con el
//! mismo `request_id`, dirigida al flow que la pidió. Las requests reenviadas
//! producen la misma respuesta.
use dashmap::DashMap;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use flow_core::hashing::to_canonical_json;
use flow_core::{ExternalEventErrorKind, ExternalEventKind, ExternalEventOutcome, ExternalEventRequest, ExternalEventResponse, FlowEvent};

use crate::bus::FlowBus;

#[derive(Debug, Clone)]
pub struct Subsystems {
    signing_key: String,
    ledger: Arc<DashMap<String, Value>>,
}

impl Subsystems {
    pub fn new(signing_key: &str) -> Self {
        Self { signing_key: signing_key.to_string(),
               ledger: Arc::new(DashMap::new()) }
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    pub fn handle(&self, request: &ExternalEventRequest) -> ExternalEventResponse {
        let outcome = match request.kind {
            ExternalEventKind::Signing => self.sign(&request.payload),
            ExternalEventKind::Persistence => self.persist(&request.request_id, &request.payload),
            ExternalEventKind::Verification => self.verify(&request.payload),
        };
        ExternalEventResponse { request_id: request.request_id.clone(),
                                outcome }
    }

    fn sign(&self, payload: &Value) -> ExternalEventOutcome {
        let mut h = Sha256::new();
        h.update(self.signing_key.as_bytes());
        h.update(to_canonical_json(payload).as_bytes());
        let signature = format!("{:x}", h.finalize());
        ExternalEventOutcome::Payload { payload: json!({ "algorithm": "sha256-keyed",
                                                         "key_id": self.key_id(),
                                                         "signature": signature }) }
    }

    fn key_id(&self) -> String {
        let digest = Sha256::digest(self.signing_key.as_bytes());
        format!("{:x}", digest)[..16].to_string()
    }

    /// Idempotente por `request_id`: un reenvío no duplica el registro.
    fn persist(&self, request_id: &str, payload: &Value) -> ExternalEventOutcome {
        self.ledger
            .entry(request_id.to_string())
            .or_insert_with(|| payload.clone());
        ExternalEventOutcome::Payload { payload: json!({ "stored": true, "ledger_size": self.ledger.len() }) }
    }

    fn verify(&self, payload: &Value) -> ExternalEventOutcome {
        let signatures = payload.get("signatures")
                                .and_then(Value::as_array)
                                .cloned()
                                .unwrap_or_default();
        if signatures.is_empty() {
            return ExternalEventOutcome::Error { kind: ExternalEventErrorKind::Platform,
                                                 message: "no signatures to verify".into() };
        }
        let unsigned = signatures.iter()
                                 .filter(|s| s.get("signature").map_or(true, Value::is_null))
                                 .count();
        if unsigned > 0 {
            return ExternalEventOutcome::Error { kind: ExternalEventErrorKind::Platform,
                                                 message: format!("{unsigned} signature(s) missing") };
        }
        ExternalEventOutcome::Payload { payload: json!({ "valid": true, "checked": signatures.len() }) }
    }

    /// Atiende requests hasta que se cierre el canal.
    pub async fn run(self, mut requests: mpsc::UnboundedReceiver<ExternalEventRequest>, bus: FlowBus) {
        while let Some(request) = requests.recv().await {
            let response = self.handle(&request);
            debug!(request_id = %request.request_id, kind = request.kind.request_name(), "subsystem:answered");
            if let Err(e) = bus.send(FlowEvent::external_response(request.flow_id, chrono::Utc::now(), response)) {
                warn!(request_id = %request.request_id, error = %e, "subsystem:response_dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(kind: ExternalEventKind, id: &str, payload: Value) -> ExternalEventRequest {
        ExternalEventRequest { kind,
                               request_id: id.into(),
                               flow_id: Uuid::nil(),
                               payload }
    }

    #[test]
    fn signatures_depend_on_key_and_payload() {
        let a = Subsystems::new("k1").handle(&request(ExternalEventKind::Signing, "r1", json!({"x": 1})));
        let b = Subsystems::new("k1").handle(&request(ExternalEventKind::Signing, "r2", json!({"x": 1})));
        let c = Subsystems::new("k2").handle(&request(ExternalEventKind::Signing, "r1", json!({"x": 1})));
        assert_eq!(a.outcome, b.outcome);
        assert_ne!(a.outcome, c.outcome);
        assert_eq!(a.request_id, "r1");
    }

    #[test]
    fn resent_persistence_is_stored_once() {
        let s = Subsystems::new("k");
        let req = request(ExternalEventKind::Persistence, "r1", json!({"tx": 1}));
        s.handle(&req);
        s.handle(&req);
        assert_eq!(s.ledger_len(), 1);
    }

    #[test]
    fn verification_requires_signatures() {
        let s = Subsystems::new("k");
        let bad = s.handle(&request(ExternalEventKind::Verification, "r1", json!({ "signatures": [{ "signature": null }] })));
        assert!(matches!(bad.outcome, ExternalEventOutcome::Error { kind: ExternalEventErrorKind::Platform, .. }));
        let ok = s.handle(&request(ExternalEventKind::Verification, "r2", json!({ "signatures": [{ "signature": "ab" }] })));
        assert!(matches!(ok.outcome, ExternalEventOutcome::Payload { .. }));
    }
}
