//! Errores específicos del core.
//!
//! `CoreEngineError` cubre los errores fatales del pipeline (inconsistencias de
//! checkpoint o de protocolo). Los errores que el pipeline puede reintentar se
//! expresan con `FlowProcessingError::Transient`; `classify_error` permite a
//! capas externas (persistencia, workers) decidir sin hacer match exhaustivo.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::checkpoint::WaitingForKind;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreEngineError {
    #[error("flow {0} not found")] FlowNotFound(Uuid),
    #[error("unknown session {0}")] UnknownSession(String),
    #[error("no waiting-for handler registered for {0}")] NoWaitingForHandler(WaitingForKind),
    #[error("checkpoint at rest without waiting-for")] MissingWaitingFor,
    #[error("external event {0} already pending")] ExternalEventAlreadyPending(String),
    #[error("no pending external event {0}")] ExternalEventNotPending(String),
    #[error("external event {request_id} failed fatally: {message}")]
    ExternalEventFatal { request_id: String, message: String },
    #[error("unknown flow type {0}")] UnknownFlowType(String),
    #[error("unsupported continuation version {0}")] UnsupportedContinuation(u32),
    #[error("non-deterministic flow: {0}")] NonDeterministicFlow(String),
    #[error("flow suspended outside an engine request")] FlowStalled,
    #[error("flow panicked: {0}")] FlowPanicked(String),
    #[error("pipeline retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("invalid event: {0}")] InvalidEvent(String),
    #[error("invalid configuration: {0}")] InvalidConfig(String),
    #[error("checkpoint store: {0}")] Store(String),
    #[error("internal: {0}")] Internal(String),
}

/// Resultado de una etapa del pipeline: fatal (el flow falla) o transitorio
/// (el evento se reintenta sobre el checkpoint previo).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FlowProcessingError {
    #[error(transparent)] Fatal(#[from] CoreEngineError),
    #[error("transient: {0}")] Transient(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invariante de checkpoint/protocolo roto: no se reintenta.
    Fatal,
    /// Puede reintentarse (store caído, runner sin recursos).
    Transient,
    /// El evento no corresponde a ningún flow vivo; se descarta.
    Orphan,
}

pub fn classify_error(err: &CoreEngineError) -> ErrorClass {
    match err {
        CoreEngineError::FlowNotFound(_) => ErrorClass::Orphan,
        CoreEngineError::Store(_) => ErrorClass::Transient,
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_transient() {
        assert_eq!(classify_error(&CoreEngineError::Store("down".into())), ErrorClass::Transient);
        assert_eq!(classify_error(&CoreEngineError::FlowNotFound(Uuid::nil())), ErrorClass::Orphan);
        assert_eq!(classify_error(&CoreEngineError::MissingWaitingFor), ErrorClass::Fatal);
    }

    #[test]
    fn fatal_converts_into_processing_error() {
        let e: FlowProcessingError = CoreEngineError::UnknownSession("s1".into()).into();
        assert_eq!(e.to_string(), "unknown session s1");
    }
}
