use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::checkpoint::FlowCheckpoint;
use crate::config::FlowConfig;
use crate::errors::CoreEngineError;
use crate::event::{FlowStatus, FlowStatusUpdate, OutboundRecord, OutboundSessionEvent};
use crate::external::ExternalEventManager;
use crate::session::SessionManager;

/// Estado de trabajo mientras se procesa un evento: copia del checkpoint,
/// "ahora" del evento y records acumulados. Los handlers de eventos y de
/// waiting-for sólo tocan esto.
#[derive(Debug)]
pub struct PipelineContext<'a> {
    pub checkpoint: FlowCheckpoint,
    pub now: DateTime<Utc>,
    pub config: &'a FlowConfig,
    pub sessions: SessionManager,
    pub external: ExternalEventManager,
    pub records: Vec<OutboundRecord>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(checkpoint: FlowCheckpoint, now: DateTime<Utc>, config: &'a FlowConfig) -> Self {
        Self { checkpoint,
               now,
               config,
               sessions: SessionManager::new(config.session_timeout),
               external: ExternalEventManager,
               records: Vec::new() }
    }

    /// Identidad origen de los mensajes de sesión.
    pub fn source(&self) -> String {
        self.checkpoint.owning_identity.clone()
    }

    pub fn push_session(&mut self, event: OutboundSessionEvent) {
        self.records.push(OutboundRecord::Session(event));
    }

    pub fn push_status(&mut self, status: FlowStatus, result: Option<Value>, error: Option<String>) {
        let update = FlowStatusUpdate { flow_id: self.checkpoint.flow_id,
                                        owning_identity: self.checkpoint.owning_identity.clone(),
                                        flow_type: self.checkpoint.flow_type().to_string(),
                                        status,
                                        result,
                                        error,
                                        timestamp: self.now };
        self.records.push(OutboundRecord::Status(update));
    }

    /// Pasa la sesión a `Error` y avisa a la contraparte.
    pub fn fail_session(&mut self, session_id: &str, message: &str) -> Result<(), CoreEngineError> {
        let source = self.source();
        let now = self.now;
        let sessions = self.sessions;
        let session = self.checkpoint.session_mut(session_id)?;
        if let Some(out) = sessions.send_error(session, &source, message, now) {
            self.push_session(out);
        }
        Ok(())
    }

    pub fn close_session(&mut self, session_id: &str) -> Result<(), CoreEngineError> {
        let source = self.source();
        let now = self.now;
        let sessions = self.sessions;
        let session = self.checkpoint.session_mut(session_id)?;
        if let Some(out) = sessions.send_close(session, &source, now) {
            self.push_session(out);
        }
        Ok(())
    }
}
