//! Worker de partición: un engine, un canal de entrada.
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use flow_core::{classify_error, CheckpointStore, ErrorClass, FlowEngine, FlowEvent};

use crate::bus::FlowBus;
use crate::errors::CoreError;

pub struct PartitionWorker<S>
    where S: CheckpointStore
{
    index: usize,
    engine: FlowEngine<S>,
    bus: FlowBus,
}

impl<S> PartitionWorker<S>
    where S: CheckpointStore + Send + 'static
{
    pub fn new(index: usize, engine: FlowEngine<S>, bus: FlowBus) -> Self {
        Self { index, engine, bus }
    }

    pub fn engine(&self) -> &FlowEngine<S> {
        &self.engine
    }

    /// Procesa un evento y publica sus records. Devuelve cuántos publicó.
    ///
    /// - Eventos sin flow (respuestas tardías, mensajes a flows terminados)
    ///   se descartan.
    /// - Fallos transitorios del store reprograman el mismo evento; el
    ///   engine es idempotente ante la reentrega.
    pub fn handle(&mut self, event: &FlowEvent) -> Result<usize, CoreError> {
        let records = match self.engine.process(event) {
            Ok(records) => records,
            Err(e) => {
                return match classify_error(&e) {
                    ErrorClass::Orphan => {
                        debug!(partition = self.index, flow_id = %event.flow_id, event = event.kind.type_name(), "worker:orphan_event");
                        Ok(0)
                    }
                    ErrorClass::Transient => {
                        warn!(partition = self.index, flow_id = %event.flow_id, error = %e, "worker:redeliver");
                        self.redeliver_later(event.clone());
                        Ok(0)
                    }
                    ErrorClass::Fatal => Err(e.into()),
                };
            }
        };
        let published = records.len();
        for record in records {
            self.bus.publish(event.flow_id, record)?;
        }
        Ok(published)
    }

    fn redeliver_later(&self, event: FlowEvent) {
        let bus = self.bus.clone();
        let delay = self.engine
                        .config()
                        .processing_retry_delay
                        .to_std()
                        .unwrap_or(Duration::from_millis(100));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = bus.send(event) {
                warn!(error = %e, "worker:redeliver_dropped");
            }
        });
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<FlowEvent>) {
        debug!(partition = self.index, "worker:started");
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(&event) {
                error!(partition = self.index, flow_id = %event.flow_id, error = %e, "worker:event_failed");
            }
        }
        debug!(partition = self.index, "worker:stopped");
    }
}
