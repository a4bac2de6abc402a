//! Core FlowEngine implementation

use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

use crate::checkpoint::FlowCheckpoint;
use crate::config::FlowConfig;
use crate::engine::EngineBuilder;
use crate::errors::CoreEngineError;
use crate::event::{FlowEvent, OutboundRecord};
use crate::pipeline::{FlowEventPipeline, PipelineOutput};
use crate::repo::{CheckpointStore, InMemoryCheckpointStore};
use crate::runner::{FlowRegistry, ReplayFlowRunner};
use crate::waiting::WaitingForRegistry;

/// Motor de flows durables
///
/// Envuelve el pipeline con la carga y persistencia del checkpoint. Un
/// engine por partición: el bus garantiza que los eventos de un flow llegan
/// siempre al mismo, en orden.
#[derive(Debug)]
pub struct FlowEngine<S>
    where S: CheckpointStore
{
    store: S,
    pipeline: FlowEventPipeline,
    registry: Arc<FlowRegistry>,
}

impl<S> FlowEngine<S>
    where S: CheckpointStore
{
    /// Crea un nuevo builder para configurar el engine
    #[inline]
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder::new(store)
    }

    pub(crate) fn from_parts(store: S, registry: FlowRegistry, waiting: WaitingForRegistry, config: FlowConfig) -> Self {
        let registry = Arc::new(registry);
        let runner = Arc::new(ReplayFlowRunner::new(registry.as_ref().clone()));
        Self { store,
               pipeline: FlowEventPipeline::new(runner, waiting, config),
               registry }
    }

    /// Aplica un evento: carga el checkpoint, lo procesa y guarda el
    /// resultado. Devuelve los records a publicar.
    pub fn process(&mut self, event: &FlowEvent) -> Result<Vec<OutboundRecord>, CoreEngineError> {
        let existing = self.store.load(event.flow_id)?;
        let existed = existing.is_some();
        let PipelineOutput { checkpoint, records } = self.pipeline.process(existing, event)?;
        match &checkpoint {
            Some(cp) => self.store.put(cp)?,
            None if existed => self.store.delete(event.flow_id)?,
            None => {}
        }
        if checkpoint.is_none() {
            info!("engine:flow_finished flow_id={} records={}", event.flow_id, records.len());
        } else {
            debug!("engine:processed flow_id={} event={} records={}",
                   event.flow_id,
                   event.kind.type_name(),
                   records.len());
        }
        Ok(records)
    }

    pub fn checkpoint(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>, CoreEngineError> {
        self.store.load(flow_id)
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.registry
    }

    pub fn config(&self) -> &FlowConfig {
        self.pipeline.config()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

impl FlowEngine<InMemoryCheckpointStore> {
    /// Builder con store en memoria
    #[inline]
    pub fn in_memory() -> EngineBuilder<InMemoryCheckpointStore> {
        EngineBuilder::new(InMemoryCheckpointStore::new())
    }
}
