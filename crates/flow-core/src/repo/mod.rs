//! Almacenamiento de checkpoints.
//!
//! El pipeline no persiste nada: el `FlowEngine` carga el checkpoint, procesa
//! y guarda (o borra) el resultado a través de esta interfaz. Hay una
//! implementación en memoria aquí y una Postgres en `flow-persistence`.
use std::collections::HashMap;
use uuid::Uuid;

use crate::checkpoint::FlowCheckpoint;
use crate::errors::CoreEngineError;

pub trait CheckpointStore {
    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>, CoreEngineError>;
    /// Inserta o reemplaza el checkpoint del flow.
    fn put(&mut self, checkpoint: &FlowCheckpoint) -> Result<(), CoreEngineError>;
    /// Borrar un flow inexistente no es error.
    fn delete(&mut self, flow_id: Uuid) -> Result<(), CoreEngineError>;
    fn list(&self) -> Result<Vec<FlowCheckpoint>, CoreEngineError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointStore {
    inner: HashMap<Uuid, FlowCheckpoint>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>, CoreEngineError> {
        Ok(self.inner.get(&flow_id).cloned())
    }

    fn put(&mut self, checkpoint: &FlowCheckpoint) -> Result<(), CoreEngineError> {
        self.inner.insert(checkpoint.flow_id, checkpoint.clone());
        Ok(())
    }

    fn delete(&mut self, flow_id: Uuid) -> Result<(), CoreEngineError> {
        self.inner.remove(&flow_id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<FlowCheckpoint>, CoreEngineError> {
        let mut all: Vec<FlowCheckpoint> = self.inner.values().cloned().collect();
        all.sort_by_key(|cp| cp.start_context.started_at);
        Ok(all)
    }
}
