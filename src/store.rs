//! Store de checkpoints en memoria compartido entre particiones.
//!
//! Cada flow vive en una única partición, así que dos workers nunca tocan la
//! misma entrada; el `DashMap` sólo evita un lock global.
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use flow_core::{CheckpointStore, CoreEngineError, FlowCheckpoint};

#[derive(Debug, Clone, Default)]
pub struct SharedCheckpointStore {
    map: Arc<DashMap<Uuid, FlowCheckpoint>>,
}

impl SharedCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl CheckpointStore for SharedCheckpointStore {
    fn load(&self, flow_id: Uuid) -> Result<Option<FlowCheckpoint>, CoreEngineError> {
        Ok(self.map.get(&flow_id).map(|cp| cp.value().clone()))
    }

    fn put(&mut self, checkpoint: &FlowCheckpoint) -> Result<(), CoreEngineError> {
        self.map.insert(checkpoint.flow_id, checkpoint.clone());
        Ok(())
    }

    fn delete(&mut self, flow_id: Uuid) -> Result<(), CoreEngineError> {
        self.map.remove(&flow_id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<FlowCheckpoint>, CoreEngineError> {
        Ok(self.map.iter().map(|e| e.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flow_core::checkpoint::FlowStartContext;

    #[test]
    fn clones_share_entries() {
        let mut a = SharedCheckpointStore::new();
        let b = a.clone();
        let start = FlowStartContext { flow_type: "delay".into(),
                                       arguments: serde_json::json!({}),
                                       initiated_by: None,
                                       started_at: Utc::now() };
        let cp = FlowCheckpoint::new(Uuid::new_v4(), "alice", start, 3);
        a.put(&cp).unwrap();
        assert_eq!(b.load(cp.flow_id).unwrap(), Some(cp.clone()));
        a.delete(cp.flow_id).unwrap();
        assert!(b.is_empty());
    }
}
