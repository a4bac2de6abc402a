//! Arma el runtime: bus, un worker por partición y los subsistemas.
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use flow_core::{CheckpointStore, FlowEngine, FlowRegistry, FlowStatusUpdate};

use crate::bus::FlowBus;
use crate::config::AppConfig;
use crate::errors::CoreError;
use crate::subsystems::Subsystems;
use crate::worker::PartitionWorker;

pub struct FlowRuntime {
    bus: FlowBus,
    subsystems: Subsystems,
    handles: Vec<JoinHandle<()>>,
}

impl FlowRuntime {
    /// Lanza las tareas. `make_store(i)` da el store de la partición `i`.
    /// Requiere un runtime de tokio activo.
    pub fn start<S, F>(config: &AppConfig, registry: FlowRegistry, mut make_store: F) -> Result<Self, CoreError>
        where S: CheckpointStore + Send + 'static,
              F: FnMut(usize) -> Result<S, CoreError>
    {
        let (bus, receivers) = FlowBus::new(config.partitions, Arc::new(registry.clone()));
        let mut handles = Vec::with_capacity(config.partitions + 1);
        for (index, rx) in receivers.partitions.into_iter().enumerate() {
            let engine = FlowEngine::builder(make_store(index)?).flows(registry.clone())
                                                                .config(config.flow.clone())
                                                                .build()?;
            let worker = PartitionWorker::new(index, engine, bus.clone());
            handles.push(tokio::spawn(worker.run(rx)));
        }
        let subsystems = Subsystems::new(&config.signing_key);
        handles.push(tokio::spawn(subsystems.clone().run(receivers.external, bus.clone())));
        info!(partitions = config.partitions, flows = ?registry.flow_types(), "runtime:started");
        Ok(Self { bus,
                  subsystems,
                  handles })
    }

    pub fn start_flow(&self, identity: &str, flow_type: &str, arguments: serde_json::Value) -> Result<Uuid, CoreError> {
        self.bus.start_flow(identity, flow_type, arguments)
    }

    /// Suscripción a los `FlowStatusUpdate`. Suscribirse antes de arrancar
    /// flows para no perder su RUNNING.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowStatusUpdate> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &FlowBus {
        &self.bus
    }

    pub fn subsystems(&self) -> &Subsystems {
        &self.subsystems
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        info!("runtime:stopped");
    }
}
