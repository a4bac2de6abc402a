//! Flowline
//!
//! Runtime en proceso para el motor de flows durables de `flow-core`:
//! - `bus`: particiones por flow, ruteo de sesiones entre identidades y
//!   timers de `Wakeup`.
//! - `worker`: un `FlowEngine` por partición.
//! - `subsystems`: firma, persistencia y verificación de demostración.
//! - `store`: store de checkpoints en memoria compartido.
//! - `config` y `errors`: configuración desde .env y errores de aplicación.

pub mod bus;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod store;
pub mod subsystems;
pub mod worker;

pub use bus::FlowBus;
pub use config::AppConfig;
pub use errors::CoreError;
pub use runtime::FlowRuntime;
pub use store::SharedCheckpointStore;
pub use subsystems::Subsystems;
