//! Constantes del motor core.
//!
//! Valores estáticos que participan en el formato persistido del checkpoint y
//! en el journal de continuación. Cambiarlos invalida checkpoints existentes
//! (el runner rechaza snapshots de otra versión).

/// Versión lógica del motor; viaja en los `FlowStatusUpdate`.
pub const ENGINE_VERSION: &str = "F1.0";

/// Versión del formato de `FlowCheckpoint`.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Versión del snapshot de continuación (journal de reanudaciones).
pub const CONTINUATION_VERSION: u32 = 1;

/// Topics de salida. El bus real los define el colaborador; aquí sólo se fija
/// el nombre lógico que acompaña a cada `OutboundRecord`.
pub const FLOW_EVENT_TOPIC: &str = "flow.event";
pub const FLOW_SESSION_OUT_TOPIC: &str = "flow.session.out";
pub const FLOW_STATUS_TOPIC: &str = "flow.status";
pub const FLOW_WAKEUP_TOPIC: &str = "flow.wakeup";
pub const SIGNING_REQUEST_TOPIC: &str = "crypto.signing.request";
pub const PERSISTENCE_REQUEST_TOPIC: &str = "persistence.request";
pub const VERIFICATION_REQUEST_TOPIC: &str = "verification.request";

/// Defaults de `FlowConfig`.
pub const DEFAULT_EXTERNAL_EVENT_RESEND_WINDOW_MS: i64 = 300_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 1_800_000;
pub const DEFAULT_PROCESSING_RETRY_DELAY_MS: i64 = 1_000;

/// Tope de cualquier duración de `FlowConfig` (365 días).
pub const MAX_CONFIG_DURATION_MS: i64 = 365 * 24 * 60 * 60 * 1_000;
