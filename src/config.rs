//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) una sola vez y arma `AppConfig`: los
//! parámetros del pipeline (`FlowConfig`) más los del runtime.
use once_cell::sync::Lazy;
use std::env;

use flow_core::FlowConfig;

use crate::errors::CoreError;

pub const ENV_PARTITIONS: &str = "FLOWLINE_PARTITIONS";
pub const ENV_SIGNING_KEY: &str = "FLOWLINE_SIGNING_KEY";

const DEFAULT_PARTITIONS: usize = 4;
const DEFAULT_SIGNING_KEY: &str = "flowline-dev-key";

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

/// Configuración global de la aplicación.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Parámetros del pipeline (reenvíos, timeouts, reintentos).
    pub flow: FlowConfig,
    /// Particiones del bus; cada una tiene su worker y su engine.
    pub partitions: usize,
    /// Con `DATABASE_URL` el binario puede usar Postgres como store.
    pub database_url: Option<String>,
    /// Clave del firmante de demostración.
    pub signing_key: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
        where F: Fn(&str) -> Option<String>
    {
        let flow = FlowConfig::from_lookup(&lookup)?;
        let partitions = match lookup(ENV_PARTITIONS) {
            Some(raw) => raw.parse::<usize>()
                            .map_err(|e| CoreError::Config(format!("{ENV_PARTITIONS}={raw}: {e}")))?,
            None => DEFAULT_PARTITIONS,
        };
        if partitions == 0 {
            return Err(CoreError::Config(format!("{ENV_PARTITIONS} debe ser > 0")));
        }
        Ok(Self { flow,
                  partitions,
                  database_url: lookup("DATABASE_URL"),
                  signing_key: lookup(ENV_SIGNING_KEY).unwrap_or_else(|| DEFAULT_SIGNING_KEY.to_string()) })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { flow: FlowConfig::default(),
               partitions: DEFAULT_PARTITIONS,
               database_url: None,
               signing_key: DEFAULT_SIGNING_KEY.to_string() }
    }
}
