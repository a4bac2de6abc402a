//! Parámetros del pipeline.
//!
//! Se leen de variables de entorno con defaults; el binario carga antes el
//! `.env` (ver `flowline::config`).
use chrono::{DateTime, Duration, Utc};
use std::env;

use crate::constants::{DEFAULT_EXTERNAL_EVENT_RESEND_WINDOW_MS, DEFAULT_MAX_RETRIES, DEFAULT_PROCESSING_RETRY_DELAY_MS,
                       DEFAULT_SESSION_TIMEOUT_MS, MAX_CONFIG_DURATION_MS};
use crate::errors::CoreEngineError;

pub const ENV_RESEND_WINDOW_MS: &str = "FLOW_EXTERNAL_EVENT_RESEND_WINDOW_MS";
pub const ENV_MAX_RETRIES: &str = "FLOW_MAX_RETRIES";
pub const ENV_SESSION_TIMEOUT_MS: &str = "FLOW_SESSION_TIMEOUT_MS";
pub const ENV_PROCESSING_RETRY_DELAY_MS: &str = "FLOW_PROCESSING_RETRY_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Tiempo sin respuesta antes de reenviar una request externa.
    pub external_event_resend_window: Duration,
    /// Reenvíos externos y reintentos de procesamiento permitidos.
    pub max_retries: u32,
    /// Inactividad tras la cual una sesión esperada expira.
    pub session_timeout: Duration,
    /// Espera antes de reaplicar un evento que falló de forma transitoria.
    pub processing_retry_delay: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self { external_event_resend_window: Duration::milliseconds(DEFAULT_EXTERNAL_EVENT_RESEND_WINDOW_MS),
               max_retries: DEFAULT_MAX_RETRIES,
               session_timeout: Duration::milliseconds(DEFAULT_SESSION_TIMEOUT_MS),
               processing_retry_delay: Duration::milliseconds(DEFAULT_PROCESSING_RETRY_DELAY_MS) }
    }
}

impl FlowConfig {
    pub fn from_env() -> Result<Self, CoreEngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la config consultando `lookup` por cada clave; las ausentes
    /// toman el default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreEngineError>
        where F: Fn(&str) -> Option<String>
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Result<Duration, CoreEngineError> {
            match lookup(key) {
                Some(raw) => raw.trim()
                                .parse::<i64>()
                                .map_err(|e| CoreEngineError::InvalidConfig(format!("{key}={raw}: {e}")))
                                .and_then(|ms| {
                                    Duration::try_milliseconds(ms).ok_or_else(|| CoreEngineError::InvalidConfig(format!("{key}={raw}: out of range")))
                                }),
                None => Ok(default),
            }
        };
        let max_retries = match lookup(ENV_MAX_RETRIES) {
            Some(raw) => raw.trim()
                            .parse::<u32>()
                            .map_err(|e| CoreEngineError::InvalidConfig(format!("{ENV_MAX_RETRIES}={raw}: {e}")))?,
            None => defaults.max_retries,
        };
        let config = Self { external_event_resend_window: millis(ENV_RESEND_WINDOW_MS, defaults.external_event_resend_window)?,
                            max_retries,
                            session_timeout: millis(ENV_SESSION_TIMEOUT_MS, defaults.session_timeout)?,
                            processing_retry_delay: millis(ENV_PROCESSING_RETRY_DELAY_MS, defaults.processing_retry_delay)? };
        config.validate()?;
        Ok(config)
    }

    /// Las ventanas deben ser positivas (cada reenvío tiene que avanzar
    /// `send_timestamp`) y ninguna puede superar `MAX_CONFIG_DURATION_MS`.
    pub fn validate(&self) -> Result<(), CoreEngineError> {
        let max = Duration::milliseconds(MAX_CONFIG_DURATION_MS);
        for (name, value) in [("external event resend window", self.external_event_resend_window),
                              ("session timeout", self.session_timeout),
                              ("processing retry delay", self.processing_retry_delay)]
        {
            if value > max {
                return Err(CoreEngineError::InvalidConfig(format!("{name} must be <= {MAX_CONFIG_DURATION_MS} ms")));
            }
        }
        if self.external_event_resend_window <= Duration::zero() {
            return Err(CoreEngineError::InvalidConfig("external event resend window must be > 0".into()));
        }
        if self.session_timeout <= Duration::zero() {
            return Err(CoreEngineError::InvalidConfig("session timeout must be > 0".into()));
        }
        if self.processing_retry_delay < Duration::zero() {
            return Err(CoreEngineError::InvalidConfig("processing retry delay must be >= 0".into()));
        }
        Ok(())
    }
}

/// `from + after`, saturando en el máximo representable.
pub fn deadline_after(from: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    from.checked_add_signed(after).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = FlowConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, FlowConfig::default());
        assert_eq!(cfg.external_event_resend_window, Duration::minutes(5));
        assert_eq!(cfg.session_timeout, Duration::minutes(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = FlowConfig::from_lookup(lookup(&[(ENV_RESEND_WINDOW_MS, "1500"), (ENV_MAX_RETRIES, " 2 ")])).unwrap();
        assert_eq!(cfg.external_event_resend_window, Duration::milliseconds(1500));
        assert_eq!(cfg.max_retries, 2);
    }

    #[test]
    fn zero_resend_window_is_rejected() {
        let err = FlowConfig::from_lookup(lookup(&[(ENV_RESEND_WINDOW_MS, "0")])).unwrap_err();
        assert!(matches!(err, CoreEngineError::InvalidConfig(_)));
        assert!(FlowConfig::from_lookup(lookup(&[(ENV_MAX_RETRIES, "many")])).is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let year_and_a_day = (MAX_CONFIG_DURATION_MS + 86_400_000).to_string();
        let err = FlowConfig::from_lookup(lookup(&[(ENV_SESSION_TIMEOUT_MS, year_and_a_day.as_str())])).unwrap_err();
        assert!(err.to_string().contains("session timeout must be <="));
        let err = FlowConfig::from_lookup(lookup(&[(ENV_PROCESSING_RETRY_DELAY_MS, i64::MIN.to_string().as_str())])).unwrap_err();
        assert!(matches!(err, CoreEngineError::InvalidConfig(_)));

        let cfg = FlowConfig { session_timeout: Duration::MAX,
                               ..FlowConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deadlines_saturate_instead_of_overflowing() {
        let now = chrono::Utc::now();
        assert_eq!(deadline_after(now, Duration::seconds(1)), now + Duration::seconds(1));
        assert_eq!(deadline_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
