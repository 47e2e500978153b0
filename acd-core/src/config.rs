use std::env;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::variant::FormulaVariant;

const DEFAULT_PREFIX: &str = "ACD_";
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Configuration shared by the engine runtime and the CLI.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub environment: Environment,
    pub tick_interval: Duration,
    pub default_variant: FormulaVariant,
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            default_variant: FormulaVariant::default(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix(DEFAULT_PREFIX)
    }

    /// Loads configuration from env vars prefixed with the provided value (e.g. `ACD_`).
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = read_var(&key("ENV"))?
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let tick_key = key("TICK_INTERVAL_MS");
        let tick_interval = match read_var(&tick_key)? {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: tick_key,
                        value: raw,
                    })
                }
            },
            None => Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        };

        let variant_key = key("DEFAULT_VARIANT");
        let default_variant = match read_var(&variant_key)? {
            Some(raw) => raw
                .parse::<FormulaVariant>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: variant_key,
                    value: raw,
                })?,
            None => FormulaVariant::default(),
        };

        let log_level =
            read_var(&key("LOG_LEVEL"))?.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            environment,
            tick_interval,
            default_variant,
            log_level,
        })
    }

    /// Whether the process is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

fn read_var(key: &str) -> Result<Option<String>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::Unreadable {
            key: key.to_string(),
            source,
        }),
    }
}
