use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Days searched backwards for an FX observation.
    pub fx_lookback_days: u64,
    /// Deadline for one oracle resolution, in milliseconds.
    pub fx_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let fx_lookback_days = env_map
            .get("FX_LOOKBACK_DAYS")
            .map(|s| s.as_str())
            .unwrap_or("10")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "FX_LOOKBACK_DAYS".to_string(),
                    "must be a non-negative integer".to_string(),
                )
            })?;

        let fx_timeout_ms = env_map
            .get("FX_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("5000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "FX_TIMEOUT_MS".to_string(),
                    "must be a non-negative integer".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            fx_lookback_days,
            fx_timeout_ms,
        })
    }
}
