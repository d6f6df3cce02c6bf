use std::collections::HashMap;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: IpAddr,
    pub database_path: String,
    /// Upper bound on one recompute cycle, in milliseconds.
    pub recompute_timeout_ms: u64,
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

        let bind_addr = env_map
            .get("BIND_ADDR")
            .map(|s| s.as_str())
            .unwrap_or("127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "BIND_ADDR".to_string(),
                    "must be a valid IP address".to_string(),
                )
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let recompute_timeout_ms = match env_map
            .get("RECOMPUTE_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("30000")
            .parse::<u64>()
        {
            Ok(ms) if ms > 0 => ms,
            _ => {
                return Err(ConfigError::InvalidValue(
                    "RECOMPUTE_TIMEOUT_MS".to_string(),
                    "must be a positive integer".to_string(),
                ))
            }
        };

        Ok(Config {
            port,
            bind_addr,
            database_path,
            recompute_timeout_ms,
        })
    }
}
