//! Configuration module for payrisk-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{BusSettings, RuntimeConfig, StoreSettings, WorkerSettings};
use payrisk_core::risk::RiskLimits;
use payrisk_core::utils::backoff::RetryPolicy;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_from_str(&config_content)
    }

    fn load_from_str(&self, config_content: &str) -> Result<RuntimeConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_runtime_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.bus.partitions == 0 {
        return Err(ConfigError::ValidationError(
            "bus.partitions must be greater than zero".to_string(),
        ));
    }
    for (name, topic) in [
        ("bus.request_topic", &config.bus.request_topic),
        ("bus.response_topic", &config.bus.response_topic),
        ("bus.request_group", &config.bus.request_group),
        ("bus.response_group", &config.bus.response_group),
    ] {
        if topic.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{name} must not be empty")));
        }
    }
    if config.bus.request_topic == config.bus.response_topic {
        return Err(ConfigError::ValidationError(
            "bus.request_topic and bus.response_topic must differ".to_string(),
        ));
    }

    let risk = &config.risk;
    if risk.per_transaction_ceiling <= Decimal::ZERO || risk.daily_ceiling <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "risk ceilings must be positive".to_string(),
        ));
    }
    if risk.per_transaction_ceiling > risk.daily_ceiling {
        return Err(ConfigError::ValidationError(format!(
            "risk.per_transaction_ceiling ({}) exceeds risk.daily_ceiling ({})",
            risk.per_transaction_ceiling, risk.daily_ceiling
        )));
    }

    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        return Err(ConfigError::ValidationError(
            "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
        ));
    }
    if config.store.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn build_runtime_config(file_config: FileConfig) -> RuntimeConfig {
    RuntimeConfig {
        listen: file_config.server.listen,
        bus: BusSettings {
            partitions: file_config.bus.partitions,
            request_topic: file_config.bus.request_topic,
            response_topic: file_config.bus.response_topic,
            request_group: file_config.bus.request_group,
            response_group: file_config.bus.response_group,
        },
        limits: RiskLimits {
            per_transaction_ceiling: file_config.risk.per_transaction_ceiling,
            daily_ceiling: file_config.risk.daily_ceiling,
        },
        retry: RetryPolicy::new(
            Duration::from_millis(file_config.retry.initial_backoff_ms),
            Duration::from_millis(file_config.retry.max_backoff_ms),
        ),
        store: StoreSettings {
            backend: file_config.store.backend,
            max_connections: file_config.store.max_connections,
        },
        workers: WorkerSettings {
            decision_engine: file_config.workers.decision_engine,
            correlator: file_config.workers.correlator,
        },
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
