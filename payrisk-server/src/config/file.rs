//! TOML file configuration structures.
//!
//! These structs directly map to the `payrisk-config.toml` file format.
//! Every section is optional; an empty file yields the defaults.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Message bus topics and consumer groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Partitions per topic.
    pub partitions: usize,
    pub request_topic: String,
    pub response_topic: String,
    /// Consumer group of the decision engine.
    pub request_group: String,
    /// Consumer group of the response correlator.
    pub response_group: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            request_topic: "risk-evaluation-request".to_string(),
            response_topic: "risk-evaluation-response".to_string(),
            request_group: "risk-simulator-group".to_string(),
            response_group: "payment-api-response-consumer".to_string(),
        }
    }
}

/// Evaluation ceilings, in payment currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub per_transaction_ceiling: rust_decimal::Decimal,
    pub daily_ceiling: rust_decimal::Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            per_transaction_ceiling: rust_decimal::Decimal::from(2000),
            daily_ceiling: rust_decimal::Decimal::from(5000),
        }
    }
}

/// Backoff for failed message handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

/// Operation store section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Pool size when `backend = "postgres"`.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            max_connections: 10,
        }
    }
}

/// Which bus consumers run in this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub decision_engine: bool,
    pub correlator: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            decision_engine: true,
            correlator: true,
        }
    }
}
