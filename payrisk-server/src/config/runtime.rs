//! Validated configuration as used at runtime.

use crate::config::file::StoreBackend;
use payrisk_core::risk::RiskLimits;
use payrisk_core::utils::backoff::RetryPolicy;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: SocketAddr,
    pub bus: BusSettings,
    pub limits: RiskLimits,
    pub retry: RetryPolicy,
    pub store: StoreSettings,
    pub workers: WorkerSettings,
}

#[derive(Debug, Clone)]
pub struct BusSettings {
    pub partitions: usize,
    pub request_topic: String,
    pub response_topic: String,
    pub request_group: String,
    pub response_group: String,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub decision_engine: bool,
    pub correlator: bool,
}
