use std::{sync::Arc, time::Duration};

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::utils::logger::TracingMode;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NetworkConf {
    /// Boundary node or local replica serving the HTTP API.
    pub url: String,
    /// Hex DER of the network root key. Takes precedence over `fetch_root_key`.
    pub root_key: Option<String>,
    /// Ask the replica for its root key at startup. Only sound against a local replica.
    pub fetch_root_key: bool,
    pub ingress_expiry_secs: u64,
    pub max_certificate_age_secs: u64,
}

impl NetworkConf {
    pub fn ingress_expiry(&self) -> Duration {
        Duration::from_secs(self.ingress_expiry_secs)
    }

    pub fn max_certificate_age(&self) -> Duration {
        Duration::from_secs(self.max_certificate_age_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PollingConf {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    pub max_attempts: Option<u32>,
    pub timeout_ms: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BackendConf {
    pub url: String,
}

pub type SharedConf = Arc<Conf>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conf {
    pub network: NetworkConf,
    pub polling: PollingConf,
    pub backend: BackendConf,
    pub log_format: TracingMode,
}

impl Conf {
    pub fn new(config_file: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("network.url", "https://icp-api.io/")?
            .set_default("network.fetch_root_key", false)?
            .set_default("network.ingress_expiry_secs", 240_i64)?
            .set_default("network.max_certificate_age_secs", 300_i64)?
            .set_default("polling.initial_interval_ms", 500_i64)?
            .set_default("polling.multiplier", 1.4_f64)?
            .set_default("polling.max_interval_ms", 1_000_i64)?
            .set_default("polling.timeout_ms", 300_000_i64)?
            .set_default("backend.url", "http://localhost:3000/")?
            .set_default("log_format", "full")?;

        // Priority order: defaults, then config file, then environment variables
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::with_name(config_file.as_str()).required(false));
        }
        let s = builder
            .add_source(Environment::with_prefix("linkcart").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn new_shared(config_file: Option<String>) -> Result<SharedConf, ConfigError> {
        Self::new(config_file).map(Arc::new)
    }
}
