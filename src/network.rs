use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use linkcart_crypto::RootKey;
use tracing::{info, warn};

use crate::agent::HttpAgent;
use crate::utils::conf::NetworkConf;
use crate::utils::logger::LogMe;

pub type SharedNetwork = Arc<NetworkContext>;

/// Trust anchor of every certificate check. Loaded once and shared read-only.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub root_key: RootKey,
    pub max_certificate_age: Duration,
}

impl NetworkContext {
    pub fn new(root_key: RootKey, max_certificate_age: Duration) -> Self {
        NetworkContext {
            root_key,
            max_certificate_age,
        }
    }

    pub async fn from_conf(conf: &NetworkConf, agent: &HttpAgent) -> Result<SharedNetwork> {
        let root_key = match (&conf.root_key, conf.fetch_root_key) {
            (Some(hex), _) => {
                RootKey::from_hex(hex).context("loading network.root_key from configuration")?
            }
            (None, true) => {
                warn!(
                    "Trusting the root key served by {}, only do this against a local replica",
                    agent.url
                );
                agent
                    .fetch_root_key()
                    .await
                    .log_error("Fetching the network root key")?
            }
            (None, false) => {
                bail!(
                    "No root key configured: set network.root_key, or network.fetch_root_key for a local replica"
                )
            }
        };
        info!("Network root key loaded: {:?}", root_key);
        Ok(Arc::new(NetworkContext::new(
            root_key,
            conf.max_certificate_age(),
        )))
    }
}
