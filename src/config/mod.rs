//! Service configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) yields a runnable development setup. Command
//! line flags override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{NetworkParams, DEFAULT_REWARD_SPEND_MIN_BLOCKS, NATIVE_TOKEN_UID};
use crate::wallet::{WalletSettings, DEFAULT_RESERVATION_TTL_SECS};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_NETWORK: &str = "testnet";
pub const DEFAULT_OP_LOCK_STALE_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Output minted to `address` when the development ledger starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    pub address: String,
    #[serde(default = "native_token")]
    pub token: String,
    pub amount: u64,
}

fn native_token() -> String {
    NATIVE_TOKEN_UID.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    pub network: String,
    /// Base URL of the proposal mediator
    pub mediator_url: Option<String>,
    /// Feature toggle for the mediator endpoints
    pub swap_service_enabled: bool,
    /// Reservation lifetime for built-but-unsent transactions; `None` keeps
    /// them until released
    pub utxo_lock_ttl_secs: Option<u64>,
    pub op_lock_stale_secs: u64,
    pub reward_spend_min_blocks: u64,
    pub genesis: Vec<GenesisAllocation>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            network: DEFAULT_NETWORK.to_string(),
            mediator_url: None,
            swap_service_enabled: false,
            utxo_lock_ttl_secs: Some(DEFAULT_RESERVATION_TTL_SECS),
            op_lock_stale_secs: DEFAULT_OP_LOCK_STALE_SECS,
            reward_spend_min_blocks: DEFAULT_REWARD_SPEND_MIN_BLOCKS,
            genesis: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Read `path`, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config: ServiceConfig = serde_json::from_str(&raw)?;
                log::info!("Loaded config from {}", path.display());
                config
            }
            None => ServiceConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.trim().is_empty() {
            return Err(ConfigError::Invalid("network must not be empty".into()));
        }
        if self.op_lock_stale_secs == 0 {
            return Err(ConfigError::Invalid(
                "op_lock_stale_secs must be positive".into(),
            ));
        }
        if self.utxo_lock_ttl_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "utxo_lock_ttl_secs must be positive".into(),
            ));
        }
        if let Some(entry) = self.genesis.iter().find(|g| g.amount == 0) {
            return Err(ConfigError::Invalid(format!(
                "genesis allocation to {} has no amount",
                entry.address
            )));
        }
        Ok(())
    }

    pub fn network_params(&self) -> NetworkParams {
        NetworkParams {
            name: self.network.clone(),
            reward_spend_min_blocks: self.reward_spend_min_blocks,
        }
    }

    pub fn wallet_settings(&self) -> WalletSettings {
        WalletSettings {
            stale_after: Duration::from_secs(self.op_lock_stale_secs),
            reservation_ttl: self.utxo_lock_ttl_secs.map(Duration::from_secs),
        }
    }

    /// The mediator endpoints only work with both the toggle and a URL
    pub fn swap_service_active(&self) -> bool {
        self.swap_service_enabled && self.mediator_url.is_some()
    }
}
