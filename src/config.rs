//! Configuration management for the cross-domain watcher
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::Layer;
use crate::events::MessageLogSchema;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "XDOMAIN_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub correlator: CorrelatorConfig,
    #[serde(default)]
    pub schema: MessageLogSchema,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    pub l1: ChainConfig,
    pub l2: ChainConfig,
}

/// Polling and deadline policy for every correlation
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Delay between two queries of the same chain
    pub poll_interval_ms: u64,
    /// Overall budget of one correlation, from call to relayed receipt
    pub deadline_ms: u64,
    /// How far behind the destination head the first relay scan starts
    pub lookback_blocks: u64,
    /// Largest block span requested in a single `eth_getLogs`
    pub max_block_range: u64,
    /// Blocks below the last scanned height queried again on every relay scan
    ///
    /// Covers endpoints that lag behind the head they report and relays
    /// re-mined at a lower height after a reorg.
    pub rescan_blocks: u64,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            deadline_ms: 300_000,
            lookback_blocks: 10_000,
            max_block_range: 1_000,
            rescan_blocks: 32,
        }
    }
}

impl CorrelatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        if self.deadline_ms < self.poll_interval_ms {
            anyhow::bail!(
                "deadline_ms ({}) is shorter than poll_interval_ms ({})",
                self.deadline_ms,
                self.poll_interval_ms
            );
        }
        if self.max_block_range == 0 {
            anyhow::bail!("max_block_range must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Address resolution through `Lib_AddressManager` on L1
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContractsConfig {
    pub address_manager: Option<String>,
}

impl ContractsConfig {
    /// Registry name of the messenger when a chain does not override it
    pub fn default_messenger_name(&self, layer: Layer) -> &'static str {
        match layer {
            Layer::L1 => "Proxy__OVM_L1CrossDomainMessenger",
            Layer::L2 => "OVM_L2CrossDomainMessenger",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub messenger_address: Option<String>,
    pub messenger_name: Option<String>,
}

impl Settings {
    /// Load settings from an explicit path, `XDOMAIN_CONFIG`, or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.correlator.validate()?;

        if self.l1.chain_id == self.l2.chain_id {
            anyhow::bail!(
                "L1 and L2 share chain id {}; the pair must be distinct",
                self.l1.chain_id
            );
        }

        for chain in [&self.l1, &self.l2] {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", chain.name);
            }
            if chain.messenger_address.is_none() && self.contracts.address_manager.is_none() {
                anyhow::bail!(
                    "Chain {} needs messenger_address or contracts.address_manager",
                    chain.name
                );
            }
        }

        Ok(())
    }

    /// Get chain config by layer
    pub fn chain(&self, layer: Layer) -> &ChainConfig {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures<'_>| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
