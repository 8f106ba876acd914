//! Chain module - read access to the L1/L2 pair the correlator watches
//!
//! This module provides:
//! - The `ChainClient` query capability the correlator polls through
//! - An ethers-backed multi-RPC provider with automatic failover
//! - Receipt polling and destination relay scanning

pub mod listener;
pub mod provider;
pub mod receipt;

pub use listener::RelayListener;
pub use provider::ChainProvider;
pub use receipt::wait_for_receipt;

use crate::config::{ChainConfig, ContractsConfig, Settings};
use crate::error::{CorrelatorError, CorrelatorResult};

use async_trait::async_trait;
use ethers::types::{Address, Filter, Log, Transaction, TransactionReceipt, H256};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Read-only query capability of one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Fetch a transaction by hash
    async fn get_transaction(&self, hash: H256) -> CorrelatorResult<Option<Transaction>>;

    /// Fetch a transaction receipt; `None` while the transaction is pending or unknown
    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> CorrelatorResult<Option<TransactionReceipt>>;

    /// Current head block number
    async fn get_block_number(&self) -> CorrelatorResult<u64>;

    /// Logs matching a filter, in block and log-index order
    async fn get_logs(&self, filter: &Filter) -> CorrelatorResult<Vec<Log>>;
}

/// One side of the rollup chain pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    L1,
    L2,
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::L1 => "l1",
            Layer::L2 => "l2",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which chain a correlated message originates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Deposit-type: origin is L1, relay lands on L2
    L1ToL2,
    /// Withdrawal-type: origin is L2, relay lands on L1
    L2ToL1,
}

impl Direction {
    pub fn origin(&self) -> Layer {
        match self {
            Direction::L1ToL2 => Layer::L1,
            Direction::L2ToL1 => Layer::L2,
        }
    }

    pub fn destination(&self) -> Layer {
        match self {
            Direction::L1ToL2 => Layer::L2,
            Direction::L2ToL1 => Layer::L1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::L1ToL2 => "l1-to-l2",
            Direction::L2ToL1 => "l2-to-l1",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown direction '{0}', expected l1-to-l2 or l2-to-l1")]
pub struct ParseDirectionError(String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l1-to-l2" | "deposit" => Ok(Direction::L1ToL2),
            "l2-to-l1" | "withdrawal" => Ok(Direction::L2ToL1),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

/// A chain client together with the messenger contract it filters on
#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    layer: Layer,
    chain_id: u64,
    client: Arc<dyn ChainClient>,
    messenger: Address,
}

impl ChainEndpoint {
    pub fn new(layer: Layer, chain_id: u64, client: Arc<dyn ChainClient>, messenger: Address) -> Self {
        Self {
            layer,
            chain_id,
            client,
            messenger,
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    pub fn messenger(&self) -> Address {
        self.messenger
    }

    /// Fetch a transaction that is known to exist
    pub async fn fetch_transaction(&self, tx_hash: H256) -> CorrelatorResult<Transaction> {
        self.client
            .get_transaction(tx_hash)
            .await?
            .ok_or(CorrelatorError::MissingTransaction {
                chain_id: self.chain_id,
                tx_hash,
            })
    }
}

/// Connections to both chains of the rollup pair
pub struct ChainManager {
    l1: Arc<ChainProvider>,
    l2: Arc<ChainProvider>,
    l1_messenger: Address,
    l2_messenger: Address,
}

impl ChainManager {
    /// Connect to both chains and resolve the messenger addresses
    pub async fn connect(settings: &Settings) -> CorrelatorResult<Self> {
        let l1 = Arc::new(ChainProvider::new(settings.l1.clone())?);
        let l2 = Arc::new(ChainProvider::new(settings.l2.clone())?);

        let l1_messenger =
            Self::resolve_messenger(&settings.l1, Layer::L1, &settings.contracts, &l1).await?;
        let l2_messenger =
            Self::resolve_messenger(&settings.l2, Layer::L2, &settings.contracts, &l1).await?;

        info!(
            "Messengers: {} {:?} on chain {}, {} {:?} on chain {}",
            Layer::L1,
            l1_messenger,
            settings.l1.chain_id,
            Layer::L2,
            l2_messenger,
            settings.l2.chain_id
        );

        Ok(Self {
            l1,
            l2,
            l1_messenger,
            l2_messenger,
        })
    }

    /// Explicit address, or a lookup through the L1 address manager
    async fn resolve_messenger(
        chain: &ChainConfig,
        layer: Layer,
        contracts: &ContractsConfig,
        l1: &ChainProvider,
    ) -> CorrelatorResult<Address> {
        if let Some(ref address) = chain.messenger_address {
            return Address::from_str(address).map_err(|e| {
                CorrelatorError::Config(format!(
                    "Invalid messenger address for {}: {}",
                    chain.name, e
                ))
            });
        }

        let manager = contracts.address_manager.as_deref().ok_or_else(|| {
            CorrelatorError::Config(format!(
                "Chain {} has neither messenger_address nor an address manager",
                chain.name
            ))
        })?;
        let manager = Address::from_str(manager)
            .map_err(|e| CorrelatorError::Config(format!("Invalid address manager: {}", e)))?;

        let name = chain
            .messenger_name
            .clone()
            .unwrap_or_else(|| contracts.default_messenger_name(layer).to_string());
        l1.resolve_address(manager, &name).await
    }

    pub fn provider(&self, layer: Layer) -> &Arc<ChainProvider> {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }

    /// Endpoint handed to the correlator for one layer
    pub fn endpoint(&self, layer: Layer) -> ChainEndpoint {
        let (provider, messenger) = match layer {
            Layer::L1 => (&self.l1, self.l1_messenger),
            Layer::L2 => (&self.l2, self.l2_messenger),
        };
        ChainEndpoint::new(
            layer,
            provider.chain_id(),
            provider.clone() as Arc<dyn ChainClient>,
            messenger,
        )
    }

    /// Health check for both chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let mut results = Vec::new();

        for provider in [&self.l1, &self.l2] {
            let chain_id = provider.chain_id();
            let healthy = provider.health_check().await;
            if !healthy {
                warn!("Chain {} health check failed", chain_id);
            }
            crate::metrics::record_chain_health(chain_id, healthy);
            results.push((chain_id, healthy));
        }

        results
    }
}
