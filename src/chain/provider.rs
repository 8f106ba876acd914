//! Chain provider with multi-RPC support and automatic failover

use super::ChainClient;
use crate::config::ChainConfig;
use crate::error::{CorrelatorError, CorrelatorResult};
use crate::events::function_selector;

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

/// Multi-provider wrapper with automatic failover
#[derive(Debug)]
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> CorrelatorResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(CorrelatorError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        info!(
            "Chain {} ({}) using {} RPC endpoint(s)",
            config.name,
            config.chain_id,
            http_providers.len()
        );

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    fn all_failed(&self, what: &str) -> CorrelatorError {
        CorrelatorError::ChainConnection {
            chain_id: self.config.chain_id,
            message: format!("All providers failed to {}", what),
        }
    }

    /// Submit a signed transaction to the active provider, returning its hash
    ///
    /// Rejections (nonce already used, intrinsic gas too low, ...) are returned
    /// as-is and never retried against another endpoint.
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ProviderError> {
        let pending = self.http().send_raw_transaction(raw).await?;
        let tx_hash = pending.tx_hash();
        info!("Transaction {:?} accepted by chain {}", tx_hash, self.config.chain_id);
        Ok(tx_hash)
    }

    /// Look up a contract address in a `Lib_AddressManager` registry
    pub async fn resolve_address(&self, manager: Address, name: &str) -> CorrelatorResult<Address> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(manager)
            .data(address_lookup_calldata(name))
            .into();

        let output = self.http().call(&tx, None).await.map_err(|e| {
            CorrelatorError::ChainConnection {
                chain_id: self.config.chain_id,
                message: format!("getAddress({}) failed: {}", name, e),
            }
        })?;

        let address = match abi::decode(&[ParamType::Address], &output) {
            Ok(tokens) => match tokens.into_iter().next() {
                Some(Token::Address(address)) => address,
                _ => Address::zero(),
            },
            Err(e) => {
                return Err(CorrelatorError::Config(format!(
                    "Address manager returned malformed data for {}: {}",
                    name, e
                )))
            }
        };

        if address.is_zero() {
            return Err(CorrelatorError::Config(format!(
                "Address manager has no entry for {}",
                name
            )));
        }

        debug!("Resolved {} to {:?}", name, address);
        Ok(address)
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for chain {}: {}", self.config.chain_id, e);
                false
            }
        }
    }

    /// Get chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    async fn get_transaction(&self, hash: H256) -> CorrelatorResult<Option<Transaction>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_transaction(hash).await {
                Ok(tx) => return Ok(tx),
                Err(e) => {
                    warn!(
                        "Failed to get transaction {:?} from chain {}: {}",
                        hash, self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get transaction"))
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> CorrelatorResult<Option<TransactionReceipt>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_transaction_receipt(hash).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    warn!(
                        "Failed to get receipt {:?} from chain {}: {}",
                        hash, self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get receipt"))
    }

    async fn get_block_number(&self) -> CorrelatorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get block number"))
    }

    async fn get_logs(&self, filter: &Filter) -> CorrelatorResult<Vec<Log>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_logs(filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!("Failed to get logs from chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get logs"))
    }
}

/// Calldata for `getAddress(string)`
fn address_lookup_calldata(name: &str) -> Bytes {
    let mut data = function_selector("getAddress(string)").to_vec();
    data.extend(abi::encode(&[Token::String(name.to_string())]));
    data.into()
}
