//! Destination-chain relay listener with block-range polling

use super::ChainEndpoint;
use crate::config::CorrelatorConfig;
use crate::error::CorrelatorResult;
use crate::events::{self, MessageHash, MessageLogSchema};

use ethers::types::{Filter, TransactionReceipt, H256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Scans the destination messenger's relay logs and indexes them by message hash
///
/// The first scan starts `lookback_blocks` behind the head. Later scans cover
/// the blocks that appeared since, plus the last `rescan_blocks` already
/// scanned, so a relay missed by a lagging endpoint or moved by a reorg is
/// picked up again. One listener serves every message of a single
/// correlation, so relays seen while waiting for an earlier message are still
/// found when a later one is awaited.
#[derive(Debug)]
pub struct RelayListener {
    endpoint: ChainEndpoint,
    schema: MessageLogSchema,
    lookback_blocks: u64,
    max_block_range: u64,
    rescan_blocks: u64,
    /// Lowest block ever scanned; rescans never go below it
    first_block: u64,
    /// Next block to scan; `None` before the first scan
    next_block: Option<u64>,
    /// Relays observed so far: message hash -> relaying transaction
    observed: HashMap<MessageHash, H256>,
}

impl RelayListener {
    /// Create a new relay listener
    pub fn new(endpoint: ChainEndpoint, schema: MessageLogSchema, config: &CorrelatorConfig) -> Self {
        Self {
            endpoint,
            schema,
            lookback_blocks: config.lookback_blocks,
            max_block_range: config.max_block_range.max(1),
            rescan_blocks: config.rescan_blocks,
            first_block: 0,
            next_block: None,
            observed: HashMap::new(),
        }
    }

    /// Scan blocks that appeared since the last scan, plus the rescan window
    ///
    /// Returns the number of relays newly indexed or moved to another
    /// transaction. Progress is kept per chunk, so a failed query only repeats
    /// the chunk that failed.
    pub async fn poll(&mut self) -> CorrelatorResult<usize> {
        let head = self.endpoint.client().get_block_number().await?;
        let mut from_block = match self.next_block {
            Some(next) => std::cmp::max(
                self.first_block,
                next.saturating_sub(self.rescan_blocks),
            ),
            None => {
                self.first_block = head.saturating_sub(self.lookback_blocks);
                self.first_block
            }
        };
        let mut indexed = 0;

        crate::metrics::record_destination_poll(self.endpoint.layer());

        while from_block <= head {
            let to_block = std::cmp::min(head, from_block.saturating_add(self.max_block_range - 1));

            debug!(
                "Chain {}: scanning relays in blocks {} to {}",
                self.endpoint.chain_id(),
                from_block,
                to_block
            );

            let filter = Filter::new()
                .address(self.endpoint.messenger())
                .topic0(self.schema.relay_topic())
                .from_block(from_block)
                .to_block(to_block);

            let logs = self.endpoint.client().get_logs(&filter).await?;
            for log in logs {
                let Some(tx_hash) = log.transaction_hash else {
                    continue;
                };
                if let Some(message_hash) =
                    events::relay_message_hash(&log, self.endpoint.messenger(), &self.schema)
                {
                    // The latest scan reflects the canonical chain
                    if self.observed.insert(message_hash, tx_hash) != Some(tx_hash) {
                        indexed += 1;
                    }
                }
            }

            from_block = to_block + 1;
            self.next_block = Some(std::cmp::max(self.next_block.unwrap_or(0), from_block));
        }

        Ok(indexed)
    }

    /// Receipt of an already observed relay of `message_hash`
    ///
    /// A relay whose receipt no longer carries the message (reorged out) is
    /// forgotten so a later relay can replace it.
    pub async fn lookup(
        &mut self,
        message_hash: MessageHash,
    ) -> CorrelatorResult<Option<TransactionReceipt>> {
        let Some(&tx_hash) = self.observed.get(&message_hash) else {
            return Ok(None);
        };

        match self.endpoint.client().get_transaction_receipt(tx_hash).await? {
            Some(receipt)
                if events::receipt_relays(
                    &receipt,
                    self.endpoint.messenger(),
                    message_hash,
                    &self.schema,
                ) =>
            {
                Ok(Some(receipt))
            }
            Some(_) => {
                warn!(
                    "Receipt of {:?} on chain {} no longer relays {}",
                    tx_hash,
                    self.endpoint.chain_id(),
                    message_hash
                );
                self.observed.remove(&message_hash);
                Ok(None)
            }
            None => {
                debug!("Relay {:?} seen in logs but receipt not served yet", tx_hash);
                Ok(None)
            }
        }
    }

    /// Poll until a relay of `message_hash` with a receipt is observed
    ///
    /// Query failures are logged and retried on the next tick; the caller's
    /// deadline is the only way out besides a match.
    pub async fn wait_for_relay(
        &mut self,
        message_hash: MessageHash,
        poll_interval: Duration,
    ) -> TransactionReceipt {
        loop {
            if let Err(e) = self.poll().await {
                warn!(
                    "Relay scan on chain {} failed: {}",
                    self.endpoint.chain_id(),
                    e
                );
            }

            match self.lookup(message_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => {}
                Err(e) => warn!("Relay receipt query for {} failed: {}", message_hash, e),
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Number of distinct relayed messages seen so far
    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }
}
