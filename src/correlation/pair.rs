//! Correlated origin/destination bundle

use crate::chain::Direction;
use crate::events::MessageHash;

use ethers::types::{Transaction, TransactionReceipt, H256};
use serde::Serialize;

/// An origin transaction matched with the destination transaction relaying its message
#[derive(Debug, Clone, Serialize)]
pub struct CorrelatedPair {
    pub direction: Direction,
    pub message_hash: MessageHash,
    pub origin_transaction: Transaction,
    pub origin_receipt: TransactionReceipt,
    pub destination_transaction: Transaction,
    pub destination_receipt: TransactionReceipt,
}

impl CorrelatedPair {
    pub fn origin_hash(&self) -> H256 {
        self.origin_receipt.transaction_hash
    }

    pub fn destination_hash(&self) -> H256 {
        self.destination_receipt.transaction_hash
    }

    /// Whether the relaying transaction executed successfully
    pub fn relay_succeeded(&self) -> bool {
        self.destination_receipt.status.map(|s| s.as_u64()) == Some(1)
    }
}
