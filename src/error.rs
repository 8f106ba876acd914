//! Error types for the cross-domain correlator

use crate::correlation::CorrelationStage;
use crate::events::MessageHash;

use ethers::types::H256;
use std::time::Duration;
use thiserror::Error;

/// Main error type for correlation operations
#[derive(Error, Debug)]
pub enum CorrelatorError {
    #[error("Origin chain rejected the submission: {0}")]
    Submission(String),

    #[error("No origin receipt {} within {waited:?}", origin_label(.tx_hash))]
    OriginReceiptTimeout {
        tx_hash: Option<H256>,
        waited: Duration,
    },

    #[error("Origin transaction {tx_hash:?} emitted no cross-domain message")]
    NoMessageEmitted { tx_hash: H256 },

    #[error("Message index {index} out of range: origin transaction {tx_hash:?} emitted {emitted}")]
    MessageIndexOutOfRange {
        tx_hash: H256,
        index: usize,
        emitted: usize,
    },

    #[error("No relay of message {message_hash} observed within {waited:?}")]
    DestinationRelayTimeout {
        message_hash: MessageHash,
        waited: Duration,
    },

    #[error("Transaction {tx_hash:?} not found on chain {chain_id}")]
    MissingTransaction { chain_id: u64, tx_hash: H256 },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CorrelatorError {
    /// The stage the correlation could not reach, for the four protocol failures
    pub fn failed_stage(&self) -> Option<CorrelationStage> {
        match self {
            CorrelatorError::Submission(_) => Some(CorrelationStage::Submitted),
            CorrelatorError::OriginReceiptTimeout { .. } => Some(CorrelationStage::OriginMined),
            CorrelatorError::NoMessageEmitted { .. }
            | CorrelatorError::MessageIndexOutOfRange { .. } => {
                Some(CorrelationStage::MessageExtracted)
            }
            CorrelatorError::DestinationRelayTimeout { .. } => Some(CorrelationStage::Relayed),
            _ => None,
        }
    }

    /// Check if the deadline expired
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CorrelatorError::OriginReceiptTimeout { .. }
                | CorrelatorError::DestinationRelayTimeout { .. }
        )
    }

    /// Check if resubmitting or rerunning the whole correlation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CorrelatorError::ChainConnection { .. }
                | CorrelatorError::OriginReceiptTimeout { .. }
                | CorrelatorError::DestinationRelayTimeout { .. }
                | CorrelatorError::MissingTransaction { .. }
        )
    }

    /// Label used for the failure metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CorrelatorError::Submission(_) => "submission",
            CorrelatorError::OriginReceiptTimeout { .. } => "origin_receipt_timeout",
            CorrelatorError::NoMessageEmitted { .. } => "no_message_emitted",
            CorrelatorError::MessageIndexOutOfRange { .. } => "message_index_out_of_range",
            CorrelatorError::DestinationRelayTimeout { .. } => "destination_relay_timeout",
            CorrelatorError::MissingTransaction { .. } => "missing_transaction",
            CorrelatorError::ChainConnection { .. } => "chain_connection",
            CorrelatorError::Config(_) => "config",
        }
    }
}

fn origin_label(tx_hash: &Option<H256>) -> String {
    match tx_hash {
        Some(hash) => format!("for {hash:?}"),
        None => "(submission still pending)".to_string(),
    }
}

/// Result type for correlator operations
pub type CorrelatorResult<T> = Result<T, CorrelatorError>;
