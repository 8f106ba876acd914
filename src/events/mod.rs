//! Messenger event schema and log decoding
//!
//! The origin messenger emits `SentMessage(bytes)` carrying the encoded
//! cross-domain message; its identifier is the keccak-256 of those bytes. The
//! destination messenger emits `RelayedMessage(bytes32)` once the message has
//! been executed, carrying the same 32-byte identifier. Only these fields are
//! decoded; everything else in the bridge ABI is left alone.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Log, TransactionReceipt, H256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use tracing::warn;

/// Identifier correlating an emitted message with its relay
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHash(pub H256);

impl MessageHash {
    /// Hash of the encoded message bytes carried by the sent event
    pub fn of_message(message: &[u8]) -> Self {
        Self(H256(keccak256(message)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<H256> for MessageHash {
    fn from(hash: H256) -> Self {
        Self(hash)
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Debug for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHash({self})")
    }
}

/// Where the relay event carries the message hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashLocation {
    /// First 32-byte word of the log data (non-indexed parameter)
    Data,
    /// First indexed parameter
    Topic1,
}

/// Versioned description of the messenger events the correlator decodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageLogSchema {
    pub sent_event: String,
    pub relay_event: String,
    pub relay_hash: HashLocation,
}

impl Default for MessageLogSchema {
    fn default() -> Self {
        Self {
            sent_event: "SentMessage(bytes)".to_string(),
            relay_event: "RelayedMessage(bytes32)".to_string(),
            relay_hash: HashLocation::Data,
        }
    }
}

impl MessageLogSchema {
    /// Topic of the origin-side sent event
    pub fn sent_topic(&self) -> H256 {
        event_topic(&self.sent_event)
    }

    /// Topic of the destination-side relay event
    pub fn relay_topic(&self) -> H256 {
        event_topic(&self.relay_event)
    }
}

/// keccak-256 digest
pub fn keccak256(bytes: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes.as_ref());
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Topic hash of an event signature such as `SentMessage(bytes)`
pub fn event_topic(signature: &str) -> H256 {
    H256(keccak256(signature.as_bytes()))
}

/// Four-byte function selector of a signature such as `getAddress(string)`
pub fn function_selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Decode the message hash from a sent event emitted by `messenger`
pub fn sent_message_hash(
    log: &Log,
    messenger: Address,
    schema: &MessageLogSchema,
) -> Option<MessageHash> {
    if log.address != messenger || log.topics.first() != Some(&schema.sent_topic()) {
        return None;
    }

    match abi::decode(&[ParamType::Bytes], &log.data) {
        Ok(tokens) => match tokens.into_iter().next() {
            Some(Token::Bytes(message)) => Some(MessageHash::of_message(&message)),
            _ => None,
        },
        Err(e) => {
            warn!(
                "Malformed {} log in tx {:?}: {}",
                schema.sent_event, log.transaction_hash, e
            );
            None
        }
    }
}

/// Extract the message hashes emitted by `messenger` in a receipt, in emission order
pub fn extract_message_hashes(
    receipt: &TransactionReceipt,
    messenger: Address,
    schema: &MessageLogSchema,
) -> Vec<MessageHash> {
    receipt
        .logs
        .iter()
        .filter_map(|log| sent_message_hash(log, messenger, schema))
        .collect()
}

/// Decode the message hash from a relay event emitted by `messenger`
pub fn relay_message_hash(
    log: &Log,
    messenger: Address,
    schema: &MessageLogSchema,
) -> Option<MessageHash> {
    if log.address != messenger || log.topics.first() != Some(&schema.relay_topic()) {
        return None;
    }

    match schema.relay_hash {
        HashLocation::Data => log
            .data
            .get(..32)
            .map(|word| MessageHash(H256::from_slice(word))),
        HashLocation::Topic1 => log.topics.get(1).copied().map(MessageHash),
    }
}

/// Check whether a destination receipt relays the given message
pub fn receipt_relays(
    receipt: &TransactionReceipt,
    messenger: Address,
    message_hash: MessageHash,
    schema: &MessageLogSchema,
) -> bool {
    receipt
        .logs
        .iter()
        .any(|log| relay_message_hash(log, messenger, schema) == Some(message_hash))
}
