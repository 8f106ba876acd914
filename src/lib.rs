//! Cross-domain message correlator for an L1/L2 rollup pair
//!
//! Given a transaction submitted on one chain, the correlator waits for it to
//! be mined, extracts the cross-domain message hashes its messenger emitted,
//! and waits for the transaction on the other chain that relays each message.

pub mod chain;
pub mod config;
pub mod correlation;
pub mod error;
pub mod events;
pub mod metrics;

#[cfg(test)]
mod test_utils;

pub use chain::{ChainClient, ChainEndpoint, ChainManager, Direction, Layer};
pub use config::Settings;
pub use correlation::{CorrelatedPair, CorrelationStage, CrossDomainCorrelator, MessageSelector};
pub use error::{CorrelatorError, CorrelatorResult};
pub use events::{MessageHash, MessageLogSchema};
