//! Cross-domain correlation
//!
//! The correlator follows one origin transaction through:
//! 1. Submission acceptance by the origin chain
//! 2. Mining of the origin transaction
//! 3. Extraction of the message hashes it emitted
//! 4. Relay of each selected message on the destination chain

pub mod correlator;
pub mod pair;
pub mod stage;

pub use correlator::{CrossDomainCorrelator, MessageSelector};
pub use pair::CorrelatedPair;
pub use stage::CorrelationStage;
