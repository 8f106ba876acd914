//! Per-message correlation stages

use serde::Serialize;
use std::fmt;

/// Progress of one tracked message
///
/// Stages are only ever entered in order; failures are reported through
/// `CorrelatorError::failed_stage` as the stage that could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStage {
    Submitted,
    OriginMined,
    MessageExtracted,
    AwaitingRelay,
    Relayed,
}

impl CorrelationStage {
    /// The stage that follows this one, `None` once relayed
    pub fn next(self) -> Option<Self> {
        match self {
            CorrelationStage::Submitted => Some(CorrelationStage::OriginMined),
            CorrelationStage::OriginMined => Some(CorrelationStage::MessageExtracted),
            CorrelationStage::MessageExtracted => Some(CorrelationStage::AwaitingRelay),
            CorrelationStage::AwaitingRelay => Some(CorrelationStage::Relayed),
            CorrelationStage::Relayed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == CorrelationStage::Relayed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CorrelationStage::Submitted => "submitted",
            CorrelationStage::OriginMined => "origin_mined",
            CorrelationStage::MessageExtracted => "message_extracted",
            CorrelationStage::AwaitingRelay => "awaiting_relay",
            CorrelationStage::Relayed => "relayed",
        }
    }
}

impl fmt::Display for CorrelationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
