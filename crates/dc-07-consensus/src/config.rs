//! Consensus timing.

use dc_02_ledger::ProtocolSettings;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Target block interval. View `v` times out after
    /// `seconds_per_block << (v + 1)`.
    pub seconds_per_block: Duration,
    /// How far ahead of the local clock a proposal timestamp may be.
    pub max_future_timestamp: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            seconds_per_block: Duration::from_secs(15),
            max_future_timestamp: Duration::from_secs(600),
        }
    }
}

impl ConsensusConfig {
    pub fn from_settings(settings: &ProtocolSettings) -> Self {
        Self {
            seconds_per_block: Duration::from_secs(u64::from(settings.seconds_per_block)),
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            seconds_per_block: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Timeout for a round at `view`.
    pub fn view_timeout(&self, view: u8) -> Duration {
        let shift = u32::from(view) + 1;
        let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.seconds_per_block.saturating_mul(factor)
    }
}
