//! Protocol tuning knobs.

use std::time::Duration;

use crate::error::ConfigError;

/// Protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Players required before the session can start.
    pub min_players: usize,
    /// How long a kicked channel stays open so `REMOVED` can be delivered.
    pub kick_grace: Duration,
    /// Lower bound of the randomized reconnect delay after coordinator loss.
    pub rejoin_delay_min: Duration,
    /// Upper bound of the randomized reconnect delay after coordinator loss.
    pub rejoin_delay_max: Duration,
    /// Extra time a promoted coordinator waits past `rejoin_delay_max`
    /// before pruning participants that never came back.
    pub rejoin_window_slack: Duration,
    /// Accept turn commands only from the participant whose turn it is.
    pub enforce_turn_order: bool,
    /// Fresh room codes to try before giving up on `AddressTaken`.
    pub room_code_attempts: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            kick_grace: Duration::from_millis(250),
            rejoin_delay_min: Duration::from_secs(1),
            rejoin_delay_max: Duration::from_secs(4),
            rejoin_window_slack: Duration::from_secs(3),
            enforce_turn_order: false,
            room_code_attempts: 8,
        }
    }
}

impl ProtocolConfig {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players < 2 {
            return Err(ConfigError::MinPlayersTooLow(self.min_players));
        }
        if self.rejoin_delay_min > self.rejoin_delay_max {
            return Err(ConfigError::InvertedRejoinWindow {
                min_ms: self.rejoin_delay_min.as_millis(),
                max_ms: self.rejoin_delay_max.as_millis(),
            });
        }
        if self.room_code_attempts == 0 {
            return Err(ConfigError::NoRoomCodeAttempts);
        }
        Ok(())
    }

    /// How long a promoted coordinator waits for former followers.
    pub fn rejoin_window(&self) -> Duration {
        self.rejoin_delay_max + self.rejoin_window_slack
    }
}
