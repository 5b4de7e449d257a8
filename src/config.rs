//! # Channel Configuration
//!
//! [`HandoffConfig`] selects how [`HandoffChannel::close()`](crate::HandoffChannel::close)
//! wakes the consumers that are blocked waiting for an item.
//!
//! ```
//! use handoff::{HandoffConfig, WakeStrategy};
//!
//! let cfg = HandoffConfig::default().with_wake_on_close(WakeStrategy::Relay);
//! assert_eq!(cfg.wake_on_close, WakeStrategy::Relay);
//! ```

use std::fmt;
use std::str::FromStr;

/// How the end of the stream reaches every blocked consumer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WakeStrategy {
    /// `close()` wakes all waiting consumers at once.
    #[default]
    Broadcast,
    /// `close()` wakes one consumer, and every consumer that observes the end of the stream
    /// wakes one more on its way out.
    ///
    /// Works only as long as every consumer keeps passing the wake-up along.
    Relay,
}

impl WakeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeStrategy::Broadcast => "broadcast",
            WakeStrategy::Relay => "relay",
        }
    }
}

impl fmt::Display for WakeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown wake strategy {0:?}; expected \"broadcast\" or \"relay\"")]
pub struct ParseWakeStrategyError(String);

impl FromStr for WakeStrategy {
    type Err = ParseWakeStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" => Ok(WakeStrategy::Broadcast),
            "relay" => Ok(WakeStrategy::Relay),
            _ => Err(ParseWakeStrategyError(s.to_owned())),
        }
    }
}

/// Configuration of a [`HandoffChannel`](crate::HandoffChannel).
#[derive(Debug, Default, Clone)]
pub struct HandoffConfig {
    /// Wake-up strategy used when the producer closes the channel.
    pub wake_on_close: WakeStrategy,
}

impl HandoffConfig {
    pub fn with_wake_on_close(mut self, strategy: WakeStrategy) -> Self {
        self.wake_on_close = strategy;
        self
    }
}
