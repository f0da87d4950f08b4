//! Channel manager for the credibility scoring service.
//!
//! Wraps an event-driven WebSocket in a typed, lifecycle-managed interface:
//! at most one live connection, explicit state transitions observable through
//! watch channels, and a decode step that never drops a payload.

pub mod error {
    use thiserror::Error;

    /// Failures surfaced through the channel's last-error observable.
    #[derive(Clone, Debug, Error, PartialEq)]
    pub enum ChannelError {
        #[error("invalid address: {0}")]
        InvalidAddress(String),
        #[error("connection attempt timed out")]
        ConnectTimeout,
        #[error("transport failure: {0}")]
        Transport(String),
        #[error("no live connection")]
        NotConnected,
    }
}

pub mod config {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    /// Tuning knobs for the channel manager.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ChannelConfig {
        pub connect_timeout_ms: u64,
    }

    impl Default for ChannelConfig {
        fn default() -> Self {
            Self {
                connect_timeout_ms: 10_000,
            }
        }
    }

    impl ChannelConfig {
        pub fn connect_timeout(&self) -> Duration {
            Duration::from_millis(self.connect_timeout_ms)
        }
    }
}

mod channel;
pub mod metrics;
mod payload;

pub use channel::{ChannelEvents, ChannelState, NoopEvents, ScoreChannel};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use payload::Payload;
