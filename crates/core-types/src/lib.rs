//! Shared leaf types for the credibility overlay agent.
//!
//! Kept dependency-light so both the channel and view layers can use them
//! without pulling in each other's stacks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Credibility score as delivered by the scoring service, 0-100.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MAX: Score = Score(100);

    /// Values above 100 clamp to 100.
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Rendering used by the injected indicator, e.g. `"73%"`.
    pub fn percent(&self) -> String {
        format!("{}%", self.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for Score {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

/// Messages carried by the extension relay, keyed by the `type` field.
///
/// Anything the relay sends that is not a recognized kind fails
/// deserialization and is ignored by consumers; see [`RelayMessage::from_value`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "credibilityUpdate")]
    CredibilityUpdate { credibility: u8 },
}

impl RelayMessage {
    /// Boundary validator: `None` for unrecognized kinds or malformed bodies.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn credibility_update(score: Score) -> Self {
        Self::CredibilityUpdate {
            credibility: score.value(),
        }
    }
}
