//! Assembly configuration with environment overrides.

use std::env;

use serde::{Deserialize, Serialize};

use score_channel::ChannelConfig;
use view_sync::SyncConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// WebSocket endpoint of the scoring service.
    pub endpoint: String,
    pub channel: ChannelConfig,
    pub sync: SyncConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws/overlay/credibility/".to_string(),
            channel: ChannelConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults overlaid with `CREDIBLY_ENDPOINT` and `CREDIBLY_SETTLE_MS`
    /// when set; malformed values fall back to the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(endpoint) = env::var("CREDIBLY_ENDPOINT") {
            let trimmed = endpoint.trim();
            if !trimmed.is_empty() {
                cfg.endpoint = trimmed.to_string();
            }
        }
        if let Ok(raw) = env::var("CREDIBLY_SETTLE_MS") {
            if let Ok(ms) = raw.trim().parse::<u64>() {
                cfg.sync.settle_delay_ms = ms;
            }
        }
        cfg
    }
}
