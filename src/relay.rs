//! In-process stand-in for the extension's messaging layer.
//!
//! The popup/background context that relays score updates is an external
//! collaborator; here it is a broadcast bus carrying validated
//! [`RelayMessage`] values.

use std::sync::Arc;

use tokio::select;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use credibly_core_types::{RelayMessage, Score};
use score_channel::{ChannelEvents, Payload};
use view_sync::{HostPage, ViewSync};

pub type RelayBus = broadcast::Sender<RelayMessage>;

pub fn relay_bus(capacity: usize) -> (RelayBus, broadcast::Receiver<RelayMessage>) {
    broadcast::channel(capacity.max(1))
}

/// Publishes decoded channel payloads onto the relay bus.
///
/// Accepts the tagged relay shape and the scoring service's bare
/// `{"credibility": N}` shape; anything else is ignored at this boundary.
pub struct ScoreForwarder {
    bus: RelayBus,
}

impl ScoreForwarder {
    pub fn new(bus: RelayBus) -> Self {
        Self { bus }
    }

    fn to_relay(value: &serde_json::Value) -> Option<RelayMessage> {
        // A discriminator, recognized or not, means the tagged contract
        // applies; the bare shape is only for untagged service payloads.
        if value.get("type").is_some() {
            return RelayMessage::from_value(value);
        }
        value
            .get("credibility")
            .and_then(|raw| raw.as_u64())
            .and_then(|raw| u8::try_from(raw).ok())
            .map(|raw| RelayMessage::credibility_update(Score::new(raw)))
    }
}

impl ChannelEvents for ScoreForwarder {
    fn on_message(&self, payload: Payload) {
        let Some(value) = payload.as_json() else {
            debug!(target: "credibly-overlay", "non-JSON payload, nothing to relay");
            return;
        };
        match Self::to_relay(value) {
            Some(message) => {
                let _ = self.bus.send(message);
            }
            None => {
                debug!(target: "credibly-overlay", "unrecognized payload kind ignored");
            }
        }
    }
}

/// Feed relay messages into the synchronizer until shutdown.
pub fn spawn_listener<P: HostPage + 'static>(
    bus: &RelayBus,
    sync: Arc<ViewSync<P>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Ok(message) => sync.apply(message),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(target: "credibly-overlay", skipped, "relay messages coalesced");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forwards_tagged_relay_shape() {
        let (bus, mut rx) = relay_bus(8);
        let forwarder = ScoreForwarder::new(bus);

        forwarder.on_message(Payload::Json(
            json!({ "type": "credibilityUpdate", "credibility": 73 }),
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            RelayMessage::CredibilityUpdate { credibility: 73 }
        );
    }

    #[test]
    fn forwards_bare_backend_shape() {
        let (bus, mut rx) = relay_bus(8);
        let forwarder = ScoreForwarder::new(bus);

        forwarder.on_message(Payload::Json(json!({ "credibility": 41 })));
        assert_eq!(
            rx.try_recv().unwrap(),
            RelayMessage::CredibilityUpdate { credibility: 41 }
        );
    }

    #[test]
    fn ignores_unrecognized_and_raw_payloads() {
        let (bus, mut rx) = relay_bus(8);
        let forwarder = ScoreForwarder::new(bus);

        forwarder.on_message(Payload::Json(json!({ "type": "other", "credibility": 9 })));
        forwarder.on_message(Payload::Json(json!({ "credibility": 500 })));
        forwarder.on_message(Payload::Text("hello".to_string()));
        assert!(rx.try_recv().is_err());
    }
}
