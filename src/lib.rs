//! Credibility overlay agent.
//!
//! Assembles the two runtime components — the [`ScoreChannel`] talking to
//! the local scoring service and the [`ViewSync`] keeping the indicator
//! alive in the host page — around an in-process relay bus that stands in
//! for the extension's messaging layer.

pub mod config;
pub mod relay;
pub mod telemetry;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::AgentConfig;
pub use credibly_core_types::{RelayMessage, Score};
pub use relay::{relay_bus, RelayBus, ScoreForwarder};
pub use score_channel::{ChannelConfig, ChannelError, ChannelState, Payload, ScoreChannel};
pub use view_sync::{
    mutation_bus, ElementSpec, HostPage, InMemoryDom, MutationBatch, MutationBus,
    NavigationWatcher, NodeId, Selector, SyncConfig, ViewSync, INDICATOR_MARKER,
};

/// The wired-up agent: channel, relay listener, synchronizer, watcher.
///
/// `start` brings everything up, including the connection attempt; `stop`
/// tears it all down. Dropping the agent aborts the background tasks through
/// the members' own cleanup paths.
pub struct OverlayAgent<P: HostPage + 'static> {
    channel: ScoreChannel,
    sync: Arc<ViewSync<P>>,
    watcher: NavigationWatcher<P>,
    relay_task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<P: HostPage + 'static> OverlayAgent<P> {
    pub async fn start(page: Arc<P>, mutations: MutationBus, cfg: AgentConfig) -> Self {
        info!(target: "credibly-overlay", endpoint = %cfg.endpoint, "starting overlay agent");

        let (bus, _seed_rx) = relay_bus(64);
        let sync = Arc::new(ViewSync::new(page, cfg.sync.clone()));
        let shutdown = CancellationToken::new();
        let relay_task = relay::spawn_listener(&bus, Arc::clone(&sync), shutdown.clone());

        let forwarder = Arc::new(ScoreForwarder::new(bus));
        let channel = ScoreChannel::new(cfg.channel.clone(), forwarder);

        let mut watcher = NavigationWatcher::new(Arc::clone(&sync));
        watcher.start(mutations);

        channel.connect(cfg.endpoint.clone()).await;

        Self {
            channel,
            sync,
            watcher,
            relay_task: Some(relay_task),
            shutdown,
        }
    }

    pub fn channel(&self) -> &ScoreChannel {
        &self.channel
    }

    pub fn sync(&self) -> &Arc<ViewSync<P>> {
        &self.sync
    }

    pub async fn stop(&mut self) {
        self.watcher.stop().await;
        self.shutdown.cancel();
        if let Some(task) = self.relay_task.take() {
            let _ = task.await;
        }
        self.channel.disconnect().await;
        info!(target: "credibly-overlay", "overlay agent stopped");
    }
}

impl<P: HostPage + 'static> Drop for OverlayAgent<P> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.relay_task.take() {
            task.abort();
        }
    }
}
