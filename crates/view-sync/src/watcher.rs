use std::sync::Arc;

use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::MutationBus;
use crate::metrics;
use crate::ports::HostPage;
use crate::sync::ViewSync;

/// Watches host mutation batches for SPA navigations and re-establishes the
/// indicator after each one.
///
/// The host rebuilds its UI asynchronously after a navigation, so injection
/// is scheduled after a settling delay instead of firing immediately; an
/// injection into a not-yet-rebuilt tree would be wiped by the rebuild. The
/// delayed task is detached on purpose: a navigation racing an in-flight
/// timer just produces an extra idempotent attempt.
pub struct NavigationWatcher<P: HostPage + 'static> {
    sync: Arc<ViewSync<P>>,
    task: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<P: HostPage + 'static> NavigationWatcher<P> {
    pub fn new(sync: Arc<ViewSync<P>>) -> Self {
        Self {
            sync,
            task: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Start watching mutation batches from the given bus. Also schedules
    /// the initial deferred injection for the page the watcher starts on.
    pub fn start(&mut self, bus: MutationBus) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }

        let sync = Arc::clone(&self.sync);
        let shutdown = self.shutdown.clone();
        let mut rx = bus.subscribe();

        self.task = Some(tokio::spawn(async move {
            debug!(target: "view-sync", "navigation watcher started");
            let mut last_location = sync.page().location();
            schedule_injection(Arc::clone(&sync));

            loop {
                select! {
                    _ = shutdown.cancelled() => {
                        debug!(target: "view-sync", "navigation watcher shutting down");
                        break;
                    }
                    batch = rx.recv() => match batch {
                        Ok(_) => {
                            let location = sync.page().location();
                            if location != last_location {
                                debug!(
                                    target: "view-sync",
                                    from = %last_location,
                                    to = %location,
                                    "navigation detected"
                                );
                                metrics::record_navigation();
                                last_location = location;
                                schedule_injection(Arc::clone(&sync));
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(target: "view-sync", skipped, "mutation batches coalesced");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!(target: "view-sync", "navigation watcher exited");
        }));
    }

    /// Stop the watcher.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.task.take() {
            let _ = handle.await;
        }
    }
}

impl<P: HostPage + 'static> Drop for NavigationWatcher<P> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

fn schedule_injection<P: HostPage + 'static>(sync: Arc<ViewSync<P>>) {
    let delay = sync.config().settle_delay();
    tokio::spawn(async move {
        sleep(delay).await;
        sync.inject_indicator();
    });
}
