//! View synchronizer for the credibility indicator.
//!
//! Keeps exactly one indicator element reflecting the current score inside a
//! host page this system does not control. The host is an SPA that replaces
//! large DOM subtrees without full reloads, so injection is idempotent and
//! driven by a mutation watcher with a settling delay rather than by the
//! score updates themselves.

pub mod error {
    use thiserror::Error;

    /// Failures surfaced by a [`HostPage`](crate::HostPage) implementation.
    #[derive(Clone, Debug, Error, PartialEq)]
    pub enum SyncError {
        #[error("node no longer attached")]
        NodeGone,
    }
}

mod dom;
mod events;
pub mod metrics;
mod model;
mod ports;
mod sync;
mod watcher;

pub use dom::InMemoryDom;
pub use error::SyncError;
pub use events::{mutation_bus, MutationBatch, MutationBus};
pub use model::{ElementSpec, NodeId, Selector};
pub use ports::HostPage;
pub use sync::{SyncConfig, ViewSync, INDICATOR_MARKER, INDICATOR_SLOT};
pub use watcher::NavigationWatcher;
