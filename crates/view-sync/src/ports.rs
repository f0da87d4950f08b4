use crate::error::SyncError;
use crate::model::{ElementSpec, NodeId, Selector};

/// Synchronous access to the host page's live tree.
///
/// The production adapter is the extension content context; [`InMemoryDom`]
/// backs tests and early integration. Queries walk the tree in document
/// order and return the first match.
///
/// [`InMemoryDom`]: crate::InMemoryDom
pub trait HostPage: Send + Sync {
    /// Current location identifier (the page URL).
    fn location(&self) -> String;

    fn query(&self, selector: &Selector) -> Option<NodeId>;

    /// Insert a new subtree under `parent` at `index`. An index past the end
    /// appends, matching `insertBefore` with a missing reference child.
    fn insert_child(
        &self,
        parent: NodeId,
        index: usize,
        spec: &ElementSpec,
    ) -> Result<NodeId, SyncError>;

    fn set_text(&self, node: NodeId, text: &str) -> Result<(), SyncError>;
}
