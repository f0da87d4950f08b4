use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::SyncError;
use crate::events::{mutation_bus, MutationBatch, MutationBus};
use crate::model::{ElementSpec, NodeId, Selector};
use crate::ports::HostPage;

#[derive(Clone, Debug)]
struct NodeData {
    tag: String,
    classes: Vec<String>,
    attrs: HashMap<String, String>,
    text: Option<String>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn from_spec(spec: &ElementSpec) -> Self {
        Self {
            tag: spec.tag.clone(),
            classes: spec.classes.clone(),
            attrs: spec.attrs.iter().cloned().collect(),
            text: spec.text.clone(),
            children: Vec::new(),
        }
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Classes(classes) => classes
                .iter()
                .all(|class| self.classes.iter().any(|have| have == class)),
            Selector::Attr { key } => self.attrs.contains_key(key),
        }
    }
}

struct DomState {
    location: String,
    nodes: HashMap<NodeId, NodeData>,
    root: NodeId,
}

impl DomState {
    fn materialize(&mut self, spec: &ElementSpec) -> NodeId {
        let id = NodeId::new();
        let mut data = NodeData::from_spec(spec);
        for child in &spec.children {
            let child_id = self.materialize(child);
            data.children.push(child_id);
        }
        self.nodes.insert(id, data);
        id
    }

    fn find(&self, from: NodeId, selector: &Selector) -> Option<NodeId> {
        let data = self.nodes.get(&from)?;
        if data.matches(selector) {
            return Some(from);
        }
        for child in &data.children {
            if let Some(found) = self.find(*child, selector) {
                return Some(found);
            }
        }
        None
    }

    fn count(&self, from: NodeId, selector: &Selector) -> usize {
        let Some(data) = self.nodes.get(&from) else {
            return 0;
        };
        let own = usize::from(data.matches(selector));
        own + data
            .children
            .iter()
            .map(|child| self.count(*child, selector))
            .sum::<usize>()
    }

    fn drop_subtree(&mut self, node: NodeId) {
        if let Some(data) = self.nodes.remove(&node) {
            for child in data.children {
                self.drop_subtree(child);
            }
        }
    }
}

/// In-memory host page suitable for unit tests and early integration.
///
/// Mutating operations emit one [`MutationBatch`] each, the way a real host
/// observer would wake its subscribers. The "host side" methods (`attach`,
/// `clear_children`, `navigate`) simulate what the page's own framework does.
pub struct InMemoryDom {
    state: Mutex<DomState>,
    bus: MutationBus,
}

impl InMemoryDom {
    pub fn new(location: impl Into<String>) -> Self {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            NodeData {
                tag: "body".to_string(),
                classes: Vec::new(),
                attrs: HashMap::new(),
                text: None,
                children: Vec::new(),
            },
        );
        let (bus, _) = mutation_bus(64);
        Self {
            state: Mutex::new(DomState {
                location: location.into(),
                nodes,
                root,
            }),
            bus,
        }
    }

    pub fn root(&self) -> NodeId {
        self.state.lock().root
    }

    /// Bus on which this page publishes its mutation batches.
    pub fn mutations(&self) -> MutationBus {
        self.bus.clone()
    }

    /// Host-side: build a subtree under `parent` (appended at the end).
    pub fn attach(&self, parent: NodeId, spec: &ElementSpec) -> NodeId {
        let mut state = self.state.lock();
        let id = state.materialize(spec);
        if let Some(data) = state.nodes.get_mut(&parent) {
            data.children.push(id);
        }
        drop(state);
        self.emit(1);
        id
    }

    /// Host-side: wipe a subtree the way an SPA rebuild does, without any
    /// notification beyond the mutation batch.
    pub fn clear_children(&self, node: NodeId) {
        let mut state = self.state.lock();
        let children = state
            .nodes
            .get_mut(&node)
            .map(|data| std::mem::take(&mut data.children))
            .unwrap_or_default();
        let changes = children.len();
        for child in children {
            state.drop_subtree(child);
        }
        drop(state);
        self.emit(changes.max(1));
    }

    /// Host-side: SPA navigation. Changes the location and wakes observers.
    pub fn navigate(&self, location: impl Into<String>) {
        self.state.lock().location = location.into();
        self.emit(1);
    }

    pub fn count_matching(&self, selector: &Selector) -> usize {
        let state = self.state.lock();
        state.count(state.root, selector)
    }

    pub fn text_of(&self, node: NodeId) -> Option<String> {
        self.state.lock().nodes.get(&node).and_then(|data| data.text.clone())
    }

    pub fn tag_of(&self, node: NodeId) -> Option<String> {
        self.state.lock().nodes.get(&node).map(|data| data.tag.clone())
    }

    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn emit(&self, changes: usize) {
        let _ = self.bus.send(MutationBatch { changes });
    }
}

impl HostPage for InMemoryDom {
    fn location(&self) -> String {
        self.state.lock().location.clone()
    }

    fn query(&self, selector: &Selector) -> Option<NodeId> {
        let state = self.state.lock();
        state.find(state.root, selector)
    }

    fn insert_child(
        &self,
        parent: NodeId,
        index: usize,
        spec: &ElementSpec,
    ) -> Result<NodeId, SyncError> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&parent) {
            return Err(SyncError::NodeGone);
        }
        let id = state.materialize(spec);
        let data = state.nodes.get_mut(&parent).ok_or(SyncError::NodeGone)?;
        let slot = index.min(data.children.len());
        data.children.insert(slot, id);
        drop(state);
        self.emit(1);
        Ok(id)
    }

    fn set_text(&self, node: NodeId, text: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        let data = state.nodes.get_mut(&node).ok_or(SyncError::NodeGone)?;
        data.text = Some(text.to_string());
        drop(state);
        self.emit(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_class_sets_and_attrs() {
        let dom = InMemoryDom::new("https://host.example/");
        let root = dom.root();
        dom.attach(root, &ElementSpec::new("div").with_class("row").with_class("actions"));
        dom.attach(
            root,
            &ElementSpec::new("strong").with_attr("data-thing", "true"),
        );

        assert!(dom.query(&Selector::classes(["row", "actions"])).is_some());
        assert!(dom.query(&Selector::classes(["row", "missing"])).is_none());
        assert!(dom.query(&Selector::attr("data-thing")).is_some());
        assert!(dom.query(&Selector::attr("data-other")).is_none());
    }

    #[test]
    fn insert_child_clamps_index_to_append() {
        let dom = InMemoryDom::new("https://host.example/");
        let root = dom.root();
        let parent = dom.attach(root, &ElementSpec::new("div"));

        let first = dom
            .insert_child(parent, 5, &ElementSpec::new("span"))
            .unwrap();
        let second = dom
            .insert_child(parent, 1, &ElementSpec::new("em"))
            .unwrap();

        assert_eq!(dom.children_of(parent), vec![first, second]);
    }

    #[test]
    fn insert_into_removed_parent_reports_node_gone() {
        let dom = InMemoryDom::new("https://host.example/");
        let root = dom.root();
        let parent = dom.attach(root, &ElementSpec::new("div"));
        dom.clear_children(root);

        assert_eq!(
            dom.insert_child(parent, 0, &ElementSpec::new("span")),
            Err(SyncError::NodeGone)
        );
    }

    #[test]
    fn clear_children_drops_whole_subtrees() {
        let dom = InMemoryDom::new("https://host.example/");
        let root = dom.root();
        dom.attach(
            root,
            &ElementSpec::new("div")
                .with_child(ElementSpec::new("span").with_attr("data-thing", "1")),
        );
        assert_eq!(dom.count_matching(&Selector::attr("data-thing")), 1);

        dom.clear_children(root);
        assert_eq!(dom.count_matching(&Selector::attr("data-thing")), 0);
    }

    #[tokio::test]
    async fn mutations_reach_subscribers() {
        let dom = InMemoryDom::new("https://host.example/");
        let mut rx = dom.mutations().subscribe();
        dom.navigate("https://host.example/next");
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.changes, 1);
        assert_eq!(dom.location(), "https://host.example/next");
    }
}
