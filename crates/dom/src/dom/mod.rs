mod printing;

use indextree::{Arena, Node, NodeId};
use qiankun_js::{DOMUpdate, KeySpace, NodeKey};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// `crates/html/src/dom/updating.rs`'s `DOM` decoupled node creation from
/// node attachment, feeding a channel so a separate JS-engine thread could
/// mutate the tree without holding a lock across an `.await`. Qiankun's
/// controller is single-threaded-cooperative (spec §5): there is one owner
/// of the arena, so mutations apply directly and synchronously; only the
/// *fan-out* to subscribers (the DOM index, the style scoper, test probes)
/// still goes through a broadcast channel, the same way `DOMMirror` is wired
/// there.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DOMNode {
    pub kind: NodeKind,
    pub attrs: SmallVec<(String, String), 4>,
}

/// An arena-backed DOM tree, standing in for a real browser document.
pub struct DOM {
    arena: Arena<DOMNode>,
    root: NodeId,
    root_key: NodeKey,
    keyspace: KeySpace,
    id_to_key: HashMap<NodeId, NodeKey>,
    key_to_id: HashMap<NodeKey, NodeId>,
    next_counter: u64,
    out_updater: broadcast::Sender<Vec<DOMUpdate>>,
    pending: Vec<DOMUpdate>,
}

impl DOM {
    #[must_use]
    pub fn new() -> (Self, broadcast::Receiver<Vec<DOMUpdate>>) {
        let mut arena = Arena::new();
        let root = arena.new_node(DOMNode::default());
        let (out_updater, rx) = broadcast::channel(256);
        let root_key = NodeKey::ROOT;
        let mut id_to_key = HashMap::new();
        let mut key_to_id = HashMap::new();
        id_to_key.insert(root, root_key);
        key_to_id.insert(root_key, root);
        let dom = Self {
            arena,
            root,
            root_key,
            keyspace: KeySpace::new(),
            id_to_key,
            key_to_id,
            next_counter: 1,
            out_updater,
            pending: Vec::new(),
        };
        (dom, rx)
    }

    #[must_use]
    pub const fn root_key(&self) -> NodeKey {
        self.root_key
    }

    /// Subscribe to the stream of applied `DOMUpdate` batches.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<DOMUpdate>> {
        self.out_updater.subscribe()
    }

    fn mint_key(&mut self, id: NodeId) -> NodeKey {
        let key = NodeKey::pack(self.keyspace.epoch(), 0, self.next_counter);
        self.next_counter = self.next_counter.wrapping_add(1);
        self.id_to_key.insert(id, key);
        self.key_to_id.insert(key, id);
        key
    }

    fn key_of(&self, id: NodeId) -> NodeKey {
        self.id_to_key.get(&id).copied().unwrap_or(self.root_key)
    }

    fn id_of(&self, key: NodeKey) -> Option<NodeId> {
        self.key_to_id.get(&key).copied()
    }

    fn position_of(&self, id: NodeId) -> usize {
        let Some(parent) = self.arena.get(id).and_then(Node::parent) else {
            return 0;
        };
        parent.children(&self.arena).take_while(|&c| c != id).count()
    }

    /// Create a new, unattached element node and return its stable key.
    pub fn new_element(&mut self, tag: &str) -> NodeKey {
        let id = self.arena.new_node(DOMNode {
            kind: NodeKind::Element {
                tag: tag.to_owned(),
            },
            attrs: SmallVec::new(),
        });
        self.mint_key(id)
    }

    /// Create a new, unattached text node and return its stable key.
    pub fn new_text(&mut self, text: &str) -> NodeKey {
        let id = self.arena.new_node(DOMNode {
            kind: NodeKind::Text {
                text: text.to_owned(),
            },
            attrs: SmallVec::new(),
        });
        self.mint_key(id)
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) {
        let (Some(parent_id), Some(child_id)) = (self.id_of(parent), self.id_of(child)) else {
            return;
        };
        parent_id.append(child_id, &mut self.arena);
        self.record_insert(parent, child, self.position_of(child_id));
    }

    /// Insert `new_node` immediately before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeKey, new_node: NodeKey) {
        let (Some(sibling_id), Some(new_id)) = (self.id_of(sibling), self.id_of(new_node)) else {
            return;
        };
        let Some(parent_id) = self.arena.get(sibling_id).and_then(Node::parent) else {
            return;
        };
        sibling_id.insert_before(new_id, &mut self.arena);
        let parent_key = self.key_of(parent_id);
        self.record_insert(parent_key, new_node, self.position_of(new_id));
    }

    fn record_insert(&mut self, parent: NodeKey, node: NodeKey, pos: usize) {
        let Some(id) = self.id_of(node) else { return };
        let Some(node_ref) = self.arena.get(id) else {
            return;
        };
        let update = match &node_ref.get().kind {
            NodeKind::Element { tag } => DOMUpdate::InsertElement {
                parent,
                node,
                tag: tag.clone(),
                pos,
            },
            NodeKind::Text { text } => DOMUpdate::InsertText {
                parent,
                node,
                text: text.clone(),
                pos,
            },
            NodeKind::Document => return,
        };
        self.pending.push(update);
    }

    /// Set (or overwrite) an attribute on `node`.
    pub fn set_attr(&mut self, node: NodeKey, name: &str, value: &str) {
        let Some(id) = self.id_of(node) else { return };
        if let Some(node_ref) = self.arena.get_mut(id) {
            let attrs = &mut node_ref.get_mut().attrs;
            if let Some((_, val)) = attrs.iter_mut().find(|(key, _)| key == name) {
                value.clone_into(val);
            } else {
                attrs.push((name.to_owned(), value.to_owned()));
            }
        }
        self.pending.push(DOMUpdate::SetAttr {
            node,
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    #[must_use]
    pub fn has_attr(&self, node: NodeKey, name: &str) -> bool {
        self.id_of(node)
            .and_then(|id| self.arena.get(id))
            .is_some_and(|n| n.get().attrs.iter().any(|(key, _)| key == name))
    }

    #[must_use]
    pub fn get_attr(&self, node: NodeKey, name: &str) -> Option<String> {
        let id = self.id_of(node)?;
        self.arena
            .get(id)?
            .get()
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, v)| v.clone())
    }

    /// Update the text content of an existing text node.
    pub fn update_text(&mut self, node: NodeKey, text: &str) {
        let Some(id) = self.id_of(node) else { return };
        if let Some(node_ref) = self.arena.get_mut(id) {
            if let NodeKind::Text { text: text_ref } = &mut node_ref.get_mut().kind {
                text.clone_into(text_ref);
            }
        }
        self.pending.push(DOMUpdate::UpdateText {
            node,
            text: text.to_owned(),
        });
    }

    /// Detach `node` from its parent (node and subtree remain addressable).
    pub fn remove_from_parent(&mut self, node: NodeKey) {
        if let Some(id) = self.id_of(node) {
            id.detach(&mut self.arena);
        }
        self.pending.push(DOMUpdate::RemoveNode { node });
    }

    /// Move all children of `node` to become children of `new_parent`.
    pub fn reparent_children(&mut self, node: NodeKey, new_parent: NodeKey) {
        let (Some(node_id), Some(parent_id)) = (self.id_of(node), self.id_of(new_parent)) else {
            return;
        };
        let children: Vec<NodeId> = node_id.children(&self.arena).collect();
        for child in children {
            child.detach(&mut self.arena);
            parent_id.append(child, &mut self.arena);
            let child_key = self.key_of(child);
            self.record_insert(new_parent, child_key, self.position_of(child));
        }
    }

    /// Flush and broadcast the batch of updates accumulated since the last
    /// call, returning it for diagnostics (mirrors `DOM::update` in
    /// `crates/html/src/dom/updating.rs`, minus the inbound channel it no
    /// longer needs).
    pub fn finish_update(&mut self) -> Vec<DOMUpdate> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let batch = std::mem::take(&mut self.pending);
        log::info!("qiankun_dom: applied batch of {} update(s)", batch.len());
        drop(self.out_updater.send(batch.clone()));
        batch
    }

    /// Push an out-of-band update (e.g. `EndOfDocument`) to the pending batch.
    pub fn push_update(&mut self, update: DOMUpdate) {
        self.pending.push(update);
    }

    pub fn children_of(&self, node: NodeKey) -> Vec<NodeKey> {
        let Some(id) = self.id_of(node) else {
            return Vec::new();
        };
        id.children(&self.arena).map(|c| self.key_of(c)).collect()
    }

    #[must_use]
    pub fn tag_of(&self, node: NodeKey) -> Option<String> {
        let id = self.id_of(node)?;
        match &self.arena.get(id)?.get().kind {
            NodeKind::Element { tag } => Some(tag.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn text_of(&self, node: NodeKey) -> Option<String> {
        let id = self.id_of(node)?;
        match &self.arena.get(id)?.get().kind {
            NodeKind::Text { text } => Some(text.clone()),
            _ => None,
        }
    }

    /// Build a deterministic JSON representation of the DOM for test
    /// snapshotting (testable property 7's "string-equal after normalizing
    /// nonce attributes").
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        printing::node_to_json(self, self.root)
    }

    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_value()).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::DOM;

    #[test]
    fn append_and_set_attr_round_trips_through_json() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let div = dom.new_element("div");
        dom.append_child(root, div);
        dom.set_attr(div, "id", "app");
        let text = dom.new_text("hello");
        dom.append_child(div, text);
        dom.finish_update();

        let json = dom.to_json_value();
        let children = json["children"][0].clone();
        assert_eq!(children["tag"], "div");
        assert_eq!(children["attrs"]["id"], "app");
    }

    #[test]
    fn removed_node_detaches_from_parent() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let div = dom.new_element("div");
        dom.append_child(root, div);
        assert_eq!(dom.children_of(root).len(), 1);
        dom.remove_from_parent(div);
        assert_eq!(dom.children_of(root).len(), 0);
    }
}
