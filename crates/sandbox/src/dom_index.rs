//! A minimal DOM index mirror for host lookups (`getElementById` and
//! friends), grounded on `crates/js/src/dom_index.rs`. Subscribes to `DOMUpdate`
//! batches (`qiankun_js::DOMMirror`) and maintains id/tag/class indices plus
//! a parent/child relation so host-bound document functions can answer
//! queries synchronously without walking the arena DOM directly.

use anyhow::Result;
use qiankun_js::{DOMSubscriber, DOMUpdate, NodeKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Internal mutable state for the DOM index.
#[derive(Default)]
pub struct DomIndexState {
    tag_by_key: HashMap<NodeKey, String>,
    id_by_key: HashMap<NodeKey, String>,
    classes_by_key: HashMap<NodeKey, HashSet<String>>,
    children_by_parent: HashMap<NodeKey, Vec<NodeKey>>,
    parent_by_child: HashMap<NodeKey, NodeKey>,
    id_index: HashMap<String, NodeKey>,
    tag_index: HashMap<String, Vec<NodeKey>>,
    class_index: HashMap<String, Vec<NodeKey>>,
    text_by_key: HashMap<NodeKey, String>,
}

impl DomIndexState {
    /// Removes `node` and its descendants, reporting whether `node` itself
    /// was actually present beforehand — a node already removed (e.g. by a
    /// prior rewind record, or by the app itself) makes this a no-op and
    /// the caller's rewind should note it as a partial failure rather than
    /// silently treating it as success.
    fn remove_recursively(&mut self, node: NodeKey) -> bool {
        let existed = self.parent_by_child.contains_key(&node)
            || self.tag_by_key.contains_key(&node)
            || self.text_by_key.contains_key(&node);

        if let Some(children) = self.children_by_parent.remove(&node) {
            for child in children {
                self.remove_recursively(child);
            }
        }
        if let Some(parent) = self.parent_by_child.remove(&node) {
            if let Some(siblings) = self.children_by_parent.get_mut(&parent) {
                siblings.retain(|c| *c != node);
            }
        }
        if let Some(id) = self.id_by_key.remove(&node) {
            if matches!(self.id_index.get(&id), Some(&existing) if existing == node) {
                self.id_index.remove(&id);
            }
        }
        if let Some(tag) = self.tag_by_key.remove(&node) {
            if let Some(list) = self.tag_index.get_mut(&tag) {
                list.retain(|k| *k != node);
            }
        }
        if let Some(classes) = self.classes_by_key.remove(&node) {
            for class in classes {
                if let Some(list) = self.class_index.get_mut(&class) {
                    list.retain(|k| *k != node);
                }
            }
        }
        self.text_by_key.remove(&node);
        existed
    }

    fn set_classes_for(&mut self, node: NodeKey, class_attr: &str) {
        if let Some(prev) = self.classes_by_key.get(&node).cloned() {
            for class in prev {
                if let Some(list) = self.class_index.get_mut(&class) {
                    list.retain(|k| *k != node);
                }
            }
        }
        let mut set = HashSet::new();
        for token in class_attr.split_whitespace() {
            let lower = token.to_ascii_lowercase();
            set.insert(lower.clone());
            self.class_index.entry(lower).or_default().push(node);
        }
        if set.is_empty() {
            self.classes_by_key.remove(&node);
        } else {
            self.classes_by_key.insert(node, set);
        }
    }

    /// The element with the given id, if any (case-sensitive per HTML spec).
    #[must_use]
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeKey> {
        self.id_index.get(id).copied()
    }

    /// Elements with `tag` (case-insensitive), in document order.
    #[must_use]
    pub fn get_elements_by_tag_name(&self, root: NodeKey, tag: &str) -> Vec<NodeKey> {
        let needle = tag.to_ascii_lowercase();
        let mut out = Vec::new();
        self.walk(root, &mut out, |state, node| {
            state.tag_by_key.get(&node).is_some_and(|t| *t == needle)
        });
        out
    }

    /// Elements carrying `class` (case-insensitive), in document order.
    #[must_use]
    pub fn get_elements_by_class_name(&self, root: NodeKey, class: &str) -> Vec<NodeKey> {
        let needle = class.to_ascii_lowercase();
        let mut out = Vec::new();
        self.walk(root, &mut out, |state, node| {
            state
                .classes_by_key
                .get(&node)
                .is_some_and(|classes| classes.contains(&needle))
        });
        out
    }

    fn walk(&self, root: NodeKey, out: &mut Vec<NodeKey>, pred: impl Fn(&Self, NodeKey) -> bool + Copy) {
        if pred(self, root) {
            out.push(root);
        }
        if let Some(children) = self.children_by_parent.get(&root) {
            for &child in children {
                self.walk(child, out, pred);
            }
        }
    }

    /// Concatenated text content of `node` and all of its descendants.
    #[must_use]
    pub fn get_text_content(&self, node: NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeKey, out: &mut String) {
        if let Some(text) = self.text_by_key.get(&node) {
            out.push_str(text);
        }
        if let Some(children) = self.children_by_parent.get(&node) {
            for &child in children {
                self.collect_text(child, out);
            }
        }
    }

    #[must_use]
    pub fn parent_of(&self, node: NodeKey) -> Option<NodeKey> {
        self.parent_by_child.get(&node).copied()
    }

    #[must_use]
    pub fn children_of(&self, node: NodeKey) -> Vec<NodeKey> {
        self.children_by_parent.get(&node).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn tag_of(&self, node: NodeKey) -> Option<&str> {
        self.tag_by_key.get(&node).map(String::as_str)
    }

    /// `id` attribute of `node`, if set.
    #[must_use]
    pub fn id_of(&self, node: NodeKey) -> Option<&str> {
        self.id_by_key.get(&node).map(String::as_str)
    }

    /// `class` attribute of `node` as a sorted, space-joined string.
    #[must_use]
    pub fn class_list_of(&self, node: NodeKey) -> String {
        self.classes_by_key.get(&node).map_or_else(String::new, |classes| {
            let mut sorted: Vec<&String> = classes.iter().collect();
            sorted.sort();
            sorted.into_iter().cloned().collect::<Vec<_>>().join(" ")
        })
    }

    /// Remove a node and its descendants from the index immediately, ahead of
    /// the next `DOMUpdate` batch — used by sandbox rewind so same-tick
    /// lookups (e.g. a test asserting `childNodes.length`) see the removal
    /// without waiting on the broadcast channel. Returns whether `node` was
    /// actually present to remove.
    pub fn remove_node_and_descendants(&mut self, node: NodeKey) -> bool {
        self.remove_recursively(node)
    }
}

/// A `DOMSubscriber` implementation that updates a shared `DomIndexState`.
#[derive(Clone)]
pub struct DomIndex {
    inner: Arc<Mutex<DomIndexState>>,
}

impl DomIndex {
    #[must_use]
    pub fn new() -> (Self, Arc<Mutex<DomIndexState>>) {
        let inner = Arc::new(Mutex::new(DomIndexState::default()));
        (Self { inner: Arc::clone(&inner) }, inner)
    }
}

impl DOMSubscriber for DomIndex {
    fn apply_update(&mut self, update: DOMUpdate) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("DomIndexState poisoned"))?;
        match update {
            DOMUpdate::InsertElement { parent, node, tag, pos: _ } => {
                state.parent_by_child.insert(node, parent);
                let siblings = state.children_by_parent.entry(parent).or_default();
                if !siblings.contains(&node) {
                    siblings.push(node);
                }
                let lower = tag.to_ascii_lowercase();
                state.tag_by_key.insert(node, lower.clone());
                let list = state.tag_index.entry(lower).or_default();
                if !list.contains(&node) {
                    list.push(node);
                }
            }
            DOMUpdate::InsertText { parent, node, text, pos: _ } => {
                state.parent_by_child.insert(node, parent);
                let siblings = state.children_by_parent.entry(parent).or_default();
                if !siblings.contains(&node) {
                    siblings.push(node);
                }
                state.text_by_key.insert(node, text);
            }
            DOMUpdate::SetAttr { node, name, value } => {
                let lower = name.to_ascii_lowercase();
                if lower == "id" {
                    if let Some(old) = state.id_by_key.insert(node, value.clone()) {
                        if matches!(state.id_index.get(&old), Some(&existing) if existing == node) {
                            state.id_index.remove(&old);
                        }
                    }
                    if value.is_empty() {
                        state.id_by_key.remove(&node);
                    } else {
                        state.id_index.insert(value, node);
                    }
                } else if lower == "class" {
                    state.set_classes_for(node, &value);
                }
            }
            DOMUpdate::UpdateText { node, text } => {
                state.text_by_key.insert(node, text);
            }
            DOMUpdate::RemoveNode { node } => {
                state.remove_recursively(node);
            }
            DOMUpdate::EndOfDocument => {}
        }
        Ok(())
    }
}

/// Shared handle to a [`DomIndexState`] for synchronous host-function lookups.
pub type SharedDomIndex = Arc<Mutex<DomIndexState>>;
