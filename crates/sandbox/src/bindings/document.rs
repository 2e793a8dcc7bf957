//! The `document` namespace: DOM creation/mutation/query functions exposed
//! to sandboxed app script, grounded on `crates/js/src/bindings/document.rs`.
//! Trimmed of that module's storage/chrome-host functions (no counterpart
//! here); adds `MutationLog` recording on every insertion so rewind can undo
//! app-attached nodes (spec.md §4.4 bullet "node-attached"), and head
//! redirection for script/link/style elements (spec.md §4.4's
//! `createElement` bullet, §4.6 head virtualization).

use core::sync::atomic::Ordering;
use std::sync::Arc;

use qiankun_js::{DOMUpdate, NodeKey};

use super::listeners::{build_add_listener, build_remove_listener};
use super::{CreatedNodeInfo, CreatedNodeKind, HostContext, HostFnSync, HostNamespace};
use crate::mutation::ListenerTarget;
use crate::values::{JSError, JSValue};

fn parse_string(value: &JSValue, name: &str) -> Result<String, JSError> {
    match value {
        JSValue::String(string_value) => Ok(string_value.clone()),
        _ => Err(JSError::TypeError(format!("{name} must be a string"))),
    }
}

fn parse_key(value: &JSValue, name: &str) -> Result<NodeKey, JSError> {
    match value {
        JSValue::String(string_value) => {
            let raw = string_value
                .parse::<u64>()
                .map_err(|_| JSError::TypeError(format!("{name} must be a decimal string (NodeKey)")))?;
            Ok(NodeKey(raw))
        }
        _ => Err(JSError::TypeError(format!("{name} must be a decimal string (NodeKey)"))),
    }
}

fn mint_key(context: &HostContext) -> Result<NodeKey, JSError> {
    let local_id = context.js_local_id_counter.fetch_add(1, Ordering::Relaxed) + 1;
    let mut manager =
        context.js_node_keys.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
    Ok(manager.key_of(local_id))
}

/// Tags spec.md §4.4 redirects into the app's `<qiankun-head>` container when
/// they're later appended into a head-like location, matching C2's own
/// `link`/`style`/`script` rewrite set.
const HEAD_BOUND_TAGS: [&str; 3] = ["script", "link", "style"];

#[must_use]
pub fn build_document_namespace() -> HostNamespace {
    HostNamespace::new()
        .with_sync_fn("createElement", build_create_element())
        .with_sync_fn("createTextNode", build_create_text_node())
        .with_sync_fn("appendChild", build_append_child())
        .with_sync_fn("removeNode", build_remove_node())
        .with_sync_fn("getElementById", build_get_element_by_id())
        .with_sync_fn("getElementsByTagName", build_get_elements_by_tag_name())
        .with_sync_fn("getElementsByClassName", build_get_elements_by_class_name())
        .with_sync_fn("querySelector", build_query_selector())
        .with_sync_fn("setTextContent", build_set_text_content())
        .with_sync_fn("getTextContent", build_get_text_content())
        .with_sync_fn("setAttribute", build_set_attribute())
        .with_sync_fn("getAttribute", build_get_attribute())
        .with_sync_fn("addEventListener", build_add_listener(ListenerTarget::Document))
        .with_sync_fn("removeEventListener", build_remove_listener())
}

fn build_create_element() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("createElement(tag) requires 1 argument")));
        }
        let tag = parse_string(&args[0], "tag")?;
        let node_key = mint_key(context)?;
        if let Ok(mut created) = context.js_created_nodes.lock() {
            created.insert(node_key, CreatedNodeInfo { kind: CreatedNodeKind::Element { tag: tag.clone() } });
        }
        Ok(JSValue::String(node_key.0.to_string()))
    })
}

fn build_create_text_node() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("createTextNode(text) requires 1 argument")));
        }
        let text = parse_string(&args[0], "text")?;
        let node_key = mint_key(context)?;
        if let Ok(mut created) = context.js_created_nodes.lock() {
            created.insert(node_key, CreatedNodeInfo { kind: CreatedNodeKind::Text { text } });
        }
        Ok(JSValue::String(node_key.0.to_string()))
    })
}

/// `appendChild(parentKey, childKey)`. Redirects head-bound tags appended
/// anywhere under the document head into `head_container`, and records a
/// `node-attached` mutation for rewind on unmount.
fn build_append_child() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.len() < 2 {
            return Err(JSError::TypeError(String::from("appendChild(parentKey, childKey) requires 2 arguments")));
        }
        let requested_parent = parse_key(&args[0], "parentKey")?;
        let child_key = parse_key(&args[1], "childKey")?;

        let meta = context.js_created_nodes.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        let info = meta
            .get(&child_key)
            .ok_or_else(|| JSError::TypeError(String::from("unknown childKey; create a node first")))?
            .clone();
        drop(meta);

        let is_head_bound = matches!(&info.kind, CreatedNodeKind::Element { tag } if HEAD_BOUND_TAGS.contains(&tag.as_str()));
        let target_parent = if is_head_bound {
            context.head_container.unwrap_or(requested_parent)
        } else {
            requested_parent
        };

        let update = match &info.kind {
            CreatedNodeKind::Element { tag } => {
                DOMUpdate::InsertElement { parent: target_parent, node: child_key, tag: tag.clone(), pos: usize::MAX }
            }
            CreatedNodeKind::Text { text } => {
                DOMUpdate::InsertText { parent: target_parent, node: child_key, text: text.clone(), pos: usize::MAX }
            }
        };
        context
            .dom_sender
            .try_send(vec![update])
            .map_err(|error| JSError::InternalError(format!("failed to send DOM update: {error}")))?;

        if let Ok(mut sandbox) = context.sandbox.lock() {
            sandbox.record_node_attached(target_parent, child_key);
        }
        Ok(JSValue::Undefined)
    })
}

fn build_remove_node() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("removeNode(nodeKey) requires 1 argument")));
        }
        let node_key = parse_key(&args[0], "nodeKey")?;
        context
            .dom_sender
            .try_send(vec![DOMUpdate::RemoveNode { node: node_key }])
            .map_err(|error| JSError::InternalError(format!("failed to send DOM update: {error}")))?;
        if let Ok(mut index) = context.dom_index.lock() {
            index.remove_node_and_descendants(node_key);
        }
        Ok(JSValue::Undefined)
    })
}

fn build_get_element_by_id() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("getElementById(id) requires 1 argument")));
        }
        let id = parse_string(&args[0], "id")?;
        let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        Ok(guard.get_element_by_id(&id).map_or(JSValue::Null, |key| JSValue::String(key.0.to_string())))
    })
}

fn build_get_elements_by_tag_name() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("getElementsByTagName(name) requires 1 argument")));
        }
        let name = parse_string(&args[0], "name")?;
        let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        let nodes = guard.get_elements_by_tag_name(NodeKey::ROOT, &name);
        Ok(JSValue::String(nodes.into_iter().map(|key| key.0.to_string()).collect::<Vec<_>>().join(" ")))
    })
}

fn build_get_elements_by_class_name() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("getElementsByClassName(name) requires 1 argument")));
        }
        let name = parse_string(&args[0], "name")?;
        let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        let nodes = guard.get_elements_by_class_name(NodeKey::ROOT, &name);
        Ok(JSValue::String(nodes.into_iter().map(|key| key.0.to_string()).collect::<Vec<_>>().join(" ")))
    })
}

/// Minimal `#id` / `.class` / `tag` support — matches `document.rs`'s own
/// `querySelector` simplification, sufficient for entry-HTML lookups.
fn build_query_selector() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("querySelector(selector) requires 1 argument")));
        }
        let selector = parse_string(&args[0], "selector")?;
        let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        let found = selector.strip_prefix('#').map_or_else(
            || {
                selector.strip_prefix('.').map_or_else(
                    || guard.get_elements_by_tag_name(NodeKey::ROOT, &selector).into_iter().next(),
                    |class| guard.get_elements_by_class_name(NodeKey::ROOT, class).into_iter().next(),
                )
            },
            |id| guard.get_element_by_id(id),
        );
        Ok(found.map_or(JSValue::Null, |key| JSValue::String(key.0.to_string())))
    })
}

fn build_set_text_content() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.len() < 2 {
            return Err(JSError::TypeError(String::from("setTextContent(nodeKey, text) requires 2 arguments")));
        }
        let element_key = parse_key(&args[0], "nodeKey")?;
        let text = parse_string(&args[1], "text")?;

        let existing_children = {
            let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
            guard.children_of(element_key)
        };
        let text_key = mint_key(context)?;

        let mut updates = Vec::with_capacity(existing_children.len() + 1);
        for child in existing_children {
            updates.push(DOMUpdate::RemoveNode { node: child });
        }
        updates.push(DOMUpdate::InsertText { parent: element_key, node: text_key, text, pos: 0 });
        context
            .dom_sender
            .try_send(updates)
            .map_err(|error| JSError::InternalError(format!("failed to send DOM update: {error}")))?;
        Ok(JSValue::Undefined)
    })
}

fn build_get_text_content() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("getTextContent(nodeKey) requires 1 argument")));
        }
        let node_key = parse_key(&args[0], "nodeKey")?;
        let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        Ok(JSValue::String(guard.get_text_content(node_key)))
    })
}

fn build_set_attribute() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.len() < 3 {
            return Err(JSError::TypeError(String::from("setAttribute(nodeKey, name, value) requires 3 arguments")));
        }
        let node_key = parse_key(&args[0], "nodeKey")?;
        let name = parse_string(&args[1], "name")?;
        let value = parse_string(&args[2], "value")?;
        context
            .dom_sender
            .try_send(vec![DOMUpdate::SetAttr { node: node_key, name, value }])
            .map_err(|error| JSError::InternalError(format!("failed to send DOM update: {error}")))?;
        Ok(JSValue::Undefined)
    })
}

fn build_get_attribute() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.len() < 2 {
            return Err(JSError::TypeError(String::from("getAttribute(nodeKey, name) requires 2 arguments")));
        }
        let node_key = parse_key(&args[0], "nodeKey")?;
        let name = parse_string(&args[1], "name")?;
        let guard = context.dom_index.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        let value = match name.to_ascii_lowercase().as_str() {
            "id" => guard.id_of(node_key).unwrap_or_default().to_owned(),
            "class" => guard.class_list_of(node_key),
            // General attribute storage lives on the arena DOM itself, which
            // host functions reach only through `dom_sender` (write-only
            // from script's perspective); the index mirrors id/class alone.
            _ => return Ok(JSValue::Undefined),
        };
        Ok(JSValue::String(value))
    })
}
