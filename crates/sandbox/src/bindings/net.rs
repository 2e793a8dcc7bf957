//! The sandboxed `fetch`/XHR surface (spec.md §4.4 line "bound if it's a
//! method that would fail when `this` differs (e.g., `fetch`...)"): app
//! script never gets a raw `reqwest` handle, it polls a registry entry the
//! host fills in once the asset has been fetched through the same
//! process-wide [`qiankun_fetch::AssetCache`] C1 uses, so an app's own
//! `fetch()` calls benefit from the same in-flight dedup and permanent cache
//! as entry/asset loading. Grounded on `crates/js/src/bindings/net.rs`'s
//! request/poll registry shape, adapted to delegate to `qiankun_fetch`
//! instead of issuing `reqwest` calls directly.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use super::{HostContext, HostFnSync, HostNamespace};
use crate::values::{JSError, JSValue};

#[derive(Clone, Debug)]
pub struct FetchDone {
    pub status: u16,
    pub ok: bool,
    pub body_text: String,
    pub url: String,
    pub error: Option<String>,
}

#[derive(Clone, Debug)]
pub enum FetchEntry {
    Pending,
    Done(FetchDone),
}

#[derive(Debug, Default)]
pub struct FetchRegistry {
    next_id: u64,
    entries: HashMap<u64, FetchEntry>,
}

impl FetchRegistry {
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.next_id
    }
}

#[must_use]
pub fn build_net_namespace() -> HostNamespace {
    HostNamespace::new().with_sync_fn("request", build_net_request()).with_sync_fn("poll", build_net_poll())
}

/// `net.request(url)`: starts an async fetch through the shared asset cache,
/// returns an opaque request id to poll.
fn build_net_request() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("net.request(url) requires 1 argument")));
        }
        let url_str = match &args[0] {
            JSValue::String(string_value) => string_value.clone(),
            _ => return Err(JSError::TypeError(String::from("url must be a string"))),
        };
        let url = Url::parse(&url_str).map_err(|_| JSError::TypeError(format!("invalid URL: {url_str}")))?;

        let id = {
            let mut registry =
                context.fetch_registry.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
            let id = registry.allocate_id();
            registry.entries.insert(id, FetchEntry::Pending);
            id
        };

        let cache = Arc::clone(&context.fetch_cache);
        let registry = Arc::clone(&context.fetch_registry);
        context.tokio_handle.spawn(async move {
            let done = match cache.fetch_text(&url).await {
                Ok(asset) => FetchDone { status: 200, ok: true, body_text: asset.body.clone(), url: url.to_string(), error: None },
                Err(error) => FetchDone { status: 0, ok: false, body_text: String::new(), url: url.to_string(), error: Some(error.to_string()) },
            };
            if let Ok(mut registry) = registry.lock() {
                registry.entries.insert(id, FetchEntry::Done(done));
            }
        });

        Ok(JSValue::String(id.to_string()))
    })
}

/// `net.poll(id)`: returns `"pending"`, or the response body on success, or
/// an error string prefixed with `"error:"`.
fn build_net_poll() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.is_empty() {
            return Err(JSError::TypeError(String::from("net.poll(id) requires 1 argument")));
        }
        let id: u64 = match &args[0] {
            JSValue::String(string_value) => {
                string_value.parse().map_err(|_| JSError::TypeError(String::from("invalid id")))?
            }
            _ => return Err(JSError::TypeError(String::from("id must be a string"))),
        };
        let registry = context.fetch_registry.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        Ok(match registry.entries.get(&id) {
            None => JSValue::String(String::from("error:unknown id")),
            Some(FetchEntry::Pending) => JSValue::String(String::from("pending")),
            Some(FetchEntry::Done(done)) if done.ok => JSValue::String(done.body_text.clone()),
            Some(FetchEntry::Done(done)) => {
                JSValue::String(format!("error:{}", done.error.as_deref().unwrap_or("fetch failed")))
            }
        })
    })
}
