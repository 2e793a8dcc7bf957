//! Engine-agnostic host bindings facade, grounded on `crates/js/src/bindings/mod.rs`:
//! a small set of value types and traits that let any JS engine adapter
//! install host namespaces (`console`, `document`, `performance`) without
//! depending on engine-specific APIs. Trimmed of the source module's
//! `chromeHost`/storage namespaces, which have no counterpart here.

use core::sync::atomic::AtomicU64;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use qiankun_fetch::AssetCache;
use qiankun_js::{DOMUpdate, NodeKey, NodeKeyManager};
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::mpsc::Sender as MpscSender;

use crate::dom_index::SharedDomIndex;
use crate::logger::HostLogger;
use crate::sandbox::{Sandbox, SingularGate};
use crate::values::{stringify_arguments, JSError, JSValue, LogLevel};

pub mod document;
pub mod lifecycle;
pub mod listeners;
pub mod net;
pub mod timers;

pub use document::build_document_namespace;
pub use lifecycle::{build_lifecycle_namespace, LifecycleOutcome, LifecycleResultRegistry};
pub use listeners::build_window_namespace;
pub use net::{build_net_namespace, FetchRegistry};
pub use timers::{build_timer_namespace, TimerRegistry};

/// Metadata tracked per script-created node between `createElement`/
/// `createTextNode` and the `appendChild` call that gives it a parent.
#[derive(Clone, Debug)]
pub enum CreatedNodeKind {
    Element { tag: String },
    Text { text: String },
}

#[derive(Clone, Debug)]
pub struct CreatedNodeInfo {
    pub kind: CreatedNodeKind,
}

type CreatedNodeMap = HashMap<NodeKey, CreatedNodeInfo>;

/// Execution context passed to every host callback. One instance per
/// mounted app; `dom_sender`/`dom_index`/`js_node_keys` are shared with the
/// streaming loader that owns the live document, `fetch_cache` is shared
/// across all apps on the same page so assets are deduplicated globally.
#[derive(Clone)]
pub struct HostContext {
    pub app_name: String,
    pub logger: Arc<dyn HostLogger>,
    pub dom_sender: MpscSender<Vec<DOMUpdate>>,
    pub js_node_keys: Arc<Mutex<NodeKeyManager<u64>>>,
    pub js_local_id_counter: Arc<AtomicU64>,
    pub js_created_nodes: Arc<Mutex<CreatedNodeMap>>,
    pub dom_index: SharedDomIndex,
    pub tokio_handle: TokioHandle,
    pub page_origin: String,
    pub fetch_cache: Arc<AssetCache>,
    pub fetch_registry: Arc<Mutex<FetchRegistry>>,
    pub timer_registry: Arc<Mutex<TimerRegistry>>,
    pub performance_start: Instant,
    /// The `<qiankun-head>` container node, if this app's entry HTML carried
    /// one (spec.md §4.6 head virtualization). `createElement` redirects
    /// head-bound nodes here instead of the document's real `<head>`.
    pub head_container: Option<NodeKey>,
    pub singular_gate: Arc<Mutex<SingularGate>>,
    /// This app's own sandbox, so host functions invoked from its script can
    /// append `MutationRecord`s (spec.md §3/§4.4) for later rewind.
    pub sandbox: Arc<Mutex<Sandbox>>,
    /// Slot the lifecycle wrapper script reports a `bootstrap`/`mount`/
    /// `unmount`/`update` outcome into; see `lifecycle.rs`.
    pub lifecycle_registry: Arc<Mutex<LifecycleResultRegistry>>,
}

pub type HostFnSync = dyn Fn(&HostContext, Vec<JSValue>) -> Result<JSValue, JSError> + Send + Sync + 'static;

#[derive(Clone)]
pub enum HostFnKind {
    Sync(Arc<HostFnSync>),
}

/// A namespaced set of functions and properties (e.g. the `console` object).
#[derive(Default)]
pub struct HostNamespace {
    pub functions: BTreeMap<String, HostFnKind>,
    pub properties: BTreeMap<String, JSValue>,
}

impl HostNamespace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sync_fn(mut self, name: &str, function: Arc<HostFnSync>) -> Self {
        self.functions.insert(name.to_owned(), HostFnKind::Sync(function));
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: &str, value: JSValue) -> Self {
        self.properties.insert(name.to_owned(), value);
        self
    }
}

/// A collection of namespaces to be installed on the sandboxed global.
#[derive(Default)]
pub struct HostBindings {
    pub namespaces: BTreeMap<String, HostNamespace>,
}

impl HostBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(mut self, name: &str, namespace: HostNamespace) -> Self {
        self.namespaces.insert(name.to_owned(), namespace);
        self
    }
}

/// Build the `console` namespace with standard logging methods.
#[must_use]
pub fn build_console_namespace() -> HostNamespace {
    let methods: [(&str, LogLevel); 4] =
        [("log", LogLevel::Info), ("info", LogLevel::Info), ("warn", LogLevel::Warn), ("error", LogLevel::Error)];

    methods.iter().fold(HostNamespace::new(), |namespace, (name, level)| {
        let level = *level;
        let function: Arc<HostFnSync> = Arc::new(move |context: &HostContext, arguments: Vec<JSValue>| {
            context.logger.log(level, &stringify_arguments(&arguments));
            Ok(JSValue::Undefined)
        });
        namespace.with_sync_fn(name, function)
    })
}

/// Build the `performance` namespace with a monotonic `now()`.
#[must_use]
pub fn build_performance_namespace() -> HostNamespace {
    let now_fn: Arc<HostFnSync> = Arc::new(|context: &HostContext, _args: Vec<JSValue>| {
        let elapsed = Instant::now().duration_since(context.performance_start);
        Ok(JSValue::Number(elapsed.as_secs_f64() * 1_000.0))
    });
    HostNamespace::new().with_sync_fn("now", now_fn).with_property("timeOrigin", JSValue::Number(0.0))
}

/// Build the default set of host bindings installed into every sandboxed
/// app's script engine: `console`, `document`, `performance`, `window`
/// (the event-listener surface spec.md §4.4 records for rewind), and
/// `net`/timer primitives used by `document`'s and `window`'s functions.
#[must_use]
pub fn build_default_bindings() -> HostBindings {
    HostBindings::new()
        .with_namespace("console", build_console_namespace())
        .with_namespace("document", build_document_namespace())
        .with_namespace("window", build_window_namespace())
        .with_namespace("performance", build_performance_namespace())
        .with_namespace("net", build_net_namespace())
        .with_namespace("timers", build_timer_namespace())
        .with_namespace("lifecycle", build_lifecycle_namespace())
}
