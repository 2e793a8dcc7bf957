//! Assembles the per-app [`HostContext`] and script engine (spec.md §4.4's
//! "real global" + bindings), grounded on
//! `crates/page_handler/src/core/state/initialization.rs`'s `JsContext`/`create_dom_mirrors`
//! helpers: that function built one `V8Engine` + `HostContext` per page;
//! this builds one per *micro-app*, since each app gets its own sandboxed
//! global rather than sharing the host page's.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use qiankun_dom::DOM;
use qiankun_fetch::AssetCache;
use qiankun_js::{JsEngine, KeySpace};
#[cfg(feature = "v8")]
use qiankun_sandbox::build_default_bindings;
use qiankun_sandbox::{ConsoleLogger, HostContext, Sandbox, SharedDomIndex, SingularGate};
use qiankun_sandbox::bindings::{FetchRegistry, LifecycleResultRegistry, TimerRegistry};
use tokio::runtime::Handle;

/// Builds the script engine for one app instance. The default
/// [`StubEngineBuilder`] never runs any script (matching
/// `qiankun_js_v8`'s default `stub` feature); enabling this crate's `v8`
/// feature swaps in [`V8EngineBuilder`], which links a real `V8Engine` per
/// app and installs the standard host bindings onto it.
pub trait EngineBuilder: Send + Sync {
    fn build(&self, host_context: &HostContext) -> anyhow::Result<Box<dyn JsEngine + Send>>;

    /// Whether the engine this builder produces can actually run app
    /// script (i.e. is a real interpreter, not the no-op stub) — backs
    /// `isRuntimeCompatible` (spec.md §6/§9 "Proxy capability absent").
    fn supports_real_sandbox(&self) -> bool {
        false
    }
}

/// The default, dependency-free engine: installs nothing, executes
/// nothing. Useful for embedding this crate purely for its lifecycle/
/// routing/sandbox bookkeeping without linking a real interpreter, and for
/// driving the test scenarios in spec.md §8 with a deterministic fake.
pub struct StubEngineBuilder;

impl EngineBuilder for StubEngineBuilder {
    fn build(&self, _host_context: &HostContext) -> anyhow::Result<Box<dyn JsEngine + Send>> {
        Ok(Box::new(qiankun_js_v8::StubEngine::new()))
    }
}

#[cfg(feature = "v8")]
pub struct V8EngineBuilder;

#[cfg(feature = "v8")]
impl EngineBuilder for V8EngineBuilder {
    fn build(&self, host_context: &HostContext) -> anyhow::Result<Box<dyn JsEngine + Send>> {
        let mut engine = qiankun_js_v8::V8Engine::new()?;
        engine.install_bindings(host_context, &build_default_bindings())?;
        Ok(Box::new(engine))
    }

    fn supports_real_sandbox(&self) -> bool {
        true
    }
}

/// Shared, page-scoped resources every app instance's [`HostContext`] is
/// built from: one DOM, one asset cache, one singular gate, one DOM index —
/// all the process-wide/page-wide pieces spec.md §3/§4.1/§4.4 describe as
/// shared rather than per-app.
pub struct PageResources {
    /// Guarded by a `tokio` mutex rather than `std`'s: loading an entry
    /// holds this across many `.await` points (every fetch, every script
    /// run), which a `std::sync::MutexGuard` can't safely do.
    pub dom: Arc<tokio::sync::Mutex<DOM>>,
    pub fetch_cache: Arc<AssetCache>,
    pub dom_index: SharedDomIndex,
    pub singular_gate: Arc<Mutex<SingularGate>>,
    pub tokio_handle: Handle,
    pub page_origin: String,
    /// Mints a fresh, app-scoped [`qiankun_js::NodeKeyManager`] per app so
    /// script-created node ids from different apps never collide even
    /// though each app's `HostContext` only sees its own manager.
    pub key_space: Arc<Mutex<KeySpace>>,
    /// The host document's own `<head>`, used as C6's virtualization target
    /// for every app's diverted `<style>`/`<link>` tags. `None` if the
    /// embedder has no head node to divert into.
    pub head: Option<qiankun_js::NodeKey>,
}

/// Everything spun up for one app instance's sandboxed execution: the
/// [`HostContext`] host functions close over, plus the registries it
/// references (kept alongside so the controller can read them back for
/// test hooks like "pending timer count").
pub struct AppHost {
    pub host_context: HostContext,
    pub timer_registry: Arc<Mutex<TimerRegistry>>,
    pub fetch_registry: Arc<Mutex<FetchRegistry>>,
    pub lifecycle_registry: Arc<Mutex<LifecycleResultRegistry>>,
}

/// Build the per-app [`HostContext`] (spec.md §4.4), wiring `sandbox` and
/// `head_container` in so host functions can record mutations and redirect
/// head-bound insertions respectively.
pub fn build_app_host(
    page: &PageResources,
    app_name: &str,
    sandbox: Arc<Mutex<Sandbox>>,
    head_container: Option<qiankun_js::NodeKey>,
    dom_sender: tokio::sync::mpsc::Sender<Vec<qiankun_js::DOMUpdate>>,
) -> AppHost {
    let timer_registry = Arc::new(Mutex::new(TimerRegistry::default()));
    let fetch_registry = Arc::new(Mutex::new(FetchRegistry::default()));
    let lifecycle_registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
    let node_key_manager = page
        .key_space
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .register_manager::<u64>();

    let host_context = HostContext {
        app_name: app_name.to_owned(),
        logger: Arc::new(ConsoleLogger),
        dom_sender,
        js_node_keys: Arc::new(Mutex::new(node_key_manager)),
        js_local_id_counter: Arc::new(AtomicU64::new(0)),
        js_created_nodes: Arc::new(Mutex::new(std::collections::HashMap::new())),
        dom_index: Arc::clone(&page.dom_index),
        tokio_handle: page.tokio_handle.clone(),
        page_origin: page.page_origin.clone(),
        fetch_cache: Arc::clone(&page.fetch_cache),
        fetch_registry: Arc::clone(&fetch_registry),
        timer_registry: Arc::clone(&timer_registry),
        performance_start: std::time::Instant::now(),
        head_container,
        singular_gate: Arc::clone(&page.singular_gate),
        sandbox,
        lifecycle_registry: Arc::clone(&lifecycle_registry),
    };

    AppHost { host_context, timer_registry, fetch_registry, lifecycle_registry }
}
