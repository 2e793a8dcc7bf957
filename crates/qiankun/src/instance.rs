//! One registered app's live state: status, sandbox, resolved entry, and
//! the phase promises spec.md §4.7 memoizes per app instance, grounded on
//! `crates/page_handler/src/runtime.rs`'s per-page `HtmlPage` bookkeeping —
//! that struct tracked one page's DOM/sandbox/status together; this tracks
//! one *app*'s, since a page here can host several.

use std::sync::{Arc, Mutex};

use qiankun_js::{JsEngine, NodeKey};
use qiankun_sandbox::{DeferredScriptQueue, Sandbox};
use serde_json::Value;

use crate::app::AppConfig;
use crate::host::AppHost;
use crate::phase::PhasePromise;
use crate::status::AppStatus;

/// Everything the controller (C7) tracks for one registered app between
/// `register_micro_apps` and the app being dropped from the registry.
pub struct AppInstance {
    pub config: AppConfig,
    pub status: AppStatus,
    pub sandbox: Arc<Mutex<Sandbox>>,
    pub engine: Box<dyn JsEngine + Send>,
    pub host: AppHost,
    pub deferred_queue: DeferredScriptQueue,
    /// The app's container element, emptied on unmount and repopulated on
    /// the next mount (spec.md §4.3 "relocate body content into container").
    pub container: NodeKey,
    /// `globalThis[library_name]` once the entry has resolved.
    pub library_name: Option<String>,
    pub has_update: bool,
    pub load_promise: PhasePromise,
    pub mount_promise: PhasePromise,
    pub unmount_promise: PhasePromise,
    /// Set when `unmount_app` is called while this instance is still
    /// `MOUNTING`: there is no in-flight mount to cancel, so the unmount is
    /// queued here and carried out by `mount_app` itself once `mount`
    /// settles (spec.md §4.7 "unmount must complete before the controller
    /// considers the container free").
    pub pending_unmount: bool,
    /// Props most recently passed to `mount`/`update`, merged with `name`
    /// (the only controller-injected helper reachable from sandboxed
    /// script; see [`crate::controller::LifecycleController::merged_props`]).
    pub last_props: Value,
}

impl AppInstance {
    pub fn new(
        config: AppConfig,
        sandbox: Arc<Mutex<Sandbox>>,
        engine: Box<dyn JsEngine + Send>,
        host: AppHost,
        container: NodeKey,
    ) -> Self {
        let props = config.props.clone();
        Self {
            config,
            status: AppStatus::NotLoaded,
            sandbox,
            engine,
            host,
            deferred_queue: DeferredScriptQueue::new(),
            container,
            library_name: None,
            has_update: false,
            load_promise: PhasePromise::new(),
            mount_promise: PhasePromise::new(),
            unmount_promise: PhasePromise::new(),
            pending_unmount: false,
            last_props: props,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Reset the mount/unmount promises ahead of a fresh phase, keeping the
    /// load promise (load only ever happens once per instance, spec.md
    /// §4.7's "loaded is memoized forever").
    pub fn reset_for_remount(&mut self) {
        self.mount_promise.reset();
        self.unmount_promise.reset();
        self.pending_unmount = false;
    }
}
