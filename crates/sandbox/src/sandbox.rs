//! C4: the per-app sandbox. Implements spec.md §4.4/§9's redesign guidance
//! verbatim — "class inheritance in sandbox variants → tagged variants" — as
//! a plain enum over `ProxySandbox` and `SnapshotSandbox` rather than a
//! class hierarchy or trait object; both share the mutation-log rewind
//! machinery in [`crate::mutation`].
//!
//! There is no mutable global `window` to monkey-patch in a headless Rust
//! process, so "the real global" spec.md describes is `globalContext`: a
//! shared `HashMap<String, JSValue>` the caller may seed (the `globalContext`
//! configuration item in spec.md §6) or leave empty. `ProxySandbox` answers
//! `get`/`has` against its own local overrides first, falling back to
//! `globalContext`, exactly as spec.md §4.4's four `get`/`set`/`has`/`delete`
//! bullets describe. `SnapshotSandbox` is the loose-mode fallback: it writes
//! straight through to `globalContext` and restores a snapshot on
//! deactivation instead of tracking per-key deltas.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use qiankun_js::NodeKey;

use crate::dom_index::SharedDomIndex;
use crate::mutation::{HostRewindSink, ListenerTarget, MutationLog, MutationRecord, TimerKind};
use crate::values::JSValue;

/// Shared backing for the "real global" every sandbox instance is proxying.
pub type GlobalContext = Arc<Mutex<HashMap<String, JSValue>>>;

#[must_use]
pub fn new_global_context() -> GlobalContext {
    Arc::new(Mutex::new(HashMap::new()))
}

/// The full-fidelity sandbox: sandbox-local writes never touch the real
/// global, so two `singular = false` apps can each believe they own `window`.
pub struct ProxySandbox {
    name: String,
    local: HashMap<String, JSValue>,
    global: GlobalContext,
    latest_set_prop: Option<String>,
    log: MutationLog,
    live_timers: HashMap<u64, TimerKind>,
    live_listeners: HashMap<u64, (ListenerTarget, String)>,
    dom_index: SharedDomIndex,
}

impl ProxySandbox {
    fn new(name: String, global: GlobalContext, dom_index: SharedDomIndex) -> Self {
        Self {
            name,
            local: HashMap::new(),
            global,
            latest_set_prop: None,
            log: MutationLog::new(),
            live_timers: HashMap::new(),
            live_listeners: HashMap::new(),
            dom_index,
        }
    }

    /// `get(key)`: sandbox-local assignment wins, else fall back to the real
    /// global (spec.md §4.4 bullet 1).
    fn get(&self, key: &str) -> JSValue {
        self.local
            .get(key)
            .cloned()
            .or_else(|| self.global.lock().ok()?.get(key).cloned())
            .unwrap_or(JSValue::Undefined)
    }

    /// `set(key, value)`: record a reversible `global-set` the first time
    /// this app touches `key`, then write to the sandbox-local store only —
    /// the real global is never mutated (spec.md §4.4 bullet 2).
    fn set(&mut self, key: &str, value: JSValue) {
        if !self.local.contains_key(key) {
            let prev = self.global.lock().ok().and_then(|g| g.get(key).cloned());
            self.log.push(MutationRecord::GlobalSet { key: key.to_owned(), prev });
        }
        self.local.insert(key.to_owned(), value);
        self.latest_set_prop = Some(key.to_owned());
    }

    fn has(&self, key: &str) -> bool {
        self.local.contains_key(key) || self.global.lock().is_ok_and(|g| g.contains_key(key))
    }

    /// `deleteProperty`: only sandbox-local keys can be deleted; reverses the
    /// recorded set immediately instead of waiting for rewind.
    fn delete_property(&mut self, key: &str) -> bool {
        if self.local.remove(key).is_none() {
            return false;
        }
        // The set is now reversed; drop its pending rewind record so a
        // later `rewind()` doesn't try to restore a value the app itself
        // already retracted.
        let mut kept = Vec::new();
        let mut removed_once = false;
        for record in std::mem::take(&mut self.log).into_records() {
            if !removed_once {
                if let MutationRecord::GlobalSet { key: rec_key, .. } = &record {
                    if rec_key == key {
                        removed_once = true;
                        continue;
                    }
                }
            }
            kept.push(record);
        }
        self.log = MutationLog::from_records(kept);
        true
    }
}

/// The loose-mode fallback (spec.md §4.4 "Fallback (loose) mode" and §9's
/// redesign note): writes go straight to `globalContext`; a shallow snapshot
/// is diffed/restored instead of tracking a local overlay. Forces
/// `singular = true` at the controller level since two apps sharing one
/// real global can't coexist without a real proxy.
pub struct SnapshotSandbox {
    name: String,
    global: GlobalContext,
    snapshot: Option<HashMap<String, JSValue>>,
    latest_set_prop: Option<String>,
    log: MutationLog,
    live_timers: HashMap<u64, TimerKind>,
    live_listeners: HashMap<u64, (ListenerTarget, String)>,
    dom_index: SharedDomIndex,
}

impl SnapshotSandbox {
    fn new(name: String, global: GlobalContext, dom_index: SharedDomIndex) -> Self {
        Self {
            name,
            global,
            snapshot: None,
            latest_set_prop: None,
            log: MutationLog::new(),
            live_timers: HashMap::new(),
            live_listeners: HashMap::new(),
            dom_index,
        }
    }

    fn get(&self, key: &str) -> JSValue {
        self.global.lock().ok().and_then(|g| g.get(key).cloned()).unwrap_or(JSValue::Undefined)
    }

    fn set(&mut self, key: &str, value: JSValue) {
        self.latest_set_prop = Some(key.to_owned());
        if let Ok(mut global) = self.global.lock() {
            global.insert(key.to_owned(), value);
        }
    }

    fn has(&self, key: &str) -> bool {
        self.global.lock().is_ok_and(|g| g.contains_key(key))
    }

    fn delete_property(&mut self, key: &str) -> bool {
        self.global.lock().is_ok_and(|mut g| g.remove(key).is_some())
    }
}

/// The tagged union spec.md §9 asks for in place of a `ProxySandbox` /
/// `LegacySandbox` / `SnapshotSandbox` class hierarchy.
pub enum Sandbox {
    Proxy(ProxySandbox),
    Snapshot(SnapshotSandbox),
}

impl Sandbox {
    /// Build a full-fidelity proxy sandbox.
    #[must_use]
    pub fn proxy(name: impl Into<String>, global: GlobalContext, dom_index: SharedDomIndex) -> Self {
        Self::Proxy(ProxySandbox::new(name.into(), global, dom_index))
    }

    /// Build the loose-mode snapshot sandbox (no working `Proxy` equivalent,
    /// or the caller disabled the real sandbox — spec.md §4.4/§9).
    #[must_use]
    pub fn snapshot(name: impl Into<String>, global: GlobalContext, dom_index: SharedDomIndex) -> Self {
        Self::Snapshot(SnapshotSandbox::new(name.into(), global, dom_index))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Proxy(sandbox) => &sandbox.name,
            Self::Snapshot(sandbox) => &sandbox.name,
        }
    }

    /// True for [`SnapshotSandbox`] — callers use this to force `singular`.
    #[must_use]
    pub const fn is_loose(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> JSValue {
        match self {
            Self::Proxy(sandbox) => sandbox.get(key),
            Self::Snapshot(sandbox) => sandbox.get(key),
        }
    }

    pub fn set(&mut self, key: &str, value: JSValue) {
        match self {
            Self::Proxy(sandbox) => sandbox.set(key, value),
            Self::Snapshot(sandbox) => sandbox.set(key, value),
        }
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        match self {
            Self::Proxy(sandbox) => sandbox.has(key),
            Self::Snapshot(sandbox) => sandbox.has(key),
        }
    }

    pub fn delete_property(&mut self, key: &str) -> bool {
        match self {
            Self::Proxy(sandbox) => sandbox.delete_property(key),
            Self::Snapshot(sandbox) => sandbox.delete_property(key),
        }
    }

    /// The last key written to this sandbox's global — how the streaming
    /// loader (C3) detects an entry script's exported library name (spec.md
    /// §4.2/§4.3, testable property 6).
    #[must_use]
    pub fn latest_set_prop(&self) -> Option<&str> {
        match self {
            Self::Proxy(sandbox) => sandbox.latest_set_prop.as_deref(),
            Self::Snapshot(sandbox) => sandbox.latest_set_prop.as_deref(),
        }
    }

    fn log_mut(&mut self) -> &mut MutationLog {
        match self {
            Self::Proxy(sandbox) => &mut sandbox.log,
            Self::Snapshot(sandbox) => &mut sandbox.log,
        }
    }

    pub fn record_node_attached(&mut self, parent: NodeKey, node: NodeKey) {
        self.log_mut().push(MutationRecord::NodeAttached { parent, node });
    }

    pub fn record_listener_added(&mut self, target: ListenerTarget, event_type: impl Into<String>, listener_id: u64) {
        let event_type = event_type.into();
        match self {
            Self::Proxy(sandbox) => {
                sandbox.live_listeners.insert(listener_id, (target, event_type.clone()));
            }
            Self::Snapshot(sandbox) => {
                sandbox.live_listeners.insert(listener_id, (target, event_type.clone()));
            }
        }
        self.log_mut().push(MutationRecord::ListenerAdded { target, event_type, listener_id });
    }

    pub fn record_timer_scheduled(&mut self, kind: TimerKind, id: u64) {
        match self {
            Self::Proxy(sandbox) => {
                sandbox.live_timers.insert(id, kind);
            }
            Self::Snapshot(sandbox) => {
                sandbox.live_timers.insert(id, kind);
            }
        }
        self.log_mut().push(MutationRecord::TimerScheduled { kind, id });
    }

    pub fn record_media_playing(&mut self, element: NodeKey) {
        self.log_mut().push(MutationRecord::MediaPlaying { element });
    }

    /// Number of timer handles this app still owns — testable property 3.
    #[must_use]
    pub fn live_timer_count(&self) -> usize {
        match self {
            Self::Proxy(sandbox) => sandbox.live_timers.len(),
            Self::Snapshot(sandbox) => sandbox.live_timers.len(),
        }
    }

    /// Drop a timer the app itself cleared (`clearTimeout`/`clearInterval`/…)
    /// before unmount. The mutation-log record is left in place — rewind's
    /// `cancel_timer` is idempotent against an already-cleared id — only the
    /// live-count bookkeeping used by `live_timer_count` is updated.
    pub fn clear_timer(&mut self, id: u64) {
        match self {
            Self::Proxy(sandbox) => {
                sandbox.live_timers.remove(&id);
            }
            Self::Snapshot(sandbox) => {
                sandbox.live_timers.remove(&id);
            }
        }
    }

    /// `active()`: for [`SnapshotSandbox`], take the shallow snapshot
    /// spec.md's fallback-mode bullet describes.
    pub fn activate(&mut self) {
        if let Self::Snapshot(sandbox) = self {
            sandbox.snapshot = sandbox.global.lock().ok().map(|g| g.clone());
        }
    }

    /// `inactive()`: rewind the mutation log (DOM/listener/timer/media
    /// records common to both variants), and for [`SnapshotSandbox`] also
    /// diff-and-restore the real global against the activation snapshot.
    /// Returns whether any record could not be cleanly reversed
    /// (`SandboxRewindPartial`, never fatal per spec.md §7).
    pub fn deactivate(&mut self) -> bool {
        match self {
            Self::Proxy(sandbox) => {
                // Real global is never touched by sandbox writes, so there is
                // nothing to unset on it; `unset_global` here only exists to
                // satisfy `RewindSink` and operates on a throwaway scratch map.
                let mut scratch = HashMap::new();
                let mut sink = HostRewindSink {
                    globals: &mut scratch,
                    dom_index: &sandbox.dom_index,
                    live_timers: &mut sandbox.live_timers,
                    live_listeners: &mut sandbox.live_listeners,
                };
                sandbox.log.rewind(&mut sink);
                sandbox.local.clear();
                sandbox.log.had_partial_failure()
            }
            Self::Snapshot(sandbox) => {
                let Some(snapshot) = sandbox.snapshot.take() else {
                    return true;
                };
                if let Ok(mut global) = sandbox.global.lock() {
                    *global = snapshot;
                }
                let mut scratch = HashMap::new();
                let mut sink = HostRewindSink {
                    globals: &mut scratch,
                    dom_index: &sandbox.dom_index,
                    live_timers: &mut sandbox.live_timers,
                    live_listeners: &mut sandbox.live_listeners,
                };
                sandbox.log.rewind(&mut sink);
                sandbox.log.had_partial_failure()
            }
        }
    }
}

/// Coordinates which sandbox is allowed to be active when `singular = true`
/// (spec.md §4.4 "Multi-instance gating"): activating a second sandbox
/// returns the name of the incumbent the caller must deactivate first. Owned
/// by the lifecycle controller (C7), not by any one `Sandbox`, since gating
/// is a cross-app policy rather than a per-app concern.
#[derive(Default)]
pub struct SingularGate {
    incumbent: Option<String>,
}

impl SingularGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` as about to activate. Returns the previous incumbent's
    /// name if one is still recorded and it isn't `name` itself.
    pub fn claim(&mut self, name: &str) -> Option<String> {
        let previous = self.incumbent.take();
        self.incumbent = Some(name.to_owned());
        previous.filter(|incumbent| incumbent != name)
    }

    pub fn release(&mut self, name: &str) {
        if self.incumbent.as_deref() == Some(name) {
            self.incumbent = None;
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.incumbent.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom_index::DomIndex;

    fn harness() -> (GlobalContext, SharedDomIndex) {
        let (_sub, dom_index) = DomIndex::new();
        (new_global_context(), dom_index)
    }

    #[test]
    fn proxy_set_never_touches_real_global() {
        let (global, dom_index) = harness();
        let mut sandbox = Sandbox::proxy("app-a", Arc::clone(&global), dom_index);
        sandbox.set("X", JSValue::Number(1.0));
        assert_eq!(sandbox.get("X"), JSValue::Number(1.0));
        assert!(!global.lock().unwrap().contains_key("X"));
        assert_eq!(sandbox.latest_set_prop(), Some("X"));
    }

    #[test]
    fn proxy_deactivate_rewinds_global_set_and_clears_has() {
        let (global, dom_index) = harness();
        let mut sandbox = Sandbox::proxy("app-a", Arc::clone(&global), dom_index);
        sandbox.set("X", JSValue::Number(1.0));
        assert!(sandbox.has("X"));
        let partial = sandbox.deactivate();
        assert!(!partial);
        assert!(!sandbox.has("X"));
    }

    #[test]
    fn snapshot_sandbox_writes_through_and_restores_on_deactivate() {
        let (global, dom_index) = harness();
        let mut sandbox = Sandbox::snapshot("app-a", Arc::clone(&global), dom_index);
        sandbox.activate();
        sandbox.set("X", JSValue::Number(1.0));
        assert!(global.lock().unwrap().contains_key("X"));
        sandbox.deactivate();
        assert!(!global.lock().unwrap().contains_key("X"));
    }

    #[test]
    fn singular_gate_returns_incumbent_for_a_different_app() {
        let mut gate = SingularGate::new();
        assert_eq!(gate.claim("a"), None);
        assert_eq!(gate.claim("b"), Some("a".to_owned()));
        gate.release("a");
        assert_eq!(gate.current(), Some("b"));
    }

    #[test]
    fn delete_property_cancels_pending_rewind() {
        let (global, dom_index) = harness();
        let mut sandbox = Sandbox::proxy("app-a", global, dom_index);
        sandbox.set("X", JSValue::Number(1.0));
        assert!(sandbox.delete_property("X"));
        assert!(!sandbox.has("X"));
    }
}
