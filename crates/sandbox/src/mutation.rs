//! The per-app sandbox mutation log (spec.md §3 "Sandbox mutation log") and
//! its rewind. Every reversible side effect an app produces while its
//! sandbox is active is appended here in order; `rewind` replays the log in
//! reverse, exactly as spec.md §4.4/§8 describe.

use qiankun_js::NodeKey;
use std::collections::HashMap;

use crate::dom_index::SharedDomIndex;
use crate::values::JSValue;

/// The kind of timer a `timer-scheduled` record tracks, mirroring the four
/// timer families spec.md §4.4 calls out by name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    Interval,
    AnimationFrame,
    IdleCallback,
}

/// Where an `addEventListener` call was made against — the only two targets
/// spec.md §4.4 names (`window` and `document`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListenerTarget {
    Window,
    Document,
}

/// A single reversible side effect, one variant per bullet in spec.md §3.
#[derive(Clone, Debug)]
pub enum MutationRecord {
    /// A write to the proxied global. `prev` is `None` for `UNSET` (the key
    /// did not exist before this app wrote it) and `Some` for a prior value
    /// that must be restored.
    GlobalSet { key: String, prev: Option<JSValue> },
    /// A node inserted into the live DOM by app code.
    NodeAttached { parent: NodeKey, node: NodeKey },
    /// An event listener registered on `window` or `document`.
    ListenerAdded { target: ListenerTarget, event_type: String, listener_id: u64 },
    /// A `setTimeout`/`setInterval`/`requestAnimationFrame`/`requestIdleCallback` id.
    TimerScheduled { kind: TimerKind, id: u64 },
    /// A `<video>`/`<audio>` element that started playing.
    MediaPlaying { element: NodeKey },
}

/// Callbacks the log needs to actually reverse each record kind. Kept as a
/// small trait rather than threading every collaborator (DOM, timer table,
/// listener table) through `rewind` directly, so `MutationLog` stays a
/// plain, engine-agnostic data structure.
pub trait RewindSink {
    fn unset_global(&mut self, key: &str, prev: Option<&JSValue>);
    /// Detach `node` (and its descendants) from the live DOM. Returns
    /// whether `node` was actually still attached — `false` means the
    /// rewind couldn't fully reverse this record (spec.md §7
    /// `SandboxRewindPartial`), most often because the app itself already
    /// removed the node before unmount.
    fn detach_node(&mut self, node: NodeKey) -> bool;
    fn remove_listener(&mut self, target: ListenerTarget, event_type: &str, listener_id: u64);
    fn cancel_timer(&mut self, kind: TimerKind, id: u64);
    fn pause_media(&mut self, element: NodeKey);
}

/// Ordered, per-app log of reversible side effects.
#[derive(Default)]
pub struct MutationLog {
    records: Vec<MutationRecord>,
    /// True once a record could not be reversed (`SandboxRewindPartial`);
    /// never fatal per spec.md §7, but surfaced for diagnostics.
    partial: bool,
}

impl MutationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MutationRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Replay the log in reverse against `sink`, invariant: afterwards the
    /// sum of this app's live side effects is zero (spec.md §3 invariant,
    /// §8 property 1-3). Individual failures are absorbed and tracked via
    /// `had_partial_failure` rather than aborting the rewind.
    pub fn rewind(&mut self, sink: &mut impl RewindSink) {
        // Taken into an owned `Vec` up front rather than drained in place:
        // a record's handling below needs `&mut self` (to call
        // `mark_partial`), which a live `Drain` borrow of `self.records`
        // would conflict with.
        for record in std::mem::take(&mut self.records).into_iter().rev() {
            match record {
                MutationRecord::GlobalSet { key, prev } => sink.unset_global(&key, prev.as_ref()),
                MutationRecord::NodeAttached { node, .. } => {
                    if !sink.detach_node(node) {
                        self.mark_partial();
                    }
                }
                MutationRecord::ListenerAdded { target, event_type, listener_id } => {
                    sink.remove_listener(target, &event_type, listener_id);
                }
                MutationRecord::TimerScheduled { kind, id } => sink.cancel_timer(kind, id),
                MutationRecord::MediaPlaying { element } => sink.pause_media(element),
            }
        }
    }

    #[must_use]
    pub const fn had_partial_failure(&self) -> bool {
        self.partial
    }

    pub fn mark_partial(&mut self) {
        self.partial = true;
    }

    /// Consume the log into its raw records, preserving order. Used by
    /// `deleteProperty` to splice out a single reversed `GlobalSet` record.
    #[must_use]
    pub fn into_records(self) -> Vec<MutationRecord> {
        self.records
    }

    /// Rebuild a log from records already known to be in order.
    #[must_use]
    pub fn from_records(records: Vec<MutationRecord>) -> Self {
        Self { records, partial: false }
    }
}

/// The default `RewindSink`: removes DOM nodes through the shared DOM index
/// (so queries in the same tick observe the removal, matching
/// `qiankun_dom`'s own synchronous mutation model), drops listener/timer ids
/// from the tables the host bindings maintain, and restores (or deletes)
/// globals in the shared global-context map.
pub struct HostRewindSink<'a> {
    pub globals: &'a mut HashMap<String, JSValue>,
    pub dom_index: &'a SharedDomIndex,
    pub live_timers: &'a mut HashMap<u64, TimerKind>,
    pub live_listeners: &'a mut HashMap<u64, (ListenerTarget, String)>,
}

impl RewindSink for HostRewindSink<'_> {
    fn unset_global(&mut self, key: &str, prev: Option<&JSValue>) {
        match prev {
            Some(value) => {
                self.globals.insert(key.to_owned(), value.clone());
            }
            None => {
                self.globals.remove(key);
            }
        }
    }

    fn detach_node(&mut self, node: NodeKey) -> bool {
        self.dom_index.lock().is_ok_and(|mut index| index.remove_node_and_descendants(node))
    }

    fn remove_listener(&mut self, _target: ListenerTarget, _event_type: &str, listener_id: u64) {
        self.live_listeners.remove(&listener_id);
    }

    fn cancel_timer(&mut self, _kind: TimerKind, id: u64) {
        self.live_timers.remove(&id);
    }

    fn pause_media(&mut self, _element: NodeKey) {
        // No real `<video>`/`<audio>` playback clock in a headless runtime;
        // the record exists so a host embedding a real media backend has a
        // place to hook a pause call. Nothing to reverse here.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewind_restores_prior_global_and_removes_new_one() {
        let mut globals = HashMap::new();
        globals.insert("Y".to_owned(), JSValue::Number(1.0));
        let (_sub, dom_index) = crate::dom_index::DomIndex::new();
        let mut live_timers = HashMap::new();
        let mut live_listeners = HashMap::new();

        let mut log = MutationLog::new();
        log.push(MutationRecord::GlobalSet { key: "X".to_owned(), prev: None });
        log.push(MutationRecord::GlobalSet {
            key: "Y".to_owned(),
            prev: Some(JSValue::Number(1.0)),
        });
        globals.insert("X".to_owned(), JSValue::Number(2.0));
        globals.insert("Y".to_owned(), JSValue::Number(3.0));

        let mut sink = HostRewindSink {
            globals: &mut globals,
            dom_index: &dom_index,
            live_timers: &mut live_timers,
            live_listeners: &mut live_listeners,
        };
        log.rewind(&mut sink);

        assert!(!globals.contains_key("X"));
        assert_eq!(globals.get("Y"), Some(&JSValue::Number(1.0)));
        assert!(log.is_empty());
    }

    #[test]
    fn rewind_flags_partial_failure_when_node_already_gone() {
        let mut globals = HashMap::new();
        let (_sub, dom_index) = crate::dom_index::DomIndex::new();
        let mut live_timers = HashMap::new();
        let mut live_listeners = HashMap::new();

        let mut log = MutationLog::new();
        // Never actually inserted into the index, standing in for a node the
        // app itself already removed before its sandbox was deactivated.
        log.push(MutationRecord::NodeAttached { parent: NodeKey(0), node: NodeKey(1) });

        let mut sink = HostRewindSink {
            globals: &mut globals,
            dom_index: &dom_index,
            live_timers: &mut live_timers,
            live_listeners: &mut live_listeners,
        };
        log.rewind(&mut sink);

        assert!(log.had_partial_failure());
    }

    #[test]
    fn rewind_cancels_live_timers() {
        let mut globals = HashMap::new();
        let (_sub, dom_index) = crate::dom_index::DomIndex::new();
        let mut live_timers = HashMap::new();
        live_timers.insert(42, TimerKind::Timeout);
        let mut live_listeners = HashMap::new();

        let mut log = MutationLog::new();
        log.push(MutationRecord::TimerScheduled { kind: TimerKind::Timeout, id: 42 });

        let mut sink = HostRewindSink {
            globals: &mut globals,
            dom_index: &dom_index,
            live_timers: &mut live_timers,
            live_listeners: &mut live_listeners,
        };
        log.rewind(&mut sink);

        assert!(live_timers.is_empty());
    }
}
