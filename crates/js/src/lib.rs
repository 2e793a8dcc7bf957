//! Shared, engine-agnostic primitives used across the runtime: stable node
//! keys, the `DOMUpdate` wire format, the subscriber/mirror pattern used to
//! fan updates out to interested subsystems, and the `JsEngine` trait that
//! decouples lifecycle/sandbox code from any particular script engine.

use anyhow::Result;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};

/// A minimal interface for evaluating JavaScript against a sandboxed global.
/// Kept small so engines can be swapped (a real V8 engine, or a stub used
/// when the `v8` feature is unavailable).
pub trait JsEngine {
    /// Evaluate a classic script.
    ///
    /// # Errors
    /// Returns an error if the script throws or fails to compile.
    fn eval_script(&mut self, source: &str, url: &str) -> Result<()>;
    /// Evaluate a bundled ES-module body (side-effect-only; see
    /// `qiankun_sandbox::modules`).
    ///
    /// # Errors
    /// Returns an error if the module throws or fails to compile.
    fn eval_module(&mut self, source: &str, url: &str) -> Result<()>;
    /// Run pending microtasks/jobs until idle.
    ///
    /// # Errors
    /// Returns an error if a queued job throws.
    fn run_jobs(&mut self) -> Result<()>;

    /// The most recent own-property key added to the global object by the
    /// last `eval_script`/`eval_module` call, if any — how the loader finds
    /// a micro-app's exported library when its entry script does a bare
    /// `window[name] = {...}` rather than going through a host-bound
    /// setter. Engines that don't reflect over the real global object
    /// (a no-op stub, say) can leave this as `None`.
    fn last_global_assignment_key(&mut self) -> Option<String> {
        None
    }
}

impl<T: JsEngine + ?Sized> JsEngine for Box<T> {
    fn eval_script(&mut self, source: &str, url: &str) -> Result<()> {
        (**self).eval_script(source, url)
    }
    fn eval_module(&mut self, source: &str, url: &str) -> Result<()> {
        (**self).eval_module(source, url)
    }
    fn run_jobs(&mut self) -> Result<()> {
        (**self).run_jobs()
    }
    fn last_global_assignment_key(&mut self) -> Option<String> {
        (**self).last_global_assignment_key()
    }
}

// ============================
// Stable node keys (shared across subsystems)
// ============================

/// A 64-bit stable key identifying a DOM node, stable across the arena,
/// the sandbox's mutation log, and test assertions — there is no real
/// browser node identity to key off in a headless runtime.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The root node key (always present).
    pub const ROOT: NodeKey = NodeKey(0);

    /// Pack epoch+shard+counter into a single 64-bit key.
    #[inline]
    #[must_use]
    pub const fn pack(epoch: u16, shard: u8, counter: u64) -> Self {
        let c = counter & ((1u64 << 40) - 1);
        NodeKey(((epoch as u64) << 48) | ((shard as u64) << 40) | c)
    }

    /// Extract epoch from the key.
    #[inline]
    #[must_use]
    pub const fn epoch(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// Extract shard from the key.
    #[inline]
    #[must_use]
    pub const fn shard(self) -> u8 {
        ((self.0 >> 40) & 0xFF) as u8
    }

    /// Extract counter from the key.
    #[inline]
    #[must_use]
    pub const fn counter(self) -> u64 {
        self.0 & ((1u64 << 40) - 1)
    }
}

/// Global key space for minting `NodeKey`s with unique epochs and shard IDs.
#[derive(Debug)]
pub struct KeySpace {
    epoch: u16,
    next_shard_id: u8,
}

impl KeySpace {
    /// Create a new key space with a time-derived epoch.
    #[must_use]
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let epoch = (((now.as_secs() as u32) ^ now.subsec_nanos()) & 0xFFFF) as u16;
        Self {
            epoch,
            next_shard_id: 1,
        }
    }

    /// Register a new manager for a given producer shard.
    pub fn register_manager<L: Eq + Hash + Copy>(&mut self) -> NodeKeyManager<L> {
        let shard = self.next_shard_id;
        self.next_shard_id = self.next_shard_id.wrapping_add(1);
        NodeKeyManager::new(self.epoch, shard)
    }

    /// Return the current epoch.
    #[must_use]
    pub const fn epoch(&self) -> u16 {
        self.epoch
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-shard manager mapping local IDs to `NodeKey`s and minting new keys.
#[derive(Clone, Debug)]
pub struct NodeKeyManager<L: Eq + Hash + Copy> {
    epoch: u16,
    shard: u8,
    counter: u64,
    map: HashMap<L, NodeKey>,
}

impl<L: Eq + Hash + Copy> NodeKeyManager<L> {
    fn new(epoch: u16, shard: u8) -> Self {
        Self {
            epoch,
            shard,
            counter: 1,
            map: HashMap::new(),
        }
    }

    /// Get the `NodeKey` for a local ID, minting if not present.
    #[inline]
    pub fn key_of(&mut self, id: L) -> NodeKey {
        if let Some(&k) = self.map.get(&id) {
            return k;
        }
        let key = NodeKey::pack(self.epoch, self.shard, self.counter);
        self.counter = self.counter.wrapping_add(1);
        self.map.insert(id, key);
        key
    }

    /// Seed a mapping from a local ID to an existing `NodeKey`.
    #[inline]
    pub fn seed(&mut self, id: L, key: NodeKey) {
        self.map.insert(id, key);
    }
}

// ============================
// DOM update model + mirror pattern
// ============================

/// A batchable update applied to the arena DOM and mirrored to subscribers
/// (style, sandbox interceptors, test probes).
#[derive(Debug, Clone)]
pub enum DOMUpdate {
    InsertElement {
        parent: NodeKey,
        node: NodeKey,
        tag: String,
        pos: usize,
    },
    InsertText {
        parent: NodeKey,
        node: NodeKey,
        text: String,
        pos: usize,
    },
    SetAttr {
        node: NodeKey,
        name: String,
        value: String,
    },
    UpdateText {
        node: NodeKey,
        text: String,
    },
    RemoveNode {
        node: NodeKey,
    },
    EndOfDocument,
}

/// A subscriber that receives `DOMUpdate` values and mirrors them into its
/// own state (e.g. the id/class/tag index used by `getElementById`).
pub trait DOMSubscriber {
    /// Apply a single `DOMUpdate` to the subscriber state.
    ///
    /// # Errors
    /// Returns an error if the update references an unknown node.
    fn apply_update(&mut self, update: DOMUpdate) -> anyhow::Result<()>;
}

/// Generic mirror that applies incoming DOM updates and can send changes
/// (from sandboxed script mutations) back to the owning DOM.
pub struct DOMMirror<T: DOMSubscriber> {
    in_updater: broadcast::Receiver<Vec<DOMUpdate>>,
    out_updater: mpsc::Sender<Vec<DOMUpdate>>,
    mirror: T,
}

impl<T: DOMSubscriber> DOMMirror<T> {
    /// Create a new `DOMMirror` wrapping a subscriber implementation.
    pub const fn new(
        out_updater: mpsc::Sender<Vec<DOMUpdate>>,
        in_updater: broadcast::Receiver<Vec<DOMUpdate>>,
        mirror: T,
    ) -> Self {
        Self {
            in_updater,
            out_updater,
            mirror,
        }
    }

    /// Drain and apply all pending `DOMUpdate` batches asynchronously.
    ///
    /// # Errors
    /// Returns an error if the update channel closed or an update was rejected.
    pub async fn update(&mut self) -> anyhow::Result<()> {
        use tokio::sync::broadcast::error::TryRecvError;
        while let Some(updates) = match self.in_updater.try_recv() {
            Ok(updates) => Ok::<_, anyhow::Error>(Some(updates)),
            Err(TryRecvError::Closed) => {
                return Err(anyhow::anyhow!("DOM update channel closed mid-stream"));
            }
            _ => Ok(None),
        }? {
            for update in updates {
                self.mirror.apply_update(update)?;
            }
        }
        Ok(())
    }

    /// Synchronous, non-async variant for draining pending updates.
    ///
    /// # Errors
    /// Returns an error if the update channel closed or an update was rejected.
    pub fn try_update_sync(&mut self) -> anyhow::Result<()> {
        use tokio::sync::broadcast::error::TryRecvError;
        loop {
            match self.in_updater.try_recv() {
                Ok(batch) => {
                    for update in batch {
                        self.mirror.apply_update(update)?;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => {
                    return Err(anyhow::anyhow!("DOM update channel closed mid-stream"));
                }
            }
        }
        Ok(())
    }

    /// Access the inner mirror mutably.
    pub const fn mirror_mut(&mut self) -> &mut T {
        &mut self.mirror
    }

    /// Access the inner mirror immutably.
    pub const fn mirror(&self) -> &T {
        &self.mirror
    }

    /// Send a batch of DOM changes back to the owning DOM.
    ///
    /// # Errors
    /// Returns an error if the receiving end has been dropped.
    pub async fn send_dom_change(&mut self, changes: Vec<DOMUpdate>) -> anyhow::Result<()> {
        self.out_updater.send(changes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{KeySpace, NodeKey};

    #[test]
    fn node_key_roundtrips_through_pack() {
        let key = NodeKey::pack(7, 3, 123_456);
        assert_eq!(key.epoch(), 7);
        assert_eq!(key.shard(), 3);
        assert_eq!(key.counter(), 123_456);
    }

    #[test]
    fn key_manager_mints_stable_keys() {
        let mut space = KeySpace::new();
        let mut mgr = space.register_manager::<u32>();
        let a = mgr.key_of(1);
        let b = mgr.key_of(1);
        let c = mgr.key_of(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
