//! Cross-app state bus (spec.md §4.7 "Cross-app state"): a single shared
//! object keyed by arbitrary string paths, shallow-merged by
//! `setGlobalState` and fanned out to every subscriber tagged with the
//! name of the app whose write triggered the notification (scenario S6).

use std::sync::{Arc, Mutex};

use serde_json::Value;

type Subscriber = Arc<dyn Fn(&Value, &str) + Send + Sync>;

struct Inner {
    state: Value,
    subscribers: Vec<Subscriber>,
}

/// `initGlobalState(state)`'s return value (spec.md §6): a handle apps use
/// to read/write the shared state tree and (un)subscribe to changes.
#[derive(Clone)]
pub struct GlobalStateBus {
    inner: Arc<Mutex<Inner>>,
}

impl GlobalStateBus {
    #[must_use]
    pub fn new(initial: Value) -> Self {
        let state = if initial.is_object() { initial } else { Value::Object(serde_json::Map::new()) };
        Self { inner: Arc::new(Mutex::new(Inner { state, subscribers: Vec::new() })) }
    }

    /// `onGlobalStateChange(callback)`: registers `callback`, invoked with
    /// the full merged state and the tag of whichever caller last wrote it.
    /// Returns the same `Arc` so the caller can later
    /// [`Self::off_global_state_change`] it (spec.md §4.7 "releasable
    /// during unmount via an offer function returned at subscribe time").
    pub fn on_global_state_change(&self, callback: Subscriber) -> Subscriber {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).subscribers.push(Arc::clone(&callback));
        callback
    }

    pub fn off_global_state_change(&self, callback: &Subscriber) {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .subscribers
            .retain(|existing| !Arc::ptr_eq(existing, callback));
    }

    /// `setGlobalState(patch)`: shallow-merges `patch` into the shared
    /// object and notifies every subscriber, tagged with `caller`.
    pub fn set_global_state(&self, patch: Value, caller: &str) {
        let Value::Object(patch_map) = patch else { return };
        let (snapshot, subscribers) = {
            let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let Value::Object(state_map) = &mut guard.state else {
                return;
            };
            for (key, value) in patch_map {
                state_map.insert(key, value);
            }
            (guard.state.clone(), guard.subscribers.clone())
        };
        for subscriber in &subscribers {
            subscriber(&snapshot, caller);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).state.clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::GlobalStateBus;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn subscriber_sees_merged_state_and_caller_tag() {
        let bus = GlobalStateBus::new(json!({"count": 0}));
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        bus.on_global_state_change(Arc::new(move |state, caller| {
            *seen_clone.lock().unwrap() = Some((state.clone(), caller.to_owned()));
        }));

        bus.set_global_state(json!({"count": 1}), "appA");

        let (state, caller) = seen.lock().unwrap().clone().expect("subscriber was invoked");
        assert_eq!(state["count"], 1);
        assert_eq!(caller, "appA");
    }

    #[test]
    fn unsubscribed_callback_is_not_invoked_again() {
        let bus = GlobalStateBus::new(json!({"count": 0}));
        let calls = Arc::new(Mutex::new(0_u32));
        let calls_clone = Arc::clone(&calls);
        let handle = bus.on_global_state_change(Arc::new(move |_state, _caller| {
            *calls_clone.lock().unwrap() += 1;
        }));

        bus.set_global_state(json!({"count": 1}), "appA");
        bus.off_global_state_change(&handle);
        bus.set_global_state(json!({"count": 2}), "appA");

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
