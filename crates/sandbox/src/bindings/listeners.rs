//! `window`/`document` `addEventListener`/`removeEventListener` (spec.md
//! §4.4 bullet 3: "record for rewind"). Listener identity is an opaque id
//! minted by the app-side wrapper around its callback, matched against the
//! `listener_id` recorded in the `MutationLog` on rewind — the host never
//! needs to invoke the callback itself, only track whether it is still
//! registered.

use std::sync::Arc;

use super::{HostContext, HostFnSync, HostNamespace};
use crate::mutation::ListenerTarget;
use crate::values::{JSError, JSValue};

#[must_use]
pub fn build_window_namespace() -> HostNamespace {
    HostNamespace::new()
        .with_sync_fn("addEventListener", build_add_listener(ListenerTarget::Window))
        .with_sync_fn("removeEventListener", build_remove_listener())
}

/// `addEventListener(eventType, listenerId)`. `listenerId` is the engine
/// adapter's own handle to the JS callback (a v8 `Global<Function>` slot
/// index, for example) — the sandbox only needs it back at rewind time to
/// tell the engine which callback slot to release.
pub(crate) fn build_add_listener(target: ListenerTarget) -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        if args.len() < 2 {
            return Err(JSError::TypeError(String::from("addEventListener(type, listenerId) requires 2 arguments")));
        }
        let event_type = match &args[0] {
            JSValue::String(string_value) => string_value.clone(),
            _ => return Err(JSError::TypeError(String::from("event type must be a string"))),
        };
        let listener_id = match &args[1] {
            JSValue::Number(number_value) => *number_value as u64,
            _ => return Err(JSError::TypeError(String::from("listenerId must be a number"))),
        };
        if let Ok(mut sandbox) = context.sandbox.lock() {
            sandbox.record_listener_added(target, event_type, listener_id);
        }
        Ok(JSValue::Undefined)
    })
}

pub(crate) fn build_remove_listener() -> Arc<HostFnSync> {
    Arc::new(move |_context: &HostContext, _args: Vec<JSValue>| -> Result<JSValue, JSError> {
        // Explicit removal before unmount is the common path and needs no
        // rewind bookkeeping: the mutation-log record simply becomes a
        // no-op at rewind time (there is nothing left to detach). Matching
        // listener ids aren't removed from the log itself, exactly as
        // `clearTimeout` leaves its `TimerScheduled` record in place.
        Ok(JSValue::Undefined)
    })
}
