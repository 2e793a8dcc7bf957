//! C10: the global uncaught-error bus (spec.md §4.10/§6). Every throw that
//! propagates out of a lifecycle phase or a sandboxed script is dispatched
//! here in addition to rejecting the phase's own promise (spec.md §7
//! "Propagation policy").

use std::sync::{Arc, Mutex};

use crate::error::QiankunError;

/// `{ error, appName, lifecycleName }` handed to every registered handler
/// (spec.md §4.10).
#[derive(Clone, Debug)]
pub struct ErrorEvent {
    pub error: QiankunError,
    pub app_name: String,
    pub lifecycle_name: String,
}

type Handler = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;

/// `addGlobalUncaughtErrorHandler` / `removeGlobalUncaughtErrorHandler`
/// (spec.md §6). Handlers are compared by `Arc::ptr_eq` on removal, so
/// callers must keep the `Arc` they registered with to unregister it.
#[derive(Clone, Default)]
pub struct ErrorBus {
    handlers: Arc<Mutex<Vec<Handler>>>,
}

impl ErrorBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Handler) {
        self.handlers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(handler);
    }

    pub fn remove_handler(&self, handler: &Handler) {
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|existing| !Arc::ptr_eq(existing, handler));
    }

    /// Invoke every registered handler with `event`. Handlers run
    /// synchronously and in registration order; a panicking handler would
    /// poison the mutex for the *next* dispatch only (this call has
    /// already taken a snapshot), matching "recoverable conditions are
    /// absorbed" (spec.md §7).
    pub fn dispatch(&self, event: ErrorEvent) {
        let snapshot: Vec<Handler> =
            self.handlers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        for handler in snapshot {
            handler(&event);
        }
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorBus, ErrorEvent};
    use crate::error::QiankunError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample_event() -> ErrorEvent {
        ErrorEvent {
            error: QiankunError::UnknownApp { name: String::from("x") },
            app_name: String::from("x"),
            lifecycle_name: String::from("mount"),
        }
    }

    #[test]
    fn dispatch_invokes_every_registered_handler() {
        let bus = ErrorBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let handler: Arc<dyn Fn(&ErrorEvent) + Send + Sync> =
            Arc::new(move |_event| { calls_clone.fetch_add(1, Ordering::SeqCst); });
        bus.add_handler(Arc::clone(&handler));
        bus.dispatch(sample_event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_handler_is_not_invoked() {
        let bus = ErrorBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let handler: Arc<dyn Fn(&ErrorEvent) + Send + Sync> =
            Arc::new(move |_event| { calls_clone.fetch_add(1, Ordering::SeqCst); });
        bus.add_handler(Arc::clone(&handler));
        bus.remove_handler(&handler);
        bus.dispatch(sample_event());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
