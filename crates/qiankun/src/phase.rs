//! Memoized phase promises (spec.md §9 redesign note "coroutine-style
//! awaits in lifecycle chains → explicit phase promises"): each
//! [`crate::instance::AppInstance`] holds one of these per phase
//! (`load`/`bootstrap`/`mount`/`unmount`), so any number of external
//! callers can `await` phase completion without re-entering the state
//! machine, and a phase that has already settled resolves every waiter
//! immediately instead of replaying the work.

use std::sync::Arc;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::QiankunError;

#[derive(Clone, Debug)]
enum PhaseState {
    Pending,
    Resolved(Result<(), QiankunError>),
}

/// A single-resolution, multi-waiter future backed by a [`Notify`] rather
/// than a real `Future` combinator — simpler to reason about than
/// `futures::future::Shared` given the phases are driven by `&mut`
/// references to engines/sandboxes that can't be cloned into a shared
/// future anyway.
#[derive(Clone)]
pub struct PhasePromise {
    state: Arc<Mutex<PhaseState>>,
    notify: Arc<Notify>,
}

impl PhasePromise {
    #[must_use]
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(PhaseState::Pending)), notify: Arc::new(Notify::new()) }
    }

    /// Reset to `Pending` ahead of a fresh attempt at this phase (e.g. an
    /// explicit reload after `SKIP_BECAUSE_BROKEN`).
    pub fn reset(&self) {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = PhaseState::Pending;
    }

    /// Settle this phase for every past and future waiter.
    pub fn resolve(&self, result: Result<(), QiankunError>) {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = PhaseState::Resolved(result);
        drop(guard);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(*self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner), PhaseState::Resolved(_))
    }

    /// Await this phase's settlement, returning its (cloned) result. Safe
    /// to call from multiple tasks and multiple times from the same task.
    pub async fn wait(&self) -> Result<(), QiankunError> {
        loop {
            {
                let guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let PhaseState::Resolved(result) = &*guard {
                    return result.clone();
                }
            }
            self.notify.notified().await;
        }
    }
}

impl Default for PhasePromise {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::PhasePromise;

    #[tokio::test]
    async fn multiple_waiters_all_observe_the_same_resolution() {
        let promise = PhasePromise::new();
        let p1 = promise.clone();
        let p2 = promise.clone();
        let waiter_a = tokio::spawn(async move { p1.wait().await });
        let waiter_b = tokio::spawn(async move { p2.wait().await });
        tokio::task::yield_now().await;
        promise.resolve(Ok(()));
        assert!(waiter_a.await.unwrap().is_ok());
        assert!(waiter_b.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn already_resolved_promise_resolves_new_waiters_immediately() {
        let promise = PhasePromise::new();
        promise.resolve(Ok(()));
        assert!(promise.wait().await.is_ok());
        assert!(promise.is_settled());
    }
}
