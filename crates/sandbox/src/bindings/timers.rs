//! `setTimeout`/`setInterval`/`requestAnimationFrame`/`requestIdleCallback`
//! and their cancel counterparts (spec.md §4.4 bullet 4). Every schedule
//! call is recorded into the owning app's `MutationLog` via
//! `Sandbox::record_timer_scheduled` so rewind on unmount can cancel any
//! timer the app never cleared itself (spec.md §8 property 3, scenario S3).
//!
//! There is no real browser event loop here; ids are allocated from a
//! process-wide counter and tracked in `TimerRegistry` purely so
//! cancellation and the "sum of pending handlers is zero" test hook have
//! something concrete to check against. Actually firing callbacks is out of
//! scope without a script engine driving them — `qiankun_js_v8`'s `run_jobs`
//! is where that would eventually live.

use std::collections::HashSet;
use std::sync::Arc;

use super::{HostContext, HostFnSync, HostNamespace};
use crate::mutation::TimerKind;
use crate::values::{JSError, JSValue};

#[derive(Debug, Default)]
pub struct TimerRegistry {
    next_id: u64,
    live: HashSet<u64>,
}

impl TimerRegistry {
    pub fn allocate(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.live.insert(self.next_id);
        self.next_id
    }

    pub fn cancel(&mut self, id: u64) -> bool {
        self.live.remove(&id)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[must_use]
pub fn build_timer_namespace() -> HostNamespace {
    HostNamespace::new()
        .with_sync_fn("setTimeout", build_schedule(TimerKind::Timeout))
        .with_sync_fn("setInterval", build_schedule(TimerKind::Interval))
        .with_sync_fn("requestAnimationFrame", build_schedule(TimerKind::AnimationFrame))
        .with_sync_fn("requestIdleCallback", build_schedule(TimerKind::IdleCallback))
        .with_sync_fn("clearTimeout", build_cancel())
        .with_sync_fn("clearInterval", build_cancel())
        .with_sync_fn("cancelAnimationFrame", build_cancel())
        .with_sync_fn("cancelIdleCallback", build_cancel())
}

fn build_schedule(kind: TimerKind) -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, _args: Vec<JSValue>| -> Result<JSValue, JSError> {
        let id = {
            let mut registry =
                context.timer_registry.lock().map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
            registry.allocate()
        };
        if let Ok(mut sandbox) = context.sandbox.lock() {
            sandbox.record_timer_scheduled(kind, id);
        }
        Ok(JSValue::Number(id as f64))
    })
}

fn build_cancel() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        let Some(JSValue::Number(raw_id)) = args.first() else {
            return Ok(JSValue::Undefined);
        };
        let id = *raw_id as u64;
        if let Ok(mut registry) = context.timer_registry.lock() {
            registry.cancel(id);
        }
        if let Ok(mut sandbox) = context.sandbox.lock() {
            sandbox.clear_timer(id);
        }
        Ok(JSValue::Undefined)
    })
}
