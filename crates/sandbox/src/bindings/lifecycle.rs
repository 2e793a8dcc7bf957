//! The `lifecycle` namespace: the one host function the generated lifecycle
//! wrapper script (built by `qiankun_loader`) calls to hand a `bootstrap`/
//! `mount`/`unmount`/`update` outcome back to Rust. `JSValue` has no
//! function variant (engine-agnostic by design, see `values.rs`), so the
//! controller can't just call a JS function and get a return value the way
//! it would for a synchronous host callback — instead the wrapper script
//! drives the app's own exported functions (including chaining a returned
//! thenable) and reports the terminal outcome through here, the same
//! allocate-a-slot-and-poll shape `net.rs`'s request/poll pair uses for
//! fetches that outlive a single host call.

use std::sync::Arc;

use super::{HostContext, HostFnSync, HostNamespace};
use crate::values::{JSError, JSValue};

/// Outcome of the most recently invoked lifecycle phase. Both variants carry
/// the string the wrapper script passed as `message`: for `Threw` it is the
/// stringified error/rejection; for `Ok` it is ordinarily empty, except the
/// entry-resolution probe script (which reuses this same channel to report
/// whether the resolved library exports `update`) repurposes it to carry
/// `"1"`/`"0"`.
#[derive(Clone, Debug)]
pub enum LifecycleOutcome {
    Ok(String),
    Threw(String),
}

/// Single-slot result box. A lifecycle phase is always invoked, awaited via
/// `run_jobs`, and polled to completion before the next one starts (spec.md
/// §4.7: phases run strictly in sequence), so there is never more than one
/// outstanding call and no id allocation is needed.
#[derive(Debug, Default)]
pub struct LifecycleResultRegistry {
    outcome: Option<LifecycleOutcome>,
}

impl LifecycleResultRegistry {
    /// Clear any previous result before invoking the next phase.
    pub fn reset(&mut self) {
        self.outcome = None;
    }

    pub fn set(&mut self, outcome: LifecycleOutcome) {
        self.outcome = Some(outcome);
    }

    #[must_use]
    pub fn take(&mut self) -> Option<LifecycleOutcome> {
        self.outcome.take()
    }
}

#[must_use]
pub fn build_lifecycle_namespace() -> HostNamespace {
    HostNamespace::new().with_sync_fn("report", build_report())
}

/// `lifecycle.report(ok, message)`: `ok` truthy means the phase resolved,
/// `message` (ignored when `ok`) carries the stringified rejection/throw.
fn build_report() -> Arc<HostFnSync> {
    Arc::new(move |context: &HostContext, args: Vec<JSValue>| -> Result<JSValue, JSError> {
        let ok = matches!(args.first(), Some(JSValue::Boolean(true)));
        let message = match args.get(1) {
            Some(value) => value.to_string(),
            None => String::new(),
        };
        let mut registry = context
            .lifecycle_registry
            .lock()
            .map_err(|_| JSError::InternalError(String::from("mutex poisoned")))?;
        registry.set(if ok { LifecycleOutcome::Ok(message) } else { LifecycleOutcome::Threw(message) });
        Ok(JSValue::Undefined)
    })
}

#[cfg(test)]
mod tests {
    use super::{LifecycleOutcome, LifecycleResultRegistry};

    #[test]
    fn reset_clears_prior_outcome() {
        let mut registry = LifecycleResultRegistry::default();
        registry.set(LifecycleOutcome::Ok(String::new()));
        registry.reset();
        assert!(registry.take().is_none());
    }

    #[test]
    fn take_consumes_the_outcome() {
        let mut registry = LifecycleResultRegistry::default();
        registry.set(LifecycleOutcome::Threw(String::from("boom")));
        assert!(matches!(registry.take(), Some(LifecycleOutcome::Threw(message)) if message == "boom"));
        assert!(registry.take().is_none());
    }
}
