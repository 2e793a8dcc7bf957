//! Entry-script resolution and lifecycle-phase invocation (spec.md §4.2 row
//! "script with entry attr", §4.3 step 5, §4.7). `JSValue` carries no
//! function variant (see `qiankun_sandbox::values`), so a Rust caller can't
//! just hold onto `bootstrap`/`mount`/`unmount`/`update` and call them —
//! instead this module generates small bridging scripts that drive an app's
//! own exports from inside the engine and report the terminal outcome back
//! through the `lifecycle` host namespace, the same allocate-and-poll shape
//! `net.rs`'s fetch bridge uses for work that outlives one host call.

use std::sync::{Arc, Mutex};

use qiankun_js::JsEngine;
use qiankun_sandbox::{LifecycleOutcome, LifecycleResultRegistry};

use crate::error::QiankunError;

/// Upper bound on `run_jobs`/poll rounds before giving up on a phase ever
/// reporting. There is no intrinsic timeout (spec.md §5); this only guards
/// against a phase that never calls `lifecycle.report` at all (a buggy app,
/// or a stub engine that doesn't execute script).
const LIFECYCLE_POLL_ITERATIONS: usize = 4096;

/// The sentinel `lifecycle.report` message used by [`build_resolve_script`]
/// to signal a missing `{bootstrap, mount, unmount}` shape, distinguishing
/// it from an ordinary thrown error.
pub const MISSING_LIFECYCLE_SENTINEL: &str = "ENTRY_MISSING_LIFECYCLE";

fn js_string_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().saturating_add(2));
    out.push('"');
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Build the probe script run once the entry HTML has finished streaming:
/// validates that `globalThis[library_name]` exports the required
/// `{bootstrap, mount, unmount}` shape (each a function or an array of
/// functions) and reports whether `update` is also present via the `"1"`/
/// `"0"` payload of a successful [`LifecycleOutcome::Ok`].
#[must_use]
pub fn build_resolve_script(library_name: &str) -> String {
    let key = js_string_literal(library_name);
    format!(
        "(function(){{\n  try {{\n    var lib = globalThis[{key}];\n    function isFn(v) {{ return typeof v === 'function' || Array.isArray(v); }}\n    if (!lib || !isFn(lib.bootstrap) || !isFn(lib.mount) || !isFn(lib.unmount)) {{\n      lifecycle.report(false, \"{MISSING_LIFECYCLE_SENTINEL}\");\n      return;\n    }}\n    lifecycle.report(true, isFn(lib.update) ? \"1\" : \"0\");\n  }} catch (e) {{\n    lifecycle.report(false, String(e));\n  }}\n}})();"
    )
}

/// Build the script that invokes one lifecycle phase, normalizing a single
/// function or an array of functions into a sequential chain, awaiting any
/// returned thenable between steps, and reporting the terminal outcome.
/// `args_expr` is a JS expression evaluating to the single argument passed
/// to every function in the chain (e.g. the merged props object).
#[must_use]
pub fn build_invoke_phase_script(library_name: &str, phase: &str, args_expr: &str) -> String {
    let key = js_string_literal(library_name);
    let phase_key = js_string_literal(phase);
    format!(
        "(function(){{\n  var lib = globalThis[{key}];\n  var raw = lib ? lib[{phase_key}] : undefined;\n  var fns = Array.isArray(raw) ? raw : (raw ? [raw] : []);\n  var args = {args_expr};\n  function step(i) {{\n    if (i >= fns.length) {{ lifecycle.report(true, \"\"); return; }}\n    var result;\n    try {{\n      result = fns[i](args);\n    }} catch (e) {{\n      lifecycle.report(false, String(e));\n      return;\n    }}\n    if (result && typeof result.then === 'function') {{\n      result.then(function() {{ step(i + 1); }}, function(e) {{ lifecycle.report(false, String(e)); }});\n    }} else {{\n      step(i + 1);\n    }}\n  }}\n  step(0);\n}})();"
    )
}

/// Reset the shared lifecycle result slot, evaluate `script`, and poll for
/// its outcome, yielding to the async runtime between polls so anything the
/// script itself kicked off (an awaited fetch, a microtask chain) gets a
/// chance to progress.
///
/// # Errors
/// Returns [`QiankunError::LifecycleThrew`] if the script fails to compile
/// or run at all, or never reports an outcome within the poll budget.
pub async fn run_lifecycle_script<E: JsEngine>(
    engine: &mut E,
    registry: &Arc<Mutex<LifecycleResultRegistry>>,
    script: &str,
    url: &str,
    app: &str,
    phase: &str,
) -> Result<LifecycleOutcome, QiankunError> {
    if let Ok(mut guard) = registry.lock() {
        guard.reset();
    }
    engine.eval_script(script, url).map_err(|error| QiankunError::LifecycleThrew {
        app: app.to_owned(),
        phase: phase.to_owned(),
        message: error.to_string(),
    })?;
    for _ in 0..LIFECYCLE_POLL_ITERATIONS {
        drop(engine.run_jobs());
        if let Some(outcome) = registry.lock().ok().and_then(|mut guard| guard.take()) {
            return Ok(outcome);
        }
        tokio::task::yield_now().await;
    }
    Err(QiankunError::LifecycleThrew {
        app: app.to_owned(),
        phase: phase.to_owned(),
        message: String::from("lifecycle phase never reported an outcome"),
    })
}

#[cfg(test)]
mod tests {
    use super::{build_invoke_phase_script, build_resolve_script, run_lifecycle_script, MISSING_LIFECYCLE_SENTINEL};
    use anyhow::Result;
    use qiankun_js::JsEngine;
    use qiankun_sandbox::{LifecycleOutcome, LifecycleResultRegistry};
    use std::sync::{Arc, Mutex};

    #[test]
    fn resolve_script_embeds_library_name_and_sentinel() {
        let script = build_resolve_script("myApp");
        assert!(script.contains("globalThis[\"myApp\"]"));
        assert!(script.contains(MISSING_LIFECYCLE_SENTINEL));
    }

    #[test]
    fn invoke_phase_script_embeds_phase_and_args() {
        let script = build_invoke_phase_script("myApp", "mount", "({name:\"myApp\"})");
        assert!(script.contains("lib[\"mount\"]"));
        assert!(script.contains("({name:\"myApp\"})"));
    }

    /// A fake engine whose `eval_script` immediately reports a fixed
    /// outcome, standing in for the real wrapper-script semantics so
    /// `run_lifecycle_script`'s polling loop can be exercised without V8.
    struct ImmediateEngine {
        registry: Arc<Mutex<LifecycleResultRegistry>>,
        outcome: LifecycleOutcome,
    }

    impl JsEngine for ImmediateEngine {
        fn eval_script(&mut self, _source: &str, _url: &str) -> Result<()> {
            if let Ok(mut guard) = self.registry.lock() {
                guard.set(self.outcome.clone());
            }
            Ok(())
        }
        fn eval_module(&mut self, source: &str, url: &str) -> Result<()> {
            self.eval_script(source, url)
        }
        fn run_jobs(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_ok_outcome_from_the_registry() {
        let registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
        let mut engine = ImmediateEngine { registry: Arc::clone(&registry), outcome: LifecycleOutcome::Ok(String::from("1")) };
        let outcome = run_lifecycle_script(&mut engine, &registry, "script", "qiankun://x", "app", "mount")
            .await
            .expect("lifecycle script resolves");
        assert!(matches!(outcome, LifecycleOutcome::Ok(payload) if payload == "1"));
    }

    #[tokio::test]
    async fn reports_threw_outcome_from_the_registry() {
        let registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
        let mut engine =
            ImmediateEngine { registry: Arc::clone(&registry), outcome: LifecycleOutcome::Threw(String::from("boom")) };
        let outcome = run_lifecycle_script(&mut engine, &registry, "script", "qiankun://x", "app", "mount")
            .await
            .expect("lifecycle script resolves");
        assert!(matches!(outcome, LifecycleOutcome::Threw(message) if message == "boom"));
    }
}
