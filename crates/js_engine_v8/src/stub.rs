//! A `JsEngine` that installs no interpreter and executes nothing. Used
//! wherever a script engine is structurally required (a type parameter, a
//! `HostContext` wiring helper) but no real JavaScript execution is needed —
//! kept in its own module so enabling the `v8` feature never has to touch it.

use anyhow::Result;
use qiankun_js::JsEngine;

/// No-op script engine. `eval_script`/`eval_module` log and return `Ok(())`
/// without running anything; `run_jobs` never has microtasks to drain.
#[derive(Debug, Default)]
pub struct StubEngine {
    scripts_seen: usize,
}

impl StubEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `eval_script`/`eval_module` calls made so far, for tests
    /// that only need to assert a script *would have* run.
    #[must_use]
    pub const fn scripts_seen(&self) -> usize {
        self.scripts_seen
    }
}

impl JsEngine for StubEngine {
    fn eval_script(&mut self, _source: &str, url: &str) -> Result<()> {
        log::debug!("stub engine: skipping script execution for {url}");
        self.scripts_seen += 1;
        Ok(())
    }

    fn eval_module(&mut self, _source: &str, url: &str) -> Result<()> {
        log::debug!("stub engine: skipping module execution for {url}");
        self.scripts_seen += 1;
        Ok(())
    }

    fn run_jobs(&mut self) -> Result<()> {
        Ok(())
    }
}
