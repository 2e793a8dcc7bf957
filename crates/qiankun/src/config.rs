//! `start(options?)` configuration (spec.md §6): the knobs that change how
//! C3/C4/C9 behave without changing any public operation's shape.

use qiankun_fetch::FetchOverride;
use qiankun_loader::{NodeTransformerHook, StreamTransformerHook};
use qiankun_sandbox::GlobalContext;

use crate::prefetch::PrefetchStrategy;

/// `sandbox` (spec.md §4.4/§6). `false` disables the sandbox entirely
/// (scripts run against a shared global — only ever correct for a single
/// app), `true` is the default full-fidelity [`qiankun_sandbox::Sandbox::proxy`],
/// and the two style-isolation variants additionally request CSS scoping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxMode {
    Disabled,
    Enabled,
    StrictStyleIsolation,
    ExperimentalStyleIsolation,
}

impl SandboxMode {
    #[must_use]
    pub const fn wants_style_scoping(self) -> bool {
        matches!(self, Self::StrictStyleIsolation | Self::ExperimentalStyleIsolation)
    }
}

impl Default for SandboxMode {
    fn default() -> Self {
        Self::Enabled
    }
}

/// Top-level `start()` options (spec.md §6).
pub struct QiankunConfig {
    pub sandbox: SandboxMode,
    /// Force every app into `singular` mode regardless of per-app config,
    /// or `None` to defer to each app's own `singular` field (default
    /// `false`, per-app).
    pub singular: Option<bool>,
    pub prefetch: PrefetchStrategy,
    /// When `true`, navigation reroutes are driven purely by URL changes:
    /// no automatic mount/unmount runs off of `popstate`/manual triggers
    /// other than the router's own `navigate` (spec.md §4.8).
    pub url_reroute_only: bool,
    /// Caller-supplied fetch override forwarded to every app's
    /// [`qiankun_fetch::AssetCache`] (matches the `fetch` option).
    pub fetch: Option<FetchOverride>,
    /// `streamTransformer`: runs over an app's decoded entry body before C3
    /// tag-rewrites and parses it.
    pub stream_transformer: Option<StreamTransformerHook>,
    /// `nodeTransformer`: runs once per node ahead of C2's own per-tag
    /// transform table.
    pub node_transformer: Option<NodeTransformerHook>,
    /// `globalContext`: caller-supplied backing object for every app
    /// sandbox's proxy target, shared across apps instead of each getting
    /// its own empty map. `None` keeps today's default — a fresh,
    /// independent [`qiankun_sandbox::new_global_context`] per app.
    pub global_context: Option<GlobalContext>,
}

impl Default for QiankunConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxMode::default(),
            singular: None,
            prefetch: PrefetchStrategy::default(),
            url_reroute_only: true,
            fetch: None,
            stream_transformer: None,
            node_transformer: None,
            global_context: None,
        }
    }
}

impl QiankunConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `app`'s own `singular` field should be honored, or overridden
    /// by a global `start()` setting. Default `true` (spec.md §6).
    #[must_use]
    pub fn effective_singular(&self, app_singular: Option<bool>) -> bool {
        self.singular.or(app_singular).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{QiankunConfig, SandboxMode};

    #[test]
    fn global_singular_overrides_per_app_setting() {
        let mut config = QiankunConfig::new();
        config.singular = Some(false);
        assert!(!config.effective_singular(Some(true)));
    }

    #[test]
    fn per_app_setting_used_when_no_global_override() {
        let config = QiankunConfig::new();
        assert!(!config.effective_singular(Some(false)));
        assert!(config.effective_singular(None));
    }

    #[test]
    fn style_isolation_variants_request_scoping() {
        assert!(SandboxMode::StrictStyleIsolation.wants_style_scoping());
        assert!(SandboxMode::ExperimentalStyleIsolation.wants_style_scoping());
        assert!(!SandboxMode::Enabled.wants_style_scoping());
    }
}
