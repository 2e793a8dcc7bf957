//! App registration data (spec.md §3 "App registration"): everything the
//! caller supplies up front and that stays immutable for the lifetime of
//! the registration.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

/// Either an HTML entry URL or a manifest entry (spec.md §3 `entry`).
#[derive(Clone, Debug)]
pub enum Entry {
    Html(Url),
    Manifest { scripts: Vec<Url>, styles: Vec<Url> },
}

impl Entry {
    /// The single HTML URL, when this is an HTML entry — manifest entries
    /// have no single document to compare against.
    #[must_use]
    pub const fn html_url(&self) -> Option<&Url> {
        match self {
            Self::Html(url) => Some(url),
            Self::Manifest { .. } => None,
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Html(a), Self::Html(b)) => a == b,
            (Self::Manifest { scripts: sa, styles: ca }, Self::Manifest { scripts: sb, styles: cb }) => {
                sa == sb && ca == cb
            }
            _ => false,
        }
    }
}

/// `activeRule` (spec.md §3/§4.8): a string prefix, or a predicate over the
/// current path. Re-registration compares rules by `Eq`, so predicates are
/// compared by pointer identity via `Arc::ptr_eq`.
#[derive(Clone)]
pub enum ActiveRule {
    Prefix(String),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl ActiveRule {
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Predicate(predicate) => predicate(path),
        }
    }
}

impl PartialEq for ActiveRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Prefix(a), Self::Prefix(b)) => a == b,
            (Self::Predicate(a), Self::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl core::fmt::Debug for ActiveRule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// `loader?`: invoked with `true` as loading begins and `false` once the
/// corresponding phase settles (spec.md §3).
pub type LoaderHook = Arc<dyn Fn(bool) + Send + Sync>;

/// One `before`/`after` hook: sync or async lifecycle hooks are both
/// modeled as a boxed future-returning closure, matching spec.md §4.7
/// "each hook may be sync or async".
pub type LifecycleHook = Arc<dyn Fn() -> futures::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// `before/after × load/mount/unmount` hook arrays (spec.md §4.7), run
/// strictly in order; a hook's error propagates and aborts the phase.
#[derive(Clone, Default)]
pub struct GlobalLifecycleHooks {
    pub before_load: Vec<LifecycleHook>,
    pub before_mount: Vec<LifecycleHook>,
    pub after_mount: Vec<LifecycleHook>,
    pub before_unmount: Vec<LifecycleHook>,
    pub after_unmount: Vec<LifecycleHook>,
}

impl GlobalLifecycleHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A registered micro-app (spec.md §3 "App registration"), immutable once
/// handed to [`crate::controller::LifecycleController::register_micro_apps`]
/// or [`crate::controller::LifecycleController::load_app`].
#[derive(Clone)]
pub struct AppConfig {
    pub name: String,
    pub entry: Entry,
    /// Container selector, resolved against the host document by the
    /// embedder before registration — this crate has no browser DOM of its
    /// own to query a CSS selector against, so callers hand in the
    /// already-resolved node.
    pub container: qiankun_js::NodeKey,
    pub active_rule: ActiveRule,
    pub props: Value,
    pub loader: Option<LoaderHook>,
    pub singular: Option<bool>,
    pub style_scope: Option<String>,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("container", &self.container)
            .field("active_rule", &self.active_rule)
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Whether `other` is an equal-enough re-registration to be accepted as
    /// idempotent (spec.md §3 "re-registration with a different entry is an
    /// error").
    #[must_use]
    pub fn registration_matches(&self, other: &Self) -> bool {
        self.name == other.name && self.entry == other.entry
    }
}
