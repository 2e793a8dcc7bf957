//! C9: the prefetcher. Opportunistically warms C1's asset cache for apps
//! that aren't active yet, strictly without ever activating a sandbox or
//! running app script (spec.md §4.9, testable property 8).
//!
//! There is no real `requestIdleCallback` in a headless Rust process; an
//! [`IdleQueue`] drains one item per `tokio::task::yield_now` tick instead,
//! preserving the "don't block the caller" spirit without depending on a
//! browser event loop.

use std::sync::Arc;

use url::Url;

use crate::app::{AppConfig, Entry};

/// `prefetch` configuration (spec.md §4.9/§6).
#[derive(Clone)]
pub enum PrefetchStrategy {
    None,
    /// Prefetch every app not active at `start()` time.
    NotActiveAtStart,
    /// Prefetch every registered app once the current navigation settles.
    All,
    /// Prefetch only the named apps.
    Named(Vec<String>),
    /// Caller-supplied split between critical (prefetched immediately
    /// after mount) and minor (deferred to idle) apps.
    Custom(Arc<dyn Fn(&[AppConfig]) -> (Vec<String>, Vec<String>) + Send + Sync>),
}

impl Default for PrefetchStrategy {
    fn default() -> Self {
        Self::None
    }
}

/// Drains queued work one tick at a time via `yield_now`, standing in for
/// `requestIdleCallback` windows (spec.md §9 design note: "Given a set of
/// apps... schedule calls to C1... during requestIdleCallback windows").
pub struct IdleQueue {
    pending: Vec<Url>,
}

impl IdleQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn push(&mut self, url: Url) {
        self.pending.push(url);
    }

    /// Drain every queued URL through `fetch_cache.fetch_text`, yielding
    /// between each one. Fetch failures are swallowed (prefetch is always
    /// best-effort, spec.md §7 "recoverable conditions... are absorbed").
    pub async fn drain(&mut self, fetch_cache: &qiankun_fetch::AssetCache) {
        for url in self.pending.drain(..) {
            if let Err(error) = fetch_cache.fetch_text(&url).await {
                log::debug!("qiankun: prefetch of {url} failed, ignoring: {error}");
            }
            tokio::task::yield_now().await;
        }
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a [`PrefetchStrategy`] against the registered app set and the
/// apps active right now, returning the names to warm.
#[must_use]
pub fn apps_to_prefetch(strategy: &PrefetchStrategy, all_apps: &[AppConfig], active_now: &[String]) -> Vec<String> {
    match strategy {
        PrefetchStrategy::None => Vec::new(),
        PrefetchStrategy::NotActiveAtStart => {
            all_apps.iter().map(|app| app.name.clone()).filter(|name| !active_now.contains(name)).collect()
        }
        PrefetchStrategy::All => all_apps.iter().map(|app| app.name.clone()).collect(),
        PrefetchStrategy::Named(names) => names.clone(),
        PrefetchStrategy::Custom(split) => {
            let (critical, minor) = split(all_apps);
            critical.into_iter().chain(minor).collect()
        }
    }
}

/// Every URL an app's entry references that's worth warming ahead of time:
/// the HTML entry itself, or every script/style in a manifest entry.
#[must_use]
pub fn entry_urls(app: &AppConfig) -> Vec<Url> {
    match &app.entry {
        Entry::Html(url) => vec![url.clone()],
        Entry::Manifest { scripts, styles } => scripts.iter().chain(styles.iter()).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{apps_to_prefetch, PrefetchStrategy};
    use crate::app::{ActiveRule, AppConfig, Entry};
    use serde_json::Value;
    use url::Url;

    fn app(name: &str) -> AppConfig {
        AppConfig {
            name: name.to_owned(),
            entry: Entry::Html(Url::parse("https://host.example/entry.html").unwrap()),
            container: qiankun_js::NodeKey(1),
            active_rule: ActiveRule::Prefix(format!("/{name}")),
            props: Value::Null,
            loader: None,
            singular: None,
            style_scope: None,
        }
    }

    #[test]
    fn not_active_at_start_excludes_active_apps() {
        let apps = vec![app("a"), app("b")];
        let names = apps_to_prefetch(&PrefetchStrategy::NotActiveAtStart, &apps, &[String::from("a")]);
        assert_eq!(names, vec![String::from("b")]);
    }

    #[test]
    fn all_strategy_includes_every_app() {
        let apps = vec![app("a"), app("b")];
        let names = apps_to_prefetch(&PrefetchStrategy::All, &apps, &[]);
        assert_eq!(names.len(), 2);
    }
}
