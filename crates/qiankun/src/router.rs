//! C8: router integration (spec.md §4.8). There is no real
//! `window.history`/`popstate` in a headless Rust process, so navigation is
//! driven explicitly through [`Router::navigate`] rather than intercepted
//! from a browser; the diffing algorithm itself — which apps should
//! unmount, which should mount, for a given path transition — is the part
//! spec.md actually specifies and is what this module tests.

use crate::app::AppConfig;

/// The current location this router reroutes against. Only the path is
/// modeled; qiankun's `activeRule` only ever matches against pathname in
/// practice, and query/hash changes that don't affect any `activeRule`
/// shouldn't cause a reroute (spec.md §4.8 "reroute is triggered by a path
/// change, not every history event").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub path: String,
}

impl Location {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// The result of diffing one navigation: which apps should be unmounted
/// before mounting the next set, and which should be newly mounted
/// (spec.md §4.8's "toUnmount"/"toMount" pair, §5 "reroute resolves to a
/// disjoint toUnmount/toMount pair before either begins").
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RerouteDiff {
    pub to_unmount: Vec<String>,
    pub to_mount: Vec<String>,
}

impl RerouteDiff {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.to_unmount.is_empty() && self.to_mount.is_empty()
    }
}

/// Tracks the current location and which apps are active against it,
/// computing a [`RerouteDiff`] each time [`Self::navigate`] moves to a new
/// path.
#[derive(Default)]
pub struct Router {
    location: Location,
    active: Vec<String>,
}

impl Router {
    #[must_use]
    pub fn new(initial: Location) -> Self {
        Self { location: initial, active: Vec::new() }
    }

    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }

    #[must_use]
    pub fn active_apps(&self) -> &[String] {
        &self.active
    }

    /// Move to `location` and diff `apps`' `active_rule`s against it. A
    /// no-op navigation (same path) still re-diffs rather than short
    /// circuiting, since the active rule set itself may have changed via a
    /// fresh `register_micro_apps` call between navigations.
    pub fn navigate(&mut self, location: Location, apps: &[AppConfig]) -> RerouteDiff {
        self.location = location;
        let now_active: Vec<String> =
            apps.iter().filter(|app| app.active_rule.matches(&self.location.path)).map(|app| app.name.clone()).collect();

        let to_unmount: Vec<String> = self.active.iter().filter(|name| !now_active.contains(name)).cloned().collect();
        let to_mount: Vec<String> = now_active.iter().filter(|name| !self.active.contains(name)).cloned().collect();

        self.active = now_active;
        RerouteDiff { to_unmount, to_mount }
    }
}

#[cfg(test)]
mod tests {
    use super::{Location, Router};
    use crate::app::{ActiveRule, AppConfig, Entry};
    use serde_json::Value;
    use url::Url;

    fn app(name: &str, prefix: &str) -> AppConfig {
        AppConfig {
            name: name.to_owned(),
            entry: Entry::Html(Url::parse("https://host.example/entry.html").unwrap()),
            container: qiankun_js::NodeKey(1),
            active_rule: ActiveRule::Prefix(prefix.to_owned()),
            props: Value::Null,
            loader: None,
            singular: None,
            style_scope: None,
        }
    }

    #[test]
    fn navigating_into_a_rule_mounts_only_the_matching_app() {
        let apps = vec![app("a", "/a"), app("b", "/b")];
        let mut router = Router::new(Location::new("/"));
        let diff = router.navigate(Location::new("/a/page1"), &apps);
        assert_eq!(diff.to_mount, vec![String::from("a")]);
        assert!(diff.to_unmount.is_empty());
    }

    #[test]
    fn navigating_between_rules_unmounts_old_and_mounts_new() {
        let apps = vec![app("a", "/a"), app("b", "/b")];
        let mut router = Router::new(Location::new("/a/page1"));
        router.navigate(Location::new("/a/page1"), &apps);
        let diff = router.navigate(Location::new("/b/page1"), &apps);
        assert_eq!(diff.to_unmount, vec![String::from("a")]);
        assert_eq!(diff.to_mount, vec![String::from("b")]);
    }

    #[test]
    fn navigating_within_the_same_rule_is_a_no_op_diff() {
        let apps = vec![app("a", "/a")];
        let mut router = Router::new(Location::new("/a/page1"));
        router.navigate(Location::new("/a/page1"), &apps);
        let diff = router.navigate(Location::new("/a/page2"), &apps);
        assert!(diff.is_empty());
    }
}
