//! End-to-end coverage of the lifecycle controller (C7), the router
//! integration (C8), and the error bus (C10) driven together through a
//! fake script engine — the same "any script assigns a global, the
//! `lifecycle.report` probe reports synchronously" fake `qiankun_loader`
//! itself tests `load_entry` against, just wired through the full
//! `LifecycleController` instead of calling the loader directly.

use std::sync::{Arc, Mutex};

use anyhow::Result as AnyResult;
use futures::future::FutureExt;
use qiankun::{
    ActiveRule, AppConfig, AppStatus, Entry, EngineBuilder, Location, PageResources, QiankunConfig, QiankunError,
};
use qiankun_dom::DOM;
use qiankun_fetch::{AssetCache, CachedAsset};
use qiankun_js::{JsEngine, KeySpace, NodeKey};
use qiankun_sandbox::{DomIndexState, HostContext, LifecycleOutcome, LifecycleResultRegistry, SingularGate};
use serde_json::{json, Value};
use url::Url;

/// Mirrors `qiankun_loader::tests::FakeEngine`: any non-probe script just
/// flags that a global got assigned; the lifecycle wrapper scripts
/// (recognized by their `lifecycle.report` call) report synchronously so
/// `run_lifecycle_script`'s poll loop resolves on its first iteration.
struct FakeEngine {
    registry: Arc<Mutex<LifecycleResultRegistry>>,
    app_name: String,
    assigned: bool,
    update_payload: &'static str,
}

impl JsEngine for FakeEngine {
    fn eval_script(&mut self, source: &str, _url: &str) -> AnyResult<()> {
        if source.contains("lifecycle.report") {
            if let Ok(mut guard) = self.registry.lock() {
                guard.set(LifecycleOutcome::Ok(self.update_payload.to_owned()));
            }
        } else {
            self.assigned = true;
        }
        Ok(())
    }

    fn eval_module(&mut self, source: &str, url: &str) -> AnyResult<()> {
        self.eval_script(source, url)
    }

    fn run_jobs(&mut self) -> AnyResult<()> {
        Ok(())
    }

    fn last_global_assignment_key(&mut self) -> Option<String> {
        self.assigned.then(|| self.app_name.clone())
    }
}

/// Builds a [`FakeEngine`] per app instance; `has_update_apps` controls
/// whether that app's entry is reported as exporting `update`.
struct FakeEngineBuilder {
    has_update_apps: Vec<String>,
}

impl EngineBuilder for FakeEngineBuilder {
    fn build(&self, host_context: &HostContext) -> anyhow::Result<Box<dyn JsEngine + Send>> {
        let update_payload = if self.has_update_apps.contains(&host_context.app_name) { "1" } else { "0" };
        Ok(Box::new(FakeEngine {
            registry: Arc::clone(&host_context.lifecycle_registry),
            app_name: host_context.app_name.clone(),
            assigned: false,
            update_payload,
        }))
    }

    fn supports_real_sandbox(&self) -> bool {
        true
    }
}

fn fetch_cache_serving(pages: Vec<(&'static str, &'static str)>) -> Arc<AssetCache> {
    Arc::new(AssetCache::with_fetch_override(Arc::new(move |url: Url| {
        let body = pages.iter().find(|(path, _)| url.as_str().ends_with(path)).map_or_else(String::new, |(_, body)| (*body).to_owned());
        async move { Ok(Arc::new(CachedAsset { body, content_type: None, url })) }.boxed()
    })))
}

const ENTRY_HTML: &str = r#"<html><body><script entry src="main.js"></script><div id="root"></div></body></html>"#;

fn page_resources(fetch_cache: Arc<AssetCache>) -> (PageResources, NodeKey) {
    let (mut dom, _rx) = DOM::new();
    let root = dom.root_key();
    let container = dom.new_element("div");
    dom.append_child(root, container);
    let dom = Arc::new(tokio::sync::Mutex::new(dom));
    let page = PageResources {
        dom,
        fetch_cache,
        dom_index: Arc::new(Mutex::new(DomIndexState::default())),
        singular_gate: Arc::new(Mutex::new(SingularGate::new())),
        tokio_handle: tokio::runtime::Handle::current(),
        page_origin: String::from("https://host.example"),
        key_space: Arc::new(Mutex::new(KeySpace::new())),
        head: None,
    };
    (page, container)
}

fn app_config(name: &str, prefix: &str, container: NodeKey) -> AppConfig {
    AppConfig {
        name: name.to_owned(),
        entry: Entry::Html(Url::parse("https://host.example/app/entry.html").expect("static url parses")),
        container,
        active_rule: ActiveRule::Prefix(prefix.to_owned()),
        props: Value::Null,
        loader: None,
        singular: None,
        style_scope: None,
    }
}

#[tokio::test]
async fn starting_the_router_mounts_the_app_matching_the_initial_path() {
    let cache = fetch_cache_serving(vec![("entry.html", ENTRY_HTML), ("main.js", "window.widget = {};")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![String::from("widget")] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    controller.register_micro_apps(vec![app_config("widget", "/widget", container)], None).expect("registers cleanly");
    controller.start(Location::new("/widget/page")).await.expect("initial reroute mounts the matching app");

    assert_eq!(controller.status_of("widget").await, Some(AppStatus::Mounted));
}

#[tokio::test]
async fn navigating_out_of_scope_unmounts_the_app() {
    let cache = fetch_cache_serving(vec![("entry.html", ENTRY_HTML), ("main.js", "window.widget = {};")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    controller.register_micro_apps(vec![app_config("widget", "/widget", container)], None).expect("registers cleanly");
    controller.start(Location::new("/widget/page")).await.expect("initial reroute mounts the matching app");
    assert_eq!(controller.status_of("widget").await, Some(AppStatus::Mounted));

    controller.navigate(Location::new("/elsewhere")).await.expect("reroute unmounts the app");
    assert_eq!(controller.status_of("widget").await, Some(AppStatus::NotMounted));
}

#[tokio::test]
async fn singular_mode_unmounts_the_incumbent_before_mounting_the_challenger() {
    let cache = fetch_cache_serving(vec![("entry.html", ENTRY_HTML), ("main.js", "window.a = {}; window.b = {};")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![] });
    let mut config = QiankunConfig::default();
    config.singular = Some(true);
    let controller = qiankun::LifecycleController::new(page, builder, config);

    controller
        .register_micro_apps(vec![app_config("a", "/shared", container), app_config("b", "/shared", container)], None)
        .expect("registers cleanly");

    controller.mount_app("a").await.expect("a mounts");
    assert_eq!(controller.status_of("a").await, Some(AppStatus::Mounted));

    controller.mount_app("b").await.expect("b mounts, evicting a");
    assert_eq!(controller.status_of("a").await, Some(AppStatus::NotMounted));
    assert_eq!(controller.status_of("b").await, Some(AppStatus::Mounted));
}

#[tokio::test]
async fn update_is_rejected_when_the_entry_never_exported_it() {
    let cache = fetch_cache_serving(vec![("entry.html", ENTRY_HTML), ("main.js", "window.widget = {};")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    controller.register_micro_apps(vec![app_config("widget", "/widget", container)], None).expect("registers cleanly");
    controller.mount_app("widget").await.expect("mounts");

    let result = controller.update_app("widget", json!({"count": 1})).await;
    assert!(matches!(result, Err(QiankunError::UpdateNotSupported { app }) if app == "widget"));
}

#[tokio::test]
async fn update_succeeds_when_the_entry_exported_it() {
    let cache = fetch_cache_serving(vec![("entry.html", ENTRY_HTML), ("main.js", "window.widget = {};")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![String::from("widget")] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    controller.register_micro_apps(vec![app_config("widget", "/widget", container)], None).expect("registers cleanly");
    controller.mount_app("widget").await.expect("mounts");

    controller.update_app("widget", json!({"count": 1})).await.expect("update is supported");
    assert_eq!(controller.status_of("widget").await, Some(AppStatus::Mounted));
}

#[tokio::test]
async fn manifest_entries_load_and_mount_from_their_script_list() {
    let cache = fetch_cache_serving(vec![("main.js", "window.widget = {};")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    let mut config = app_config("widget", "/widget", container);
    config.entry = Entry::Manifest {
        scripts: vec![Url::parse("https://host.example/app/main.js").expect("static url parses")],
        styles: vec![],
    };
    let micro_app = controller.load_app(config);

    micro_app.load_promise().await.wait().await.expect("manifest entry loads");
    micro_app.mount_promise().await.wait().await.expect("manifest entry mounts");
    assert_eq!(micro_app.get_status().await, AppStatus::Mounted);
}

#[tokio::test]
async fn a_mount_failure_is_also_dispatched_on_the_error_bus() {
    let cache = fetch_cache_serving(vec![("entry.html", "<html><body><p>no entry script here</p></body></html>")]);
    let (page, container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    controller.error_bus.add_handler(Arc::new(move |event| {
        seen_clone.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(event.app_name.clone());
    }));

    controller.register_micro_apps(vec![app_config("broken", "/broken", container)], None).expect("registers cleanly");
    let result = controller.mount_app("broken").await;

    assert!(result.is_err());
    assert_eq!(controller.status_of("broken").await, Some(AppStatus::SkipBecauseBroken));
    assert_eq!(*seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner), vec![String::from("broken")]);
}

#[tokio::test]
async fn global_state_bus_is_shared_across_the_controller() {
    let cache = fetch_cache_serving(vec![]);
    let (page, _container) = page_resources(cache);
    let builder: Arc<dyn EngineBuilder> = Arc::new(FakeEngineBuilder { has_update_apps: vec![] });
    let controller = qiankun::LifecycleController::new(page, builder, QiankunConfig::default());

    let seen = Arc::new(Mutex::new(None));
    let seen_clone = Arc::clone(&seen);
    controller.global_state.on_global_state_change(Arc::new(move |state, caller| {
        *seen_clone.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some((state.clone(), caller.to_owned()));
    }));

    controller.global_state.set_global_state(json!({"theme": "dark"}), "widget");

    let (state, caller) = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone().expect("subscriber ran");
    assert_eq!(state["theme"], "dark");
    assert_eq!(caller, "widget");
}
