//! C7: the lifecycle controller. Drives each registered app through
//! `NOT_LOADED → ... → MOUNTED → ... → NOT_MOUNTED` (spec.md §4.7's state
//! diagram), wires C8's reroute diff and C9's prefetch strategy into that
//! state machine, and is the thing `qiankun_loader::load_entry`/
//! `qiankun_loader::entry::run_lifecycle_script` answer to — grounded on
//! `crates/page_handler/src/scheduler.rs`'s `FrameScheduler`, which drove a
//! comparable "one phase transition in flight per resource, hooks run in
//! order, failures are absorbed and reported" state machine for frames
//! rather than micro-apps.
//!
//! Per-app instances are guarded by a `tokio::sync::Mutex` rather than
//! `std`'s: loading and invoking a phase holds the instance across many
//! `.await` points (fetches, script runs), which a `std::sync::MutexGuard`
//! can't safely do. The sandbox and page-wide registries stay on `std`
//! mutexes since they're only ever touched for the duration of a single
//! synchronous call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use qiankun_js::NodeKey;
use qiankun_loader::entry::{build_invoke_phase_script, run_lifecycle_script};
use qiankun_loader::{load_entry, load_manifest, QiankunError as LoaderError};
use qiankun_sandbox::bindings::LifecycleOutcome;
use qiankun_sandbox::{new_global_context, GlobalContext, Sandbox, SingularGate};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::app::{AppConfig, Entry, GlobalLifecycleHooks, LifecycleHook};
use crate::config::{QiankunConfig, SandboxMode};
use crate::error::QiankunError;
use crate::error_bus::{ErrorBus, ErrorEvent};
use crate::global_state::GlobalStateBus;
use crate::host::{build_app_host, EngineBuilder, PageResources};
use crate::instance::AppInstance;
use crate::micro_app::MicroApp;
use crate::prefetch::{apps_to_prefetch, entry_urls, IdleQueue, PrefetchStrategy};
use crate::router::{Location, Router};
use crate::status::AppStatus;

type SharedInstance = Arc<AsyncMutex<AppInstance>>;

/// Owns every registered app's [`AppInstance`] and the shared page/runtime
/// resources they're built from. Callers hold this behind an `Arc` — every
/// operation takes `&self` and is safe to call concurrently (spec.md §5
/// "no lock is held across awaits").
pub struct LifecycleController {
    page: PageResources,
    engine_builder: Arc<dyn EngineBuilder>,
    config: Mutex<QiankunConfig>,
    registered: Mutex<HashMap<String, AppConfig>>,
    instances: Mutex<HashMap<String, SharedInstance>>,
    global_hooks: Mutex<GlobalLifecycleHooks>,
    router: Mutex<Router>,
    singular_gate: Arc<Mutex<SingularGate>>,
    pub error_bus: ErrorBus,
    pub global_state: GlobalStateBus,
    started: AtomicBool,
}

impl LifecycleController {
    #[must_use]
    pub fn new(page: PageResources, engine_builder: Arc<dyn EngineBuilder>, config: QiankunConfig) -> Arc<Self> {
        let singular_gate = Arc::clone(&page.singular_gate);
        Arc::new(Self {
            page,
            engine_builder,
            config: Mutex::new(config),
            registered: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            global_hooks: Mutex::new(GlobalLifecycleHooks::new()),
            router: Mutex::new(Router::new(Location::default())),
            singular_gate,
            error_bus: ErrorBus::new(),
            global_state: GlobalStateBus::new(Value::Object(serde_json::Map::new())),
            started: AtomicBool::new(false),
        })
    }

    fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// `registerMicroApps(apps, globalLifecycles?)` (spec.md §4.7).
    /// Re-registration with an identical `(name, entry)` is a silent no-op;
    /// a conflicting re-registration is rejected.
    ///
    /// # Errors
    /// Returns [`QiankunError::ConflictingRegistration`] if `name` is
    /// already registered with a different entry, or
    /// [`LoaderError::RuntimeIncompatible`] if this controller's engine
    /// builder can't actually run app script (spec.md §6/§9 "Proxy
    /// capability absent").
    pub fn register_micro_apps(
        &self,
        apps: Vec<AppConfig>,
        global_lifecycles: Option<GlobalLifecycleHooks>,
    ) -> Result<(), QiankunError> {
        self.require_runtime_compatible()?;
        let mut registered = Self::lock(&self.registered);
        for app in apps {
            if let Some(existing) = registered.get(&app.name) {
                if !existing.registration_matches(&app) {
                    return Err(QiankunError::ConflictingRegistration { name: app.name });
                }
                continue;
            }
            registered.insert(app.name.clone(), app);
        }
        drop(registered);
        if let Some(hooks) = global_lifecycles {
            *Self::lock(&self.global_hooks) = hooks;
        }
        Ok(())
    }

    /// `start(opts)` (spec.md §4.7): arms the router (an initial reroute
    /// against `initial_location`) and kicks off the prefetcher. A second
    /// call is a no-op (spec.md §7 "`Reentrancy`... second call is a no-op
    /// and emits a warning").
    ///
    /// # Errors
    /// Returns [`LoaderError::RuntimeIncompatible`] if this controller's
    /// engine builder can't run app script; otherwise propagates the first
    /// mount failure from the initial reroute.
    pub async fn start(self: &Arc<Self>, initial_location: Location) -> Result<(), QiankunError> {
        self.require_runtime_compatible()?;
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("qiankun: start() called more than once, ignoring");
            return Ok(());
        }

        let apps: Vec<AppConfig> = Self::lock(&self.registered).values().cloned().collect();
        let active_now: Vec<String> =
            apps.iter().filter(|app| app.active_rule.matches(&initial_location.path)).map(|app| app.name.clone()).collect();

        let strategy = Self::lock(&self.config).prefetch.clone();
        self.spawn_prefetch(&strategy, &apps, &active_now);

        self.navigate(initial_location).await
    }

    /// A router-driven reroute (spec.md §4.8). Diffs `location` against
    /// every registered app's `active_rule`, unmounts everything leaving
    /// scope, then mounts everything entering it.
    ///
    /// # Errors
    /// Returns the first error encountered; later apps in the same reroute
    /// still get a chance to run (every failure is also dispatched on the
    /// error bus).
    pub async fn navigate(self: &Arc<Self>, location: Location) -> Result<(), QiankunError> {
        let apps: Vec<AppConfig> = Self::lock(&self.registered).values().cloned().collect();
        let diff = Self::lock(&self.router).navigate(location, &apps);

        // spec.md §4.8 bullet 5: all unmounts start before any mounts.
        // Running both lists sequentially satisfies this regardless of
        // `singular`, trading the `singular = false` parallel-mount
        // opportunity for simpler, still spec-correct ordering (see
        // DESIGN.md Open Questions, "reroute ordering vs. `singular`").
        let mut first_error = None;
        for name in &diff.to_unmount {
            if let Err(error) = self.unmount_app(name).await {
                first_error.get_or_insert_with(|| error.clone());
            }
        }
        for name in &diff.to_mount {
            if let Err(error) = self.mount_app(name).await {
                first_error.get_or_insert_with(|| error.clone());
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn spawn_prefetch(self: &Arc<Self>, strategy: &PrefetchStrategy, apps: &[AppConfig], active_now: &[String]) {
        let names = apps_to_prefetch(strategy, apps, active_now);
        if names.is_empty() {
            return;
        }
        let mut queue = IdleQueue::new();
        for app in apps.iter().filter(|app| names.contains(&app.name)) {
            for url in entry_urls(app) {
                queue.push(url);
            }
        }
        let fetch_cache = Arc::clone(&self.page.fetch_cache);
        self.page.tokio_handle.spawn(async move { queue.drain(&fetch_cache).await });
    }

    /// `loadMicroApp(config, opts)` (spec.md §4.7/§4.1): load and mount a
    /// single app outside the router's reroute cycle, returning a
    /// [`MicroApp`] handle before the load has even started — callers
    /// observe progress via the handle's phase promises (spec.md §5 "a
    /// script can synchronously call `loadMicroApp` from within another
    /// app's `mount`"; this method never awaits its own work before
    /// returning, so it is safe to call re-entrantly).
    pub fn load_app(self: &Arc<Self>, config: AppConfig) -> Arc<MicroApp> {
        let name = config.name.clone();
        Self::lock(&self.registered).entry(name.clone()).or_insert_with(|| config.clone());
        let instance = self.ensure_instance(&config);
        let handle = MicroApp::new(name.clone(), instance, Arc::clone(self));

        let controller = Arc::clone(self);
        self.page.tokio_handle.spawn(async move {
            if let Err(error) = controller.mount_app(&name).await {
                controller.error_bus.dispatch(ErrorEvent { error, app_name: name, lifecycle_name: String::from("mount") });
            }
        });
        handle
    }

    fn ensure_instance(&self, config: &AppConfig) -> SharedInstance {
        let mut instances = Self::lock(&self.instances);
        if let Some(existing) = instances.get(&config.name) {
            return Arc::clone(existing);
        }

        let global: GlobalContext =
            Self::lock(&self.config).global_context.clone().unwrap_or_else(new_global_context);
        let sandbox_mode = Self::lock(&self.config).sandbox;
        let sandbox = Arc::new(Mutex::new(if sandbox_mode == SandboxMode::Disabled {
            Sandbox::snapshot(config.name.clone(), global, Arc::clone(&self.page.dom_index))
        } else {
            Sandbox::proxy(config.name.clone(), global, Arc::clone(&self.page.dom_index))
        }));

        let (dom_sender, _dom_receiver) = tokio::sync::mpsc::channel(64);
        let host = build_app_host(&self.page, &config.name, Arc::clone(&sandbox), self.page.head, dom_sender);
        let engine =
            self.engine_builder.build(&host.host_context).unwrap_or_else(|_| Box::new(qiankun_js_v8::StubEngine::new()));

        let instance =
            Arc::new(AsyncMutex::new(AppInstance::new(config.clone(), sandbox, engine, host, config.container)));
        instances.insert(config.name.clone(), Arc::clone(&instance));
        instance
    }

    fn instance_config(&self, name: &str) -> Option<AppConfig> {
        Self::lock(&self.registered).get(name).cloned()
    }

    async fn run_hooks(hooks: &[LifecycleHook]) -> Result<(), QiankunError> {
        for hook in hooks {
            (hook)().await.map_err(|error| {
                QiankunError::Loader(LoaderError::LifecycleThrew {
                    app: String::new(),
                    phase: String::from("hook"),
                    message: error.to_string(),
                })
            })?;
        }
        Ok(())
    }

    /// Load (if needed) and bootstrap (if needed) `name`'s entry, settling
    /// its `load_promise`.
    async fn ensure_loaded(&self, name: &str) -> Result<SharedInstance, QiankunError> {
        let config = self.instance_config(name).ok_or_else(|| QiankunError::UnknownApp { name: name.to_owned() })?;
        let instance = self.ensure_instance(&config);

        let status = instance.lock().await.status;
        if status == AppStatus::SkipBecauseBroken {
            return Err(QiankunError::AppBroken { app: name.to_owned() });
        }
        if status != AppStatus::NotLoaded {
            let load_promise = instance.lock().await.load_promise.clone();
            load_promise.wait().await?;
            return Ok(instance);
        }

        instance.lock().await.status = AppStatus::LoadingSourceCode;
        let load_result = self.run_load(&instance, &config).await;
        {
            let mut guard = instance.lock().await;
            guard.status = if load_result.is_ok() { AppStatus::NotBootstrapped } else { AppStatus::SkipBecauseBroken };
        }
        instance.lock().await.load_promise.resolve(load_result.clone());
        if let Err(error) = &load_result {
            self.error_bus.dispatch(ErrorEvent {
                error: error.clone(),
                app_name: name.to_owned(),
                lifecycle_name: String::from("load"),
            });
        }
        load_result?;

        self.run_bootstrap(&instance, name).await?;
        Ok(instance)
    }

    async fn run_load(&self, instance: &SharedInstance, config: &AppConfig) -> Result<(), QiankunError> {
        let fetch_cache = Arc::clone(&self.page.fetch_cache);
        let style_scope = config.style_scope.clone();
        let container = config.container;
        let head = self.page.head;
        let name = config.name.clone();
        let (stream_transformer, node_transformer) = {
            let config = Self::lock(&self.config);
            (config.stream_transformer.clone(), config.node_transformer.clone())
        };

        let mut guard = instance.lock().await;
        let AppInstance { engine, host, deferred_queue, .. } = &mut *guard;
        let lifecycle_registry = Arc::clone(&host.lifecycle_registry);
        let mut dom = self.page.dom.lock().await;
        let resolved = match &config.entry {
            Entry::Html(entry_url) => {
                load_entry(
                    engine,
                    &lifecycle_registry,
                    &fetch_cache,
                    deferred_queue,
                    &mut dom,
                    container,
                    head,
                    entry_url,
                    &name,
                    style_scope.as_deref(),
                    stream_transformer.as_ref(),
                    node_transformer.as_ref(),
                )
                .await
            }
            Entry::Manifest { scripts, styles } => {
                load_manifest(
                    engine,
                    &lifecycle_registry,
                    &fetch_cache,
                    &mut dom,
                    head,
                    scripts,
                    styles,
                    &name,
                    style_scope.as_deref(),
                )
                .await
            }
        };
        drop(dom);

        match resolved {
            Ok(resolved) => {
                guard.library_name = Some(resolved.library_name);
                guard.has_update = resolved.has_update;
                drop(guard);
                for error in resolved.deferred_errors {
                    self.error_bus.dispatch(ErrorEvent {
                        error: QiankunError::Loader(error),
                        app_name: name.clone(),
                        lifecycle_name: String::from("load"),
                    });
                }
                Ok(())
            }
            Err(error) => Err(QiankunError::Loader(error)),
        }
    }

    async fn run_bootstrap(&self, instance: &SharedInstance, name: &str) -> Result<(), QiankunError> {
        instance.lock().await.status = AppStatus::Bootstrapping;
        let outcome = self.invoke_phase(instance, "bootstrap", &Value::Null).await;
        match &outcome {
            Ok(()) => {
                instance.lock().await.status = AppStatus::NotMounted;
            }
            Err(error) => {
                instance.lock().await.status = AppStatus::SkipBecauseBroken;
                self.error_bus.dispatch(ErrorEvent {
                    error: error.clone(),
                    app_name: name.to_owned(),
                    lifecycle_name: String::from("bootstrap"),
                });
            }
        }
        outcome
    }

    /// `MicroApp.mount()` and the mount half of a router reroute (spec.md
    /// §4.7 "Singleton coordination"). Resolves `mount_promise`.
    ///
    /// # Errors
    /// Propagates load/bootstrap/mount failures; all are also dispatched
    /// on the error bus.
    pub async fn mount_app(self: &Arc<Self>, name: &str) -> Result<(), QiankunError> {
        let instance = self.ensure_loaded(name).await?;

        if instance.lock().await.status == AppStatus::Mounted {
            return Ok(());
        }

        let config = self.instance_config(name).ok_or_else(|| QiankunError::UnknownApp { name: name.to_owned() })?;
        let singular = Self::lock(&self.config).effective_singular(config.singular);

        if singular {
            let incumbent = Self::lock(&self.singular_gate).claim(name);
            if let Some(incumbent) = incumbent {
                self.unmount_app(&incumbent).await?;
            }
        }

        {
            let mut guard = instance.lock().await;
            guard.reset_for_remount();
            guard.status = AppStatus::Mounting;
        }

        let before_mount = Self::lock(&self.global_hooks).before_mount.clone();
        if let Err(error) = Self::run_hooks(&before_mount).await {
            return self.fail_mount(&instance, name, error).await;
        }

        let sandbox = Arc::clone(&instance.lock().await.sandbox);
        Self::lock(&sandbox).activate();

        let props = Self::merged_props(name, &config.props);
        if let Err(error) = self.invoke_phase(&instance, "mount", &props).await {
            return self.fail_mount(&instance, name, error).await;
        }

        {
            let mut guard = instance.lock().await;
            guard.status = AppStatus::Mounted;
            guard.last_props = props;
        }
        instance.lock().await.mount_promise.resolve(Ok(()));

        let after_mount = Self::lock(&self.global_hooks).after_mount.clone();
        if let Err(error) = Self::run_hooks(&after_mount).await {
            self.error_bus.dispatch(ErrorEvent {
                error,
                app_name: name.to_owned(),
                lifecycle_name: String::from("afterMount"),
            });
        }

        // An `unmount_app` call that arrived mid-`MOUNTING` (spec.md §4.7)
        // couldn't be started then; carry it out now that mount has settled
        // instead of dropping it, which would otherwise leave the router's
        // own `active` bookkeeping permanently out of sync with the real
        // app status.
        let queued_unmount = std::mem::take(&mut instance.lock().await.pending_unmount);
        if queued_unmount {
            self.perform_unmount(&instance, name).await?;
        }
        Ok(())
    }

    async fn fail_mount(&self, instance: &SharedInstance, name: &str, error: QiankunError) -> Result<(), QiankunError> {
        {
            let mut guard = instance.lock().await;
            guard.status = AppStatus::SkipBecauseBroken;
            guard.mount_promise.resolve(Err(error.clone()));
            // A failed mount never left anything mounted, so a queued unmount
            // (spec.md §4.7) has nothing to undo and resolves immediately.
            if std::mem::take(&mut guard.pending_unmount) {
                guard.unmount_promise.resolve(Ok(()));
            }
        }
        self.error_bus.dispatch(ErrorEvent {
            error: error.clone(),
            app_name: name.to_owned(),
            lifecycle_name: String::from("mount"),
        });
        Err(error)
    }

    /// `MicroApp.unmount()` and the unmount half of a reroute. Idempotent:
    /// unmounting an app that is already `NOT_MOUNTED`/`NOT_LOADED` is a
    /// no-op success. Calling this while the app is still `MOUNTING` queues
    /// the unmount rather than dropping it: `mount_app` carries it out (via
    /// `perform_unmount`) once `mount` settles, and this call waits on the
    /// same `unmount_promise` that settlement resolves.
    ///
    /// # Errors
    /// Propagates an unmount-phase failure; the sandbox is still rewound
    /// and the container still emptied regardless (spec.md §4.7 "`unmount`
    /// must complete before the controller considers the container free").
    pub async fn unmount_app(&self, name: &str) -> Result<(), QiankunError> {
        let Some(instance) = Self::lock(&self.instances).get(name).cloned() else {
            return Ok(());
        };
        let status = instance.lock().await.status;
        match status {
            AppStatus::Mounted | AppStatus::Updating => self.perform_unmount(&instance, name).await,
            // Nothing to unmount yet, but `mount_app` is already in flight:
            // queue it and wait for the unmount `mount_app` performs on our
            // behalf once `mount` settles (see `mount_app`/`fail_mount`),
            // rather than silently dropping it.
            AppStatus::Mounting => {
                instance.lock().await.pending_unmount = true;
                let unmount_promise = instance.lock().await.unmount_promise.clone();
                unmount_promise.wait().await
            }
            _ => Ok(()),
        }
    }

    async fn perform_unmount(&self, instance: &SharedInstance, name: &str) -> Result<(), QiankunError> {
        instance.lock().await.status = AppStatus::Unmounting;

        let before_unmount = Self::lock(&self.global_hooks).before_unmount.clone();
        let hook_result = Self::run_hooks(&before_unmount).await;
        let phase_result = match hook_result {
            Ok(()) => self.invoke_phase(instance, "unmount", &Value::Null).await,
            Err(error) => Err(error),
        };

        let sandbox = Arc::clone(&instance.lock().await.sandbox);
        let had_partial_rewind = Self::lock(&sandbox).deactivate();
        if had_partial_rewind {
            self.error_bus.dispatch(ErrorEvent {
                error: QiankunError::Loader(LoaderError::SandboxRewindPartial { app: name.to_owned() }),
                app_name: name.to_owned(),
                lifecycle_name: String::from("unmount"),
            });
        }
        self.empty_container(instance).await;
        Self::lock(&self.singular_gate).release(name);

        instance.lock().await.status = AppStatus::NotMounted;
        instance.lock().await.unmount_promise.resolve(phase_result.clone());

        if let Err(error) = &phase_result {
            self.error_bus.dispatch(ErrorEvent {
                error: error.clone(),
                app_name: name.to_owned(),
                lifecycle_name: String::from("unmount"),
            });
        } else {
            let after_unmount = Self::lock(&self.global_hooks).after_unmount.clone();
            if let Err(error) = Self::run_hooks(&after_unmount).await {
                self.error_bus.dispatch(ErrorEvent {
                    error,
                    app_name: name.to_owned(),
                    lifecycle_name: String::from("afterUnmount"),
                });
            }
        }
        phase_result
    }

    /// `MicroApp.update(newProps)` (spec.md §4.7): rejected outright unless
    /// the entry exported `update`.
    ///
    /// # Errors
    /// Returns [`QiankunError::UpdateNotSupported`] if the app's library
    /// never exported `update`, or a wrapped phase failure.
    pub async fn update_app(&self, name: &str, props: Value) -> Result<(), QiankunError> {
        let Some(instance) = Self::lock(&self.instances).get(name).cloned() else {
            return Err(QiankunError::UnknownApp { name: name.to_owned() });
        };
        if !instance.lock().await.has_update {
            return Err(QiankunError::UpdateNotSupported { app: name.to_owned() });
        }
        instance.lock().await.status = AppStatus::Updating;
        let merged = Self::merged_props(name, &props);
        let outcome = self.invoke_phase(&instance, "update", &merged).await;
        {
            let mut guard = instance.lock().await;
            guard.status = AppStatus::Mounted;
            if outcome.is_ok() {
                guard.last_props = merged;
            }
        }
        if let Err(error) = &outcome {
            self.error_bus.dispatch(ErrorEvent {
                error: error.clone(),
                app_name: name.to_owned(),
                lifecycle_name: String::from("update"),
            });
        }
        outcome
    }

    /// Merge registration `props` with the runtime helpers the controller
    /// injects. Only `name` crosses into the sandboxed script's argument —
    /// `onGlobalStateChange`/`setGlobalState` have no `JSValue` function
    /// representation and are instead reached from Rust directly via
    /// [`crate::global_state::GlobalStateBus`] (see DESIGN.md).
    fn merged_props(name: &str, props: &Value) -> Value {
        let mut merged = serde_json::Map::new();
        if let Value::Object(map) = props {
            merged.clone_from(map);
        }
        merged.insert(String::from("name"), Value::String(name.to_owned()));
        Value::Object(merged)
    }

    async fn invoke_phase(&self, instance: &SharedInstance, phase: &str, props: &Value) -> Result<(), QiankunError> {
        let (library_name, name) = {
            let guard = instance.lock().await;
            (guard.library_name.clone(), guard.name().to_owned())
        };
        let Some(library_name) = library_name else {
            return Err(QiankunError::Loader(LoaderError::EntryMissingLifecycle { app: name }));
        };
        let args_expr = serde_json::to_string(props).unwrap_or_else(|_| String::from("undefined"));
        let script = build_invoke_phase_script(&library_name, phase, &args_expr);

        let mut guard = instance.lock().await;
        let AppInstance { engine, host, .. } = &mut *guard;
        let lifecycle_registry = Arc::clone(&host.lifecycle_registry);
        let outcome =
            run_lifecycle_script(engine, &lifecycle_registry, &script, "qiankun://lifecycle", &name, phase).await;
        drop(guard);

        match outcome {
            Ok(LifecycleOutcome::Ok(_)) => Ok(()),
            Ok(LifecycleOutcome::Threw(message)) => {
                Err(QiankunError::Loader(LoaderError::LifecycleThrew { app: name, phase: phase.to_owned(), message }))
            }
            Err(error) => Err(QiankunError::Loader(error)),
        }
    }

    async fn empty_container(&self, instance: &SharedInstance) {
        let container: NodeKey = instance.lock().await.container;
        let mut dom = self.page.dom.lock().await;
        for child in dom.children_of(container) {
            dom.remove_from_parent(child);
        }
        drop(dom.finish_update());
    }

    #[must_use]
    pub fn config_snapshot(&self) -> (SandboxMode, bool) {
        let config = Self::lock(&self.config);
        (config.sandbox, config.url_reroute_only)
    }

    pub async fn status_of(&self, name: &str) -> Option<AppStatus> {
        let instance = Self::lock(&self.instances).get(name).cloned()?;
        Some(instance.lock().await.status)
    }

    /// Coarse `isRuntimeCompatible` signal (spec.md §6/§9 "Proxy capability
    /// absent"): whether this controller's engine builder links a real
    /// script engine, rather than the always-`false` no-op stub.
    #[must_use]
    pub fn is_runtime_compatible(&self) -> bool {
        self.engine_builder.supports_real_sandbox()
    }

    /// Enforces `is_runtime_compatible()` at every entry point spec.md §6
    /// says should reject outright rather than silently running apps
    /// against a no-op engine: `register_micro_apps` and `start`.
    fn require_runtime_compatible(&self) -> Result<(), QiankunError> {
        if self.is_runtime_compatible() {
            return Ok(());
        }
        Err(QiankunError::Loader(LoaderError::RuntimeIncompatible {
            missing: String::from("a script engine that can run app code (the configured EngineBuilder only supports the no-op stub)"),
        }))
    }
}
