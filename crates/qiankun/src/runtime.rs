//! The process-wide default runtime: the free-function API (`register_micro_apps`,
//! `start`, `load_micro_app`, ...) that mirrors the module-level singleton
//! qiankun's own JS package exposes, for embedders who only ever want one
//! [`LifecycleController`] per process rather than constructing one
//! explicitly. Grounded on `crates/page_handler/src/runtime.rs`'s
//! module-level `static RUNTIME: OnceCell<...>` pattern for the
//! process-wide default.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::app::{AppConfig, GlobalLifecycleHooks};
use crate::config::QiankunConfig;
use crate::controller::LifecycleController;
use crate::error::QiankunError;
use crate::error_bus::ErrorEvent;
use crate::host::{EngineBuilder, PageResources};
use crate::micro_app::MicroApp;
use crate::router::Location;

static DEFAULT_RUNTIME: OnceCell<Arc<LifecycleController>> = OnceCell::new();

/// Install the process-wide default controller. Must be called exactly
/// once before any of this module's free functions; embedders that want
/// more than one controller per process should construct
/// [`LifecycleController::new`] directly instead of using this module.
///
/// # Errors
/// Returns [`QiankunError::Loader`]-wrapped `Reentrancy` if a default
/// runtime has already been installed.
pub fn install(page: PageResources, engine_builder: Arc<dyn EngineBuilder>, config: QiankunConfig) -> Result<(), QiankunError> {
    let controller = LifecycleController::new(page, engine_builder, config);
    DEFAULT_RUNTIME
        .set(controller)
        .map_err(|_| QiankunError::Loader(qiankun_loader::QiankunError::Reentrancy))
}

fn runtime() -> Result<&'static Arc<LifecycleController>, QiankunError> {
    DEFAULT_RUNTIME
        .get()
        .ok_or_else(|| QiankunError::Loader(qiankun_loader::QiankunError::RuntimeIncompatible { missing: String::from("runtime::install was never called") }))
}

/// `registerMicroApps(apps, globalLifecycles?)`.
///
/// # Errors
/// See [`LifecycleController::register_micro_apps`].
pub fn register_micro_apps(apps: Vec<AppConfig>, global_lifecycles: Option<GlobalLifecycleHooks>) -> Result<(), QiankunError> {
    runtime()?.register_micro_apps(apps, global_lifecycles)
}

/// `start(opts)`.
///
/// # Errors
/// See [`LifecycleController::start`].
pub async fn start(initial_location: Location) -> Result<(), QiankunError> {
    runtime()?.start(initial_location).await
}

/// `loadMicroApp(config, opts)`.
///
/// # Errors
/// Only if the default runtime was never installed.
pub fn load_micro_app(config: AppConfig) -> Result<Arc<MicroApp>, QiankunError> {
    Ok(runtime()?.load_app(config))
}

/// Reroute against a new URL path, as if the host page navigated.
///
/// # Errors
/// See [`LifecycleController::navigate`].
pub async fn navigate(path: impl Into<String>) -> Result<(), QiankunError> {
    runtime()?.navigate(Location::new(path)).await
}

/// `initGlobalState(state)`: returns the shared [`crate::global_state::GlobalStateBus`] handle.
///
/// # Errors
/// Only if the default runtime was never installed.
pub fn global_state() -> Result<crate::global_state::GlobalStateBus, QiankunError> {
    Ok(runtime()?.global_state.clone())
}

/// `addGlobalUncaughtErrorHandler(fn)`.
///
/// # Errors
/// Only if the default runtime was never installed.
pub fn add_global_uncaught_error_handler(handler: Arc<dyn Fn(&ErrorEvent) + Send + Sync>) -> Result<(), QiankunError> {
    runtime()?.error_bus.add_handler(handler);
    Ok(())
}

/// `removeGlobalUncaughtErrorHandler(fn)`.
///
/// # Errors
/// Only if the default runtime was never installed.
pub fn remove_global_uncaught_error_handler(handler: &Arc<dyn Fn(&ErrorEvent) + Send + Sync>) -> Result<(), QiankunError> {
    runtime()?.error_bus.remove_handler(handler);
    Ok(())
}

/// `isRuntimeCompatible()` (spec.md §6/§9): whether the installed runtime's
/// engine can run real app script, versus the no-op stub.
///
/// # Errors
/// Only if the default runtime was never installed.
pub fn is_runtime_compatible() -> Result<bool, QiankunError> {
    Ok(runtime()?.is_runtime_compatible())
}
