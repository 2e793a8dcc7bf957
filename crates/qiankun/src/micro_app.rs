//! The `MicroApp` handle (spec.md §4.7 "`loadApp(config, opts) → MicroApp`")
//! callers hold onto after registering or manually loading an app: a thin,
//! `Clone`-free facade over the controller that forwards each public
//! operation to the one [`crate::controller::LifecycleController`] that
//! actually owns the app's [`AppInstance`].

use std::sync::Arc;

use serde_json::Value;

use crate::controller::LifecycleController;
use crate::error::QiankunError;
use crate::instance::AppInstance;
use crate::phase::PhasePromise;
use crate::status::AppStatus;

/// A handle to one loaded/loading app. Cheap to clone (everything behind
/// it is `Arc`-shared); dropping every handle does not unmount the app —
/// only an explicit [`Self::unmount`] or a router-driven reroute does.
pub struct MicroApp {
    name: String,
    instance: Arc<tokio::sync::Mutex<AppInstance>>,
    controller: Arc<LifecycleController>,
}

impl MicroApp {
    pub(crate) fn new(name: String, instance: Arc<tokio::sync::Mutex<AppInstance>>, controller: Arc<LifecycleController>) -> Arc<Self> {
        Arc::new(Self { name, instance, controller })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `getStatus()` (spec.md §4.7).
    pub async fn get_status(&self) -> AppStatus {
        self.instance.lock().await.status
    }

    /// `loadPromise` accessor.
    pub async fn load_promise(&self) -> PhasePromise {
        self.instance.lock().await.load_promise.clone()
    }

    /// `mountPromise` accessor.
    pub async fn mount_promise(&self) -> PhasePromise {
        self.instance.lock().await.mount_promise.clone()
    }

    /// `unmountPromise` accessor.
    pub async fn unmount_promise(&self) -> PhasePromise {
        self.instance.lock().await.unmount_promise.clone()
    }

    /// `mount()`: idempotent if already `MOUNTED`.
    ///
    /// # Errors
    /// Propagates any load/bootstrap/mount failure.
    pub async fn mount(&self) -> Result<(), QiankunError> {
        self.controller.mount_app(&self.name).await
    }

    /// `unmount()`: idempotent if already `NOT_MOUNTED`/`NOT_LOADED`.
    ///
    /// # Errors
    /// Propagates an unmount-phase failure (the sandbox is rewound and the
    /// container emptied regardless).
    pub async fn unmount(&self) -> Result<(), QiankunError> {
        self.controller.unmount_app(&self.name).await
    }

    /// `update(newProps)`.
    ///
    /// # Errors
    /// Returns [`QiankunError::UpdateNotSupported`] if the app's entry
    /// never exported `update`.
    pub async fn update(&self, props: Value) -> Result<(), QiankunError> {
        self.controller.update_app(&self.name, props).await
    }
}
