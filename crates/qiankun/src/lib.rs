//! Qiankun: a browser-side micro-frontend runtime, reworked as an embeddable
//! Rust library. Loads independently built web applications ("micro-apps")
//! into a host page, isolates their side effects on the shared document and
//! global scope, coordinates their lifecycles with URL-driven routing, and
//! lets them cohabit without colliding on globals, styles, timers, or
//! event listeners.
//!
//! The runtime is composed of four tightly coupled subsystems, each living
//! in its own crate in this workspace:
//!
//! - [`qiankun_fetch`] — C1, the asset fetcher & cache.
//! - [`qiankun_dom`] / [`qiankun_style`] — C2/C6, the node transformer and
//!   head virtualization.
//! - [`qiankun_loader`] — C3/C5, the streaming HTML entry loader and its
//!   deferred-script queue.
//! - [`qiankun_sandbox`] — C4, the per-app JavaScript sandbox.
//! - [`qiankun_js`] / [`qiankun_js_v8`] — the engine-agnostic host binding
//!   surface and its stub/V8 implementations.
//!
//! This crate is the fourth subsystem: C7 (lifecycle controller), C8
//! (router integration), C9 (prefetcher), and C10 (the global error bus),
//! plus the cross-app global state bus and the public API surface that
//! ties everything together.

pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod error_bus;
pub mod global_state;
pub mod host;
pub mod instance;
pub mod micro_app;
pub mod phase;
pub mod prefetch;
pub mod router;
pub mod runtime;
pub mod status;

pub use app::{ActiveRule, AppConfig, Entry, GlobalLifecycleHooks, LifecycleHook, LoaderHook};
pub use config::{QiankunConfig, SandboxMode};
pub use controller::LifecycleController;
pub use error::QiankunError;
pub use error_bus::{ErrorBus, ErrorEvent};
pub use global_state::GlobalStateBus;
pub use host::{EngineBuilder, PageResources, StubEngineBuilder};
#[cfg(feature = "v8")]
pub use host::V8EngineBuilder;
pub use micro_app::MicroApp;
pub use prefetch::PrefetchStrategy;
pub use router::{Location, RerouteDiff, Router};
pub use status::AppStatus;
