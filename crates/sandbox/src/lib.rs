//! The per-app JavaScript sandbox (C4): a proxied global scope that records
//! every global write, DOM attachment, timer, and listener so it can be
//! rewound on unmount, plus the host-bindings facade any script engine
//! adapter installs its `console`/`document`/`window`/`net`/`timers`
//! namespaces from. Engine-agnostic by design — nothing here depends on a
//! specific JS engine, only on [`qiankun_js::JsEngine`]'s trait boundary.

pub mod bindings;
pub mod dom_index;
pub mod interceptor;
pub mod mutation;
pub mod queue;
pub mod sandbox;
pub mod logger;
pub mod values;

pub use bindings::{
    build_console_namespace, build_default_bindings, build_lifecycle_namespace, build_performance_namespace,
    CreatedNodeInfo, CreatedNodeKind, HostBindings, HostContext, HostFnKind, HostFnSync, HostNamespace,
    LifecycleOutcome, LifecycleResultRegistry,
};
pub use dom_index::{DomIndex, DomIndexState, SharedDomIndex};
pub use interceptor::{InterceptTarget, Interceptor, InterceptorRegistry};
pub use logger::{Console, ConsoleLogger, HostLogger};
pub use mutation::{HostRewindSink, ListenerTarget, MutationLog, MutationRecord, RewindSink, TimerKind};
pub use queue::{DeferredScript, DeferredScriptQueue};
pub use sandbox::{new_global_context, GlobalContext, Sandbox, SingularGate};
pub use values::{stringify_arguments, JSError, JSValue, LogLevel};
