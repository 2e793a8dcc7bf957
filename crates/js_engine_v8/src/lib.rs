//! Pluggable script-engine backend for the sandbox's [`qiankun_js::JsEngine`]
//! trait. The real engine (`V8Engine`) lives behind the `v8` feature and
//! links `rusty_v8`; the default `stub` feature provides a no-op engine for
//! builds and subsystems that need a `JsEngine` impl without executing real
//! script.

#[cfg(feature = "v8")]
mod bindings;
#[cfg(feature = "v8")]
mod conversions;
#[cfg(feature = "v8")]
mod engine;
#[cfg(feature = "v8")]
pub use engine::V8Engine;

mod stub;
pub use stub::StubEngine;
