//! Cross-engine logging (grounded on `crates/js/src/console.rs`/`crates/js/src/bindings/logger.rs`):
//! a `HostLogger` trait any script engine installs `console.*` against, plus a
//! `log`-crate-backed default and the structured `Console` used by engine
//! adapters to report uncaught exceptions.

use crate::values::LogLevel;
use log::{error, info, warn};

/// Logger used by host functions such as `console.*`.
pub trait HostLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Routes engine-level diagnostics (uncaught exceptions, prelude failures)
/// through the `log` crate with a stable `[qiankun-js]` prefix.
pub struct Console;

impl Console {
    pub fn info<M: AsRef<str>>(message: M) {
        info!("[qiankun-js]: {}", message.as_ref());
    }

    pub fn warn<M: AsRef<str>>(message: M) {
        warn!("[qiankun-js]: {}", message.as_ref());
    }

    pub fn error<M: AsRef<str>>(message: M) {
        error!("[qiankun-js]: {}", message.as_ref());
    }

    pub fn exception<M: AsRef<str>>(message: M, stack: Option<&str>) {
        match stack {
            Some(stack_trace) if !stack_trace.is_empty() => {
                error!("[qiankun-js]: {}\n{}", message.as_ref(), stack_trace);
            }
            _ => error!("[qiankun-js]: {}", message.as_ref()),
        }
    }
}

/// Default `HostLogger` routing through [`Console`].
pub struct ConsoleLogger;

impl HostLogger for ConsoleLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace | LogLevel::Debug | LogLevel::Info => Console::info(message),
            LogLevel::Warn => Console::warn(message),
            LogLevel::Error => Console::error(message),
        }
    }
}
