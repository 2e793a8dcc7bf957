//! Engine-agnostic JavaScript value and error types used at the host/script
//! boundary (grounded on `crates/js/src/bindings/values.rs`).

use core::fmt::{Display, Formatter, Result as FmtResult};

/// An engine-agnostic representation of JavaScript values passed across the
/// host-binding boundary. Intentionally small: scripts that need richer
/// shapes (objects, arrays) serialize to/from `serde_json::Value` at the
/// few sites that need it (e.g. the global-state bus).
#[derive(Clone, Debug, PartialEq)]
pub enum JSValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

/// Error type returned by host callbacks invoked from sandboxed script.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JSError {
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("InternalError: {0}")]
    InternalError(String),
}

/// Log severity levels understood by the host logger.
#[derive(Copy, Clone, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Display for JSValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value}"),
        }
    }
}

/// Convert a vector of `JSValue` into a space-separated string, the shape
/// `console.log`-style host functions need for their message argument.
#[must_use]
pub fn stringify_arguments(arguments: &[JSValue]) -> String {
    arguments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
