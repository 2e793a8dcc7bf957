//! The runtime's error kinds (spec.md §7), one variant per table row. Lives
//! in this crate because the streaming loader (C3) is the first place most
//! of them are raised; the lifecycle controller re-exports the same type so
//! callers match on a single `QiankunError` regardless of which layer
//! produced it.

use url::Url;

/// One error kind per row of the error-handling table. Recoverable kinds
/// (`SandboxRewindPartial`) are logged and absorbed by their raiser rather
/// than ever reaching a caller; everything else rejects a phase promise and
/// is dispatched on the global error bus (C10).
#[derive(Debug, Clone, thiserror::Error)]
pub enum QiankunError {
    #[error("entry fetch failed for {url}: {message}")]
    EntryFetchFailed { url: Url, message: String },

    #[error("asset fetch failed for {url}: {message}")]
    AssetFetchFailed { url: Url, message: String },

    #[error("app `{app}` entry resolved a library missing bootstrap/mount/unmount")]
    EntryMissingLifecycle { app: String },

    #[error("app `{app}` entry HTML declared more than one `entry` script")]
    MultipleEntryScripts { app: String },

    #[error("app `{app}` lifecycle `{phase}` threw: {message}")]
    LifecycleThrew { app: String, phase: String, message: String },

    #[error("app `{app}` sandbox rewind could not fully reverse its side effects")]
    SandboxRewindPartial { app: String },

    #[error("runtime incompatible: missing {missing}")]
    RuntimeIncompatible { missing: String },

    #[error("start() called more than once")]
    Reentrancy,
}
