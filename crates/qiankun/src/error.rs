//! Re-exports [`qiankun_loader::QiankunError`] (spec.md §7's error-kind
//! table is raised almost entirely by the streaming loader) and adds the
//! two variants that only make sense at the controller boundary:
//! `update()` on an app with no exported `update`, and double-`start()`.

pub use qiankun_loader::QiankunError as LoaderError;

/// One error kind per row of spec.md §7, unified across the loader and the
/// lifecycle controller so callers match on a single type regardless of
/// which layer raised it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QiankunError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("app `{app}` has no `update` export")]
    UpdateNotSupported { app: String },

    #[error("app `{name}` is already registered with a different entry")]
    ConflictingRegistration { name: String },

    #[error("no app named `{name}` is registered")]
    UnknownApp { name: String },

    #[error("app `{app}` is SKIP_BECAUSE_BROKEN; reload explicitly to retry")]
    AppBroken { app: String },
}

impl QiankunError {
    /// Stable kind tag for the error-bus dispatch payload (spec.md §4.10),
    /// independent of the human-readable `Display` message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Loader(LoaderError::EntryFetchFailed { .. }) => "EntryFetchFailed",
            Self::Loader(LoaderError::AssetFetchFailed { .. }) => "AssetFetchFailed",
            Self::Loader(LoaderError::EntryMissingLifecycle { .. }) => "EntryMissingLifecycle",
            Self::Loader(LoaderError::MultipleEntryScripts { .. }) => "MultipleEntryScripts",
            Self::Loader(LoaderError::LifecycleThrew { .. }) => "LifecycleThrew",
            Self::Loader(LoaderError::SandboxRewindPartial { .. }) => "SandboxRewindPartial",
            Self::Loader(LoaderError::RuntimeIncompatible { .. }) => "RuntimeIncompatible",
            Self::Loader(LoaderError::Reentrancy) => "Reentrancy",
            Self::UpdateNotSupported { .. } => "UpdateNotSupported",
            Self::ConflictingRegistration { .. } => "ConflictingRegistration",
            Self::UnknownApp { .. } => "UnknownApp",
            Self::AppBroken { .. } => "AppBroken",
        }
    }
}
