//! Per-app lifecycle states (spec.md §3 "App instance" / §4.7 state
//! machine diagram), plus the legal-transition check the controller
//! consults before driving an app through its next phase.

/// One of the eleven states an [`crate::instance::AppInstance`] can be in.
/// `SkipBecauseBroken` is sticky: the controller never re-attempts a broken
/// app without an explicit reload (spec.md §4.7).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AppStatus {
    NotLoaded,
    LoadingSourceCode,
    NotBootstrapped,
    Bootstrapping,
    NotMounted,
    Mounting,
    Mounted,
    Updating,
    Unmounting,
    Unloading,
    SkipBecauseBroken,
}

impl AppStatus {
    /// Whether an app in this status is considered "active" for the
    /// purposes of singleton gating and the router's active-set diff
    /// (spec.md §3 invariant "at most one instance per name is MOUNTED").
    #[must_use]
    pub const fn is_mounted(self) -> bool {
        matches!(self, Self::Mounted)
    }

    /// `sandbox.active` iff `status ∈ {MOUNTING, MOUNTED, UPDATING}`
    /// (spec.md §3 invariant).
    #[must_use]
    pub const fn sandbox_should_be_active(self) -> bool {
        matches!(self, Self::Mounting | Self::Mounted | Self::Updating)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotLoaded => "NOT_LOADED",
            Self::LoadingSourceCode => "LOADING_SOURCE_CODE",
            Self::NotBootstrapped => "NOT_BOOTSTRAPPED",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::NotMounted => "NOT_MOUNTED",
            Self::Mounting => "MOUNTING",
            Self::Mounted => "MOUNTED",
            Self::Updating => "UPDATING",
            Self::Unmounting => "UNMOUNTING",
            Self::Unloading => "UNLOADING",
            Self::SkipBecauseBroken => "SKIP_BECAUSE_BROKEN",
        }
    }
}

impl core::fmt::Display for AppStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
