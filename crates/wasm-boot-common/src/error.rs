//! Error types for the bootstrap runtime.
//!
//! This module defines the failure surface of a module bootstrap using
//! `thiserror`. The taxonomy distinguishes:
//! - *transport* failures ([`BootError::Fetch`])
//! - *instantiation* failures, split by path: streaming failures are
//!   recoverable via fallback, buffered failures are fatal
//! - *gating* failures (a call made outside the `Ready` state)
//! - *lookup* failures (unknown export name)

use thiserror::Error;

/// Errors reported by the bootstrap runtime and the export gateway.
///
/// Callers can rely on the variant to decide what to do next:
/// [`NotReady`](BootError::NotReady) means "wait for readiness and retry",
/// while [`LoadFailed`](BootError::LoadFailed) and
/// [`Exited`](BootError::Exited) are terminal for the instance.
#[derive(Error, Debug)]
pub enum BootError {
    /// The module binary could not be fetched from its source.
    ///
    /// This covers unreachable sources and transport-level problems such
    /// as a wrong content classification on an HTTP response. It is
    /// structurally distinct from decode failures so the caller can decide
    /// whether falling back to the buffered path makes sense.
    #[error("Fetch failed for {source_desc}: {reason}")]
    Fetch {
        /// Human-readable description of the binary source.
        source_desc: String,
        /// Description of the transport failure.
        reason: String,
    },

    /// The streaming instantiation attempt failed.
    ///
    /// This is never fatal on its own: the bootstrap logs it and falls
    /// back to the buffered path.
    #[error("Streaming instantiation failed: {reason}")]
    StreamingInstantiate {
        /// Description of the streaming failure.
        reason: String,
    },

    /// The buffered instantiation attempt failed.
    ///
    /// This is fatal: the runtime enters the load-failed state and the
    /// readiness callback never fires.
    #[error("Buffered instantiation failed: {reason}")]
    BufferedInstantiate {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// An export was invoked before the runtime reached `Ready`.
    #[error("Module runtime is not ready yet")]
    NotReady,

    /// An export was invoked after the runtime exited.
    #[error("Module runtime has exited")]
    Exited,

    /// An export was invoked after instantiation failed permanently.
    ///
    /// Distinct from [`NotReady`](BootError::NotReady): this instance
    /// will never become ready.
    #[error("Module load failed: {reason}")]
    LoadFailed {
        /// Description of the original load failure.
        reason: String,
    },

    /// The requested export name does not exist in the export mapping.
    #[error("Unknown export: {name}")]
    UnknownExport {
        /// The export name that was looked up.
        name: String,
    },

    /// `boot` was called more than once on the same instance.
    #[error("Bootstrap already started")]
    AlreadyStarted,

    /// A delegated export call trapped inside the guest.
    #[error("Export '{name}' trapped: {message}")]
    Trap {
        /// The export that was being called.
        name: String,
        /// Description of the trap.
        message: String,
    },
}

impl BootError {
    /// Create a new `Fetch` error.
    pub fn fetch(source_desc: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            source_desc: source_desc.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `StreamingInstantiate` error.
    pub fn streaming(reason: impl Into<String>) -> Self {
        Self::StreamingInstantiate {
            reason: reason.into(),
        }
    }

    /// Create a new `BufferedInstantiate` error.
    pub fn buffered(reason: impl Into<String>) -> Self {
        Self::BufferedInstantiate {
            reason: reason.into(),
        }
    }

    /// Create a new `LoadFailed` error.
    pub fn load_failed(reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `UnknownExport` error.
    pub fn unknown_export(name: impl Into<String>) -> Self {
        Self::UnknownExport { name: name.into() }
    }

    /// Create a new `Trap` error.
    pub fn trap(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Trap {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is a gating failure (call made while
    /// the runtime was not in the `Ready` state).
    pub fn is_gating(&self) -> bool {
        matches!(
            self,
            Self::NotReady | Self::Exited | Self::LoadFailed { .. }
        )
    }

    /// Returns `true` if this error means the instance will never become
    /// ready.
    pub fn is_terminal_load_failure(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::BufferedInstantiate { .. } | Self::LoadFailed { .. }
        )
    }

    /// Returns `true` if the bootstrap may recover from this error by
    /// falling back to the buffered path.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StreamingInstantiate { .. })
    }
}
