//! Runtime lifecycle state machine.
//!
//! This module provides:
//! - [`LifecycleState`]: the observable state of a runtime instance
//! - [`StateCell`]: the single mutation path for that state
//!
//! Transitions are strictly forward: `Uninitialized → Initializing →
//! Ready → Exited`, with `LoadFailed` as a distinct terminal outcome of a
//! failed bootstrap. `Ready` is entered at most once, and nothing ever
//! re-enters `Initializing` or `Uninitialized`.

use parking_lot::Mutex;

use wasm_boot_common::BootError;

/// Observable lifecycle state of a runtime instance.
///
/// `LoadFailed` is deliberately distinct from `Exited`: a load failure
/// means the instance never became usable, while `Exited` is a clean
/// shutdown of a previously ready instance. Callers use the difference to
/// tell "never will be ready" from "was ready, now done".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// No bootstrap has started yet.
    Uninitialized,
    /// Binary loading and instantiation are in flight.
    Initializing,
    /// Exports are live and safe to call.
    Ready,
    /// The runtime has shut down cleanly.
    Exited,
    /// Instantiation failed permanently; the instance will never be ready.
    LoadFailed {
        /// Description of the original load failure.
        reason: String,
    },
}

impl LifecycleState {
    /// Returns `true` if exports are callable in this state.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::LoadFailed { .. })
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Exited => write!(f, "exited"),
            Self::LoadFailed { reason } => write!(f, "load failed: {reason}"),
        }
    }
}

/// Owner of a runtime instance's [`LifecycleState`].
///
/// The transition methods are the only way to mutate the state; every
/// other component queries it through [`state`](StateCell::state) or
/// [`check_ready`](StateCell::check_ready). Reads are immediate, never
/// cached.
#[derive(Debug)]
pub struct StateCell {
    inner: Mutex<LifecycleState>,
}

impl StateCell {
    /// Create a cell in the `Uninitialized` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LifecycleState::Uninitialized),
        }
    }

    /// Get the current state.
    ///
    /// Side-effect free and safe to call from any thread.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().clone()
    }

    /// Enter `Initializing` from `Uninitialized`.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::AlreadyStarted`] if a bootstrap has already
    /// begun on this instance.
    pub fn begin_init(&self) -> Result<(), BootError> {
        let mut state = self.inner.lock();
        if *state != LifecycleState::Uninitialized {
            return Err(BootError::AlreadyStarted);
        }
        *state = LifecycleState::Initializing;
        Ok(())
    }

    /// Enter `Ready` from `Initializing`.
    ///
    /// Returns `true` if the transition happened. `Ready` can be entered
    /// at most once; any other current state leaves the cell unchanged.
    pub fn mark_ready(&self) -> bool {
        let mut state = self.inner.lock();
        if *state != LifecycleState::Initializing {
            return false;
        }
        *state = LifecycleState::Ready;
        true
    }

    /// Enter `Exited` from `Ready`.
    ///
    /// Returns `true` if the transition happened.
    pub fn mark_exited(&self) -> bool {
        let mut state = self.inner.lock();
        if *state != LifecycleState::Ready {
            return false;
        }
        *state = LifecycleState::Exited;
        true
    }

    /// Enter the terminal `LoadFailed` state.
    ///
    /// A first failure wins: if the cell is already terminal the call is
    /// a no-op, so the original failure reason is preserved.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let mut state = self.inner.lock();
        if state.is_terminal() {
            return;
        }
        *state = LifecycleState::LoadFailed {
            reason: reason.into(),
        };
    }

    /// Gate check for export calls.
    ///
    /// # Errors
    ///
    /// - [`BootError::NotReady`] while uninitialized or initializing
    /// - [`BootError::Exited`] after a clean shutdown
    /// - [`BootError::LoadFailed`] after a failed bootstrap
    pub fn check_ready(&self) -> Result<(), BootError> {
        match &*self.inner.lock() {
            LifecycleState::Ready => Ok(()),
            LifecycleState::Uninitialized | LifecycleState::Initializing => {
                Err(BootError::NotReady)
            }
            LifecycleState::Exited => Err(BootError::Exited),
            LifecycleState::LoadFailed { reason } => Err(BootError::load_failed(reason.clone())),
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
