//! Single-fire readiness notification.
//!
//! [`ReadySignal`] is a one-shot callback slot: the host registers a
//! callback before or after the ready transition, and the signal fires it
//! exactly once. Registration after firing runs the callback immediately
//! and synchronously on the registering call — that is the documented
//! contract, verified by test.

use parking_lot::Mutex;

/// Callback invoked when the runtime becomes ready.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot readiness callback slot.
///
/// The slot holds at most one callback. Re-registering before the signal
/// fires overwrites the previous callback without error; only the most
/// recently registered callback runs. Internal bookkeeping guarantees
/// exactly-once firing even if the firing path is reentered.
pub struct ReadySignal {
    inner: Mutex<Slot>,
}

struct Slot {
    fired: bool,
    callback: Option<ReadyCallback>,
}

impl ReadySignal {
    /// Create an unfired signal with an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slot {
                fired: false,
                callback: None,
            }),
        }
    }

    /// Register a callback to run at the ready transition.
    ///
    /// If the signal has already fired, the callback runs immediately,
    /// synchronously, on this call. Otherwise it replaces whatever was in
    /// the slot.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut slot = self.inner.lock();
            if !slot.fired {
                slot.callback = Some(Box::new(callback));
                return;
            }
        }

        // Already fired: run outside the lock so the callback may
        // re-register.
        callback();
    }

    /// Clear the registered callback without firing it.
    ///
    /// Has no effect on whether the signal counts as fired.
    pub fn clear(&self) {
        self.inner.lock().callback = None;
    }

    /// Fire the signal, running the registered callback if any.
    ///
    /// Only the first call fires; later calls are no-ops, even if a new
    /// callback was registered in between (it ran at registration time).
    pub fn fire(&self) {
        let callback = {
            let mut slot = self.inner.lock();
            if slot.fired {
                return;
            }
            slot.fired = true;
            slot.callback.take()
        };

        // Invoke outside the lock: the callback may call back into the
        // runtime, including re-registration on this same signal.
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Whether the signal has fired.
    pub fn has_fired(&self) -> bool {
        self.inner.lock().fired
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.inner.lock();
        f.debug_struct("ReadySignal")
            .field("fired", &slot.fired)
            .field("registered", &slot.callback.is_some())
            .finish()
    }
}
