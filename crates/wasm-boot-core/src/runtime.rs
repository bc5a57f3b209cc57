//! Module bootstrap orchestration.
//!
//! [`ModuleRuntime`] ties the pieces together: it owns the lifecycle
//! state, the readiness signal, and (once instantiation succeeds) the
//! export gateway. The handle is cheap to clone and share; while a
//! `boot` is in flight on one clone, other clones may freely query the
//! state, register readiness callbacks, or attempt export calls (which
//! are rejected with the appropriate gating error).
//!
//! # Bootstrap sequence
//!
//! ```text
//! Uninitialized ──begin_init──▶ Initializing
//!        fetch + instantiate (streaming, fallback to buffered)
//!        pre-main setup (`_initialize`, if exported)
//! Initializing ──mark_ready──▶ Ready ──▶ readiness callback fires
//!        auto entry point (if configured)
//! Ready ──mark_exited──▶ Exited   (unless stay_alive_after_exit)
//! ```
//!
//! A failed instantiation lands in `LoadFailed` instead; the readiness
//! callback never fires and every later export call reports the failure.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};
use wasmtime::{Engine, Linker, Val};

use wasm_boot_common::{BootConfig, BootError};

use crate::gateway::ExportGateway;
use crate::lifecycle::{LifecycleState, StateCell};
use crate::notifier::ReadySignal;
use crate::provider::BinaryProvider;
use crate::strategy;

/// Host-side data attached to the instance's store.
///
/// Import functions registered through [`ImportObject`] can reach this
/// through [`wasmtime::Caller`].
pub struct HostState {
    /// Description of the binary source, for logs.
    pub label: String,
}

impl HostState {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Host-provided imports for the module.
///
/// Opaque to the bootstrap: the wrapped closure populates the
/// [`Linker`] and is passed through unchanged to the instantiation call.
/// The closure may run more than once if the streaming attempt falls back
/// to the buffered path.
pub struct ImportObject {
    populate: Box<dyn Fn(&mut Linker<HostState>) -> wasmtime::Result<()> + Send + Sync>,
}

impl ImportObject {
    /// An import object providing nothing.
    pub fn empty() -> Self {
        Self::new(|_| Ok(()))
    }

    /// Wrap a closure that registers imports on the linker.
    pub fn new(
        populate: impl Fn(&mut Linker<HostState>) -> wasmtime::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            populate: Box::new(populate),
        }
    }

    fn populate(&self, linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
        (self.populate)(linker)
    }
}

impl Default for ImportObject {
    fn default() -> Self {
        Self::empty()
    }
}

struct RuntimeShared {
    config: BootConfig,
    engine: Engine,
    state: StateCell,
    ready: ReadySignal,
    gateway: Mutex<Option<ExportGateway>>,
}

/// Handle to one module bootstrap instance.
///
/// Clones share the same instance; independent instances are created with
/// [`ModuleRuntime::new`] and never share state, so any number of them can
/// bootstrap concurrently.
#[derive(Clone)]
pub struct ModuleRuntime {
    shared: Arc<RuntimeShared>,
}

impl ModuleRuntime {
    /// Create a new, uninitialized runtime instance.
    pub fn new(config: BootConfig) -> Self {
        Self {
            shared: Arc::new(RuntimeShared {
                config,
                engine: Engine::default(),
                state: StateCell::new(),
                ready: ReadySignal::new(),
                gateway: Mutex::new(None),
            }),
        }
    }

    /// Current lifecycle state. Side-effect free, immediate, never cached.
    pub fn state(&self) -> LifecycleState {
        self.shared.state.state()
    }

    /// Register the readiness callback.
    ///
    /// Fires exactly once, after the ready transition and before any
    /// entry point the runtime invokes on its own. If the runtime is
    /// already ready, the callback runs immediately and synchronously on
    /// this call. Registering again before readiness overwrites the slot;
    /// only the most recently registered callback fires.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        self.shared.ready.register(callback);
    }

    /// Clear a registered, not-yet-fired readiness callback.
    pub fn clear_on_ready(&self) {
        self.shared.ready.clear();
    }

    /// Fetch, instantiate, and bring the module to the ready state.
    ///
    /// Suspends on binary fetch and instantiation but never blocks other
    /// clones of this handle. On success the runtime is `Ready` (or
    /// already `Exited`, if a configured entry point ran and
    /// `stay_alive_after_exit` is off).
    ///
    /// # Errors
    ///
    /// - [`BootError::AlreadyStarted`] if called twice on one instance
    /// - [`BootError::Fetch`] / [`BootError::BufferedInstantiate`] when
    ///   the buffered path fails; the instance is then `LoadFailed`
    /// - [`BootError::LoadFailed`] when pre-main setup traps
    /// - [`BootError::Trap`] when the configured entry point traps; the
    ///   runtime still reached `Ready` and the exit policy still applies
    #[instrument(skip_all, fields(source = %provider.describe()))]
    pub async fn boot(
        &self,
        provider: &dyn BinaryProvider,
        imports: ImportObject,
    ) -> Result<(), BootError> {
        self.shared.state.begin_init()?;
        info!("Bootstrap started");

        let mut linker = Linker::new(&self.shared.engine);
        if let Err(e) = imports.populate(&mut linker) {
            let err = BootError::buffered(format!("import object: {e}"));
            self.shared.state.mark_failed(err.to_string());
            return Err(err);
        }

        let parts = match strategy::instantiate_with_fallback(
            &self.shared.engine,
            &linker,
            provider,
            &self.shared.config,
        )
        .await
        {
            Ok(parts) => parts,
            Err(e) => {
                self.shared.state.mark_failed(e.to_string());
                return Err(e);
            }
        };

        let mut gateway = ExportGateway::new(parts.store, &parts.instance);

        // Pre-main setup, reactor convention: a trap here means the
        // instance never becomes usable.
        if gateway.contains("_initialize") {
            debug!("Running pre-main setup (_initialize)");
            if let Err(e) = gateway.invoke("_initialize", &[]) {
                let reason = format!("pre-main setup: {e}");
                self.shared.state.mark_failed(reason.clone());
                return Err(BootError::load_failed(reason));
            }
        }

        // Install the gateway before the state flips so a caller that
        // observes `Ready` always finds the export mapping in place.
        *self.shared.gateway.lock() = Some(gateway);
        self.shared.state.mark_ready();
        info!("Module runtime ready");

        self.shared.ready.fire();

        if let Some(entry) = self.shared.config.entry_point.clone() {
            return self.run_entry_point(&entry);
        }

        Ok(())
    }

    /// Invoke the configured entry point and apply the exit policy.
    fn run_entry_point(&self, entry: &str) -> Result<(), BootError> {
        debug!(entry, "Invoking entry point");
        let call_result = self.invoke(entry, &[]);

        if self.shared.config.stay_alive_after_exit {
            debug!("Entry point returned; staying alive");
        } else if self.shared.state.mark_exited() {
            info!("Module runtime exited after entry point");
        }

        match call_result {
            Ok(results) => {
                info!(entry, ?results, "Entry point completed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Invoke an exported function through the gate.
    ///
    /// The lifecycle state is consulted first, at call time: outside
    /// `Ready` this fails with [`BootError::NotReady`],
    /// [`BootError::Exited`], or [`BootError::LoadFailed`] without
    /// touching the export mapping. Calls are never queued or retried;
    /// waiting for readiness is the caller's job via
    /// [`on_ready`](Self::on_ready).
    pub fn invoke(&self, name: &str, params: &[Val]) -> Result<Vec<Val>, BootError> {
        self.shared.state.check_ready()?;

        let mut guard = self.shared.gateway.lock();
        let gateway = guard.as_mut().ok_or(BootError::NotReady)?;
        gateway.invoke(name, params)
    }

    /// Look up an export by name, without consulting the lifecycle state.
    ///
    /// The export mapping is empty until the ready transition builds it,
    /// so before `Ready` every name reports
    /// [`BootError::UnknownExport`]. The returned handle is guarded the
    /// same way as [`invoke`](Self::invoke).
    pub fn export(&self, name: &str) -> Result<ExportedEntryPoint, BootError> {
        let guard = self.shared.gateway.lock();
        let known = guard.as_ref().is_some_and(|g| g.contains(name));
        if !known {
            return Err(BootError::unknown_export(name));
        }

        Ok(ExportedEntryPoint {
            runtime: self.clone(),
            name: name.to_string(),
        })
    }

    /// Names of all exported functions; empty before the ready transition.
    pub fn export_names(&self) -> Vec<String> {
        self.shared
            .gateway
            .lock()
            .as_ref()
            .map(ExportGateway::export_names)
            .unwrap_or_default()
    }

    /// Size in bytes of the exported linear memory, gated like a call.
    ///
    /// Returns `Ok(None)` if the module exports no memory.
    ///
    /// # Errors
    ///
    /// The same gating errors as [`invoke`](Self::invoke).
    pub fn memory_size(&self) -> Result<Option<usize>, BootError> {
        self.shared.state.check_ready()?;

        let guard = self.shared.gateway.lock();
        let gateway = guard.as_ref().ok_or(BootError::NotReady)?;
        Ok(gateway.memory_size())
    }

    /// Signal termination: transition `Ready → Exited`.
    ///
    /// Returns `true` if the transition happened; calls in any other
    /// state are no-ops.
    pub fn exit(&self) -> bool {
        let exited = self.shared.state.mark_exited();
        if exited {
            info!("Module runtime exited");
        }
        exited
    }
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("state", &self.shared.state.state())
            .finish_non_exhaustive()
    }
}

/// Guarded handle to one exported function.
///
/// Obtained from [`ModuleRuntime::export`] once the export mapping
/// exists; the underlying function identity is fixed for the life of the
/// instance. Each call re-checks the lifecycle state, so a handle kept
/// across an exit fails with [`BootError::Exited`] rather than reaching
/// the stale function.
#[derive(Debug, Clone)]
pub struct ExportedEntryPoint {
    runtime: ModuleRuntime,
    name: String,
}

impl ExportedEntryPoint {
    /// The export name this handle is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the export through the gate with unchanged arguments.
    ///
    /// # Errors
    ///
    /// The same errors as [`ModuleRuntime::invoke`].
    pub fn call(&self, params: &[Val]) -> Result<Vec<Val>, BootError> {
        self.runtime.invoke(&self.name, params)
    }
}
