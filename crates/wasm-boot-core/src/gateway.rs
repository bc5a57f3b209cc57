//! Guarded access to module exports.
//!
//! [`ExportGateway`] owns the instantiated module (store, instance, export
//! mapping, linear memory) and delegates calls to the underlying exported
//! functions. The mapping is built once, at the ready transition, and
//! never changes afterwards: export names are fixed at instantiation time.
//!
//! The gateway itself only knows about names and delegation; the lifecycle
//! gate (ready/exited/load-failed) is applied by the runtime before a call
//! reaches the gateway.

use std::collections::HashMap;

use tracing::debug;
use wasmtime::{Extern, Func, Instance, Memory, Store, Trap, Val};

use wasm_boot_common::BootError;

use crate::runtime::HostState;

/// Dictionary-based gateway over a module's exports.
///
/// Owns the instance's [`Store`] exclusively; the linear memory, if the
/// module exports one, is never shared with another instance.
pub struct ExportGateway {
    store: Store<HostState>,
    funcs: HashMap<String, Func>,
    memory: Option<Memory>,
}

impl ExportGateway {
    /// Build the gateway from a freshly instantiated module.
    ///
    /// Collects every exported function into the dictionary and picks up
    /// the exported linear memory if present.
    pub(crate) fn new(mut store: Store<HostState>, instance: &Instance) -> Self {
        let exports: Vec<(String, Extern)> = instance
            .exports(&mut store)
            .map(|e| (e.name().to_string(), e.into_extern()))
            .collect();

        let mut funcs = HashMap::new();
        let mut memory = None;
        for (name, ext) in exports {
            match ext {
                Extern::Func(func) => {
                    funcs.insert(name, func);
                }
                Extern::Memory(mem) => {
                    memory.get_or_insert(mem);
                }
                _ => {}
            }
        }

        debug!(export_count = funcs.len(), "Export gateway built");
        Self {
            store,
            funcs,
            memory,
        }
    }

    /// Names of all exported functions, unordered.
    pub fn export_names(&self) -> Vec<String> {
        self.funcs.keys().cloned().collect()
    }

    /// Whether an exported function with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Delegate a call to the named export with unchanged arguments.
    ///
    /// # Errors
    ///
    /// - [`BootError::UnknownExport`] if the name is not in the mapping
    /// - [`BootError::Trap`] if the guest function traps; the trap code
    ///   and message are carried through
    pub(crate) fn invoke(&mut self, name: &str, params: &[Val]) -> Result<Vec<Val>, BootError> {
        let func = self
            .funcs
            .get(name)
            .copied()
            .ok_or_else(|| BootError::unknown_export(name))?;

        let result_arity = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_arity];

        func.call(&mut self.store, params, &mut results)
            .map_err(|e| BootError::trap(name, trap_message(&e)))?;

        Ok(results)
    }

    /// Current size of the exported linear memory in bytes, if any.
    pub fn memory_size(&self) -> Option<usize> {
        self.memory.map(|m| m.data_size(&self.store))
    }
}

impl std::fmt::Debug for ExportGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportGateway")
            .field("export_count", &self.funcs.len())
            .field("has_memory", &self.memory.is_some())
            .finish_non_exhaustive()
    }
}

/// Human-readable trap description, including the trap code when known.
fn trap_message(error: &wasmtime::Error) -> String {
    match error.downcast_ref::<Trap>() {
        Some(trap) => format!("{trap:?}: {error}"),
        None => error.to_string(),
    }
}
