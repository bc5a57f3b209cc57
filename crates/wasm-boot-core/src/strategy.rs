//! Instantiation strategy selection and execution.
//!
//! Two instantiation paths exist:
//!
//! - **Streaming**: drive the provider's byte stream to completion,
//!   validating the binary prefix as soon as the first bytes arrive, then
//!   compile and instantiate. Any failure on this path is recoverable.
//! - **Buffered**: fetch the complete binary, then compile and
//!   instantiate. Failure here is fatal for the instance.
//!
//! [`select_path`] encodes the selection rule; the bootstrap falls back
//! from a failed streaming attempt to a fresh buffered attempt. The two
//! attempts never share state: each gets its own [`Store`], so a partial
//! streaming attempt cannot corrupt the fallback.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use wasmtime::{Engine, Instance, Linker, Module, Store};

use wasm_boot_common::{BootConfig, BootError};

use crate::provider::BinaryProvider;
use crate::runtime::HostState;

/// Which instantiation path to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationPath {
    /// Instantiate concurrently with byte transfer.
    Streaming,
    /// Buffer the full binary first, then instantiate.
    Buffered,
}

/// Choose the instantiation path from the capability flags.
///
/// The buffered path is taken when the host supplied a pre-fetched binary,
/// when streaming is disabled by configuration, or when the source cannot
/// deliver a live stream. Only when all three allow it is streaming
/// attempted.
pub fn select_path(
    streaming_enabled: bool,
    provider_streamable: bool,
    has_override: bool,
) -> InstantiationPath {
    if has_override || !streaming_enabled || !provider_streamable {
        InstantiationPath::Buffered
    } else {
        InstantiationPath::Streaming
    }
}

/// A successful instantiation: the store and the instance living in it.
pub(crate) struct InstantiatedParts {
    pub store: Store<HostState>,
    pub instance: Instance,
}

/// Execute the selected path, falling back from streaming to buffered.
///
/// # Errors
///
/// Returns [`BootError::Fetch`] or [`BootError::BufferedInstantiate`] when
/// the buffered path (direct or as fallback) fails. Streaming failures are
/// logged and recovered, never returned.
#[instrument(skip_all, fields(source = %provider.describe()))]
pub(crate) async fn instantiate_with_fallback(
    engine: &Engine,
    linker: &Linker<HostState>,
    provider: &dyn BinaryProvider,
    config: &BootConfig,
) -> Result<InstantiatedParts, BootError> {
    let path = select_path(
        config.streaming_instantiation,
        provider.supports_streaming(),
        provider.preloaded().is_some(),
    );
    debug!(?path, "Instantiation path selected");

    if path == InstantiationPath::Streaming {
        match instantiate_streaming(engine, linker, provider).await {
            Ok(parts) => return Ok(parts),
            Err(e) => {
                // Recoverable: discard the partial attempt and retry with
                // a full buffer and a fresh store.
                warn!(error = %e, "Streaming instantiation failed, falling back to buffered path");
            }
        }
    }

    instantiate_buffered(engine, linker, provider).await
}

/// Streaming path: consume the live byte stream, then compile and
/// instantiate. Every failure maps to `StreamingInstantiate`.
async fn instantiate_streaming(
    engine: &Engine,
    linker: &Linker<HostState>,
    provider: &dyn BinaryProvider,
) -> Result<InstantiatedParts, BootError> {
    let start = Instant::now();
    let mut stream = provider
        .open_stream()
        .await
        .map_err(|e| BootError::streaming(e.to_string()))?;

    let mut bytes = Vec::new();
    let mut prefix_checked = false;
    while let Some(chunk) = stream
        .next_chunk()
        .await
        .map_err(|e| BootError::streaming(e.to_string()))?
    {
        bytes.extend_from_slice(&chunk);

        // Fail fast on mis-typed content instead of buffering it all.
        if !prefix_checked && bytes.len() >= 4 {
            prefix_checked = true;
            if !plausible_module_prefix(&bytes) {
                return Err(BootError::streaming(
                    "byte stream does not start with a module header",
                ));
            }
        }
    }

    if bytes.is_empty() {
        return Err(BootError::streaming("byte stream was empty"));
    }

    let parts = compile_and_link(engine, linker, provider, &bytes)
        .map_err(BootError::streaming)?;

    info!(
        bytes_len = bytes.len(),
        duration_ms = start.elapsed().as_millis(),
        "Streaming instantiation complete"
    );
    Ok(parts)
}

/// Buffered path: fetch the complete binary, then compile and
/// instantiate. Transport failures stay `Fetch`; decode and link failures
/// become `BufferedInstantiate`. Both are fatal for the instance.
async fn instantiate_buffered(
    engine: &Engine,
    linker: &Linker<HostState>,
    provider: &dyn BinaryProvider,
) -> Result<InstantiatedParts, BootError> {
    let start = Instant::now();
    let bytes = match provider.preloaded() {
        Some(bytes) => bytes.to_vec(),
        None => provider.fetch_buffered().await?,
    };

    let parts = compile_and_link(engine, linker, provider, &bytes)
        .map_err(BootError::buffered)?;

    info!(
        bytes_len = bytes.len(),
        duration_ms = start.elapsed().as_millis(),
        "Buffered instantiation complete"
    );
    Ok(parts)
}

/// Compile the binary and instantiate it against the import object, in a
/// fresh store. Returns the failure reason on error; the caller decides
/// which error class it belongs to.
fn compile_and_link(
    engine: &Engine,
    linker: &Linker<HostState>,
    provider: &dyn BinaryProvider,
    bytes: &[u8],
) -> Result<InstantiatedParts, String> {
    let module = Module::new(engine, bytes).map_err(|e| format!("compile: {e}"))?;

    let mut store = Store::new(engine, HostState::new(provider.describe()));
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|e| format!("link: {e}"))?;

    Ok(InstantiatedParts { store, instance })
}

/// Whether the first bytes could plausibly be a module.
///
/// Accepts the wasm magic number, or leading text that could be a WAT
/// fixture (accepted by the engine when the `wat` feature is enabled).
fn plausible_module_prefix(bytes: &[u8]) -> bool {
    if bytes.starts_with(b"\0asm") {
        return true;
    }
    matches!(
        bytes.iter().find(|b| !b.is_ascii_whitespace()),
        Some(b'(' | b';')
    )
}
