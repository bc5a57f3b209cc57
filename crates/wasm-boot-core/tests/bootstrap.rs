//! Integration tests for the bootstrap runtime.
//!
//! These tests verify the complete bootstrap pipeline:
//! - streaming instantiation with buffered fallback
//! - lifecycle gating of export calls in every state
//! - exactly-once readiness notification
//! - exit policy around the auto-invoked entry point

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use wasmtime::Val;

use wasm_boot_common::{BootConfig, BootError};
use wasm_boot_core::{
    BinaryProvider, ByteStream, BytesProvider, ImportObject, LifecycleState, ModuleRuntime,
};

const MAIN_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "main") (result i32)
            (i32.const 7))
        (func (export "boom")
            unreachable)
    )
"#;

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let c = Arc::new(AtomicUsize::new(0));
    (Arc::clone(&c), c)
}

// ============================================================================
// Test providers
// ============================================================================

/// Streams the binary in fixed chunks, with an optional delay per chunk.
struct ChunkedProvider {
    bytes: Vec<u8>,
    chunk_size: usize,
    delay: Duration,
    stream_opens: Arc<AtomicUsize>,
}

impl ChunkedProvider {
    fn new(bytes: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        Self {
            bytes: bytes.into(),
            chunk_size,
            delay: Duration::ZERO,
            stream_opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl BinaryProvider for ChunkedProvider {
    fn describe(&self) -> String {
        "<chunked test source>".into()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChunkedStream {
            chunks: self
                .bytes
                .chunks(self.chunk_size)
                .map(<[u8]>::to_vec)
                .rev()
                .collect(),
            delay: self.delay,
        }))
    }

    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError> {
        Ok(self.bytes.clone())
    }
}

struct ChunkedStream {
    // Reversed so pop() yields chunks in order.
    chunks: Vec<Vec<u8>>,
    delay: Duration,
}

#[async_trait]
impl ByteStream for ChunkedStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BootError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.chunks.pop())
    }
}

/// Streaming transport is broken; the buffered fetch works.
struct BrokenStreamProvider {
    bytes: Vec<u8>,
}

#[async_trait]
impl BinaryProvider for BrokenStreamProvider {
    fn describe(&self) -> String {
        "<broken stream source>".into()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError> {
        Err(BootError::fetch(
            self.describe(),
            "unexpected content type 'text/html', expected 'application/wasm'",
        ))
    }

    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError> {
        Ok(self.bytes.clone())
    }
}

/// Both delivery modes fail.
struct UnreachableProvider;

#[async_trait]
impl BinaryProvider for UnreachableProvider {
    fn describe(&self) -> String {
        "<unreachable source>".into()
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn open_stream(&self) -> Result<Box<dyn ByteStream>, BootError> {
        Err(BootError::fetch(self.describe(), "connection refused"))
    }

    async fn fetch_buffered(&self) -> Result<Vec<u8>, BootError> {
        Err(BootError::fetch(self.describe(), "connection refused"))
    }
}

// ============================================================================
// Test: gating before readiness
// ============================================================================

#[tokio::test]
async fn test_invoke_before_boot_is_not_ready() {
    let runtime = ModuleRuntime::new(BootConfig::default());

    assert_eq!(runtime.state(), LifecycleState::Uninitialized);
    assert!(matches!(
        runtime.invoke("main", &[]),
        Err(BootError::NotReady)
    ));
}

#[tokio::test]
async fn test_invoke_while_initializing_is_not_ready() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider =
        ChunkedProvider::new(MAIN_WAT, 16).with_delay(Duration::from_millis(20));

    let boot_handle = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.boot(&provider, ImportObject::empty()).await })
    };

    // Give the bootstrap time to enter the fetch suspension point.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(runtime.state(), LifecycleState::Initializing);
    assert!(matches!(
        runtime.invoke("main", &[]),
        Err(BootError::NotReady)
    ));

    boot_handle.await.unwrap().unwrap();
    assert_eq!(runtime.state(), LifecycleState::Ready);

    let results = runtime.invoke("main", &[]).unwrap();
    assert_eq!(results[0].unwrap_i32(), 7);
}

// ============================================================================
// Test: readiness notification
// ============================================================================

#[tokio::test]
async fn test_on_ready_fires_once_at_ready() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let (count, read) = counter();

    runtime.on_ready(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(read.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_on_ready_after_ready_fires_immediately() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    let (count, read) = counter();
    runtime.on_ready({
        let count = Arc::clone(&count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });

    // Synchronous on the registering call, exactly once.
    assert_eq!(read.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_on_ready_reregistration_single_slot() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let (first, read_first) = counter();
    let (second, read_second) = counter();

    runtime.on_ready(move || {
        first.fetch_add(1, Ordering::SeqCst);
    });
    runtime.on_ready(move || {
        second.fetch_add(1, Ordering::SeqCst);
    });

    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(read_first.load(Ordering::SeqCst), 0);
    assert_eq!(read_second.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Test: fallback transparency
// ============================================================================

#[tokio::test]
async fn test_streaming_success_reaches_ready() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = ChunkedProvider::new(MAIN_WAT, 8);

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(provider.stream_opens.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.state(), LifecycleState::Ready);
    assert_eq!(runtime.invoke("main", &[]).unwrap()[0].unwrap_i32(), 7);
}

#[tokio::test]
async fn test_streaming_failure_falls_back_to_buffered() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BrokenStreamProvider {
        bytes: MAIN_WAT.into(),
    };

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(runtime.state(), LifecycleState::Ready);
    assert_eq!(runtime.invoke("main", &[]).unwrap()[0].unwrap_i32(), 7);
}

#[tokio::test]
async fn test_streaming_disabled_never_opens_stream() {
    let config = BootConfig {
        streaming_instantiation: false,
        ..Default::default()
    };
    let runtime = ModuleRuntime::new(config);
    let provider = ChunkedProvider::new(MAIN_WAT, 8);

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(provider.stream_opens.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.state(), LifecycleState::Ready);
}

#[tokio::test]
async fn test_preloaded_buffer_forces_buffered_path() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    // BytesProvider reports itself preloaded and has no stream.
    let provider = BytesProvider::new(MAIN_WAT);

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();
    assert_eq!(runtime.state(), LifecycleState::Ready);
}

// ============================================================================
// Test: terminal load failure
// ============================================================================

#[tokio::test]
async fn test_both_paths_fail_is_terminal() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let (count, read) = counter();
    runtime.on_ready(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    let result = runtime.boot(&UnreachableProvider, ImportObject::empty()).await;
    assert!(matches!(result, Err(BootError::Fetch { .. })));

    assert!(matches!(
        runtime.state(),
        LifecycleState::LoadFailed { .. }
    ));
    assert_eq!(read.load(Ordering::SeqCst), 0, "notifier must never fire");

    // Not "retry later": the instance will never become ready.
    assert!(matches!(
        runtime.invoke("main", &[]),
        Err(BootError::LoadFailed { .. })
    ));
}

#[tokio::test]
async fn test_malformed_binary_is_buffered_instantiate_error() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(b"\0asm but not really".to_vec());

    let result = runtime.boot(&provider, ImportObject::empty()).await;
    assert!(matches!(
        result,
        Err(BootError::BufferedInstantiate { .. })
    ));
    assert!(matches!(
        runtime.invoke("main", &[]),
        Err(BootError::LoadFailed { .. })
    ));
}

#[tokio::test]
async fn test_boot_twice_is_rejected() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(MAIN_WAT);

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    let again = runtime.boot(&provider, ImportObject::empty()).await;
    assert!(matches!(again, Err(BootError::AlreadyStarted)));
    // The first successful boot is unaffected.
    assert_eq!(runtime.state(), LifecycleState::Ready);
}

// ============================================================================
// Test: exit semantics
// ============================================================================

#[tokio::test]
async fn test_entry_point_then_exit() {
    let config = BootConfig {
        entry_point: Some("main".into()),
        ..Default::default()
    };
    let runtime = ModuleRuntime::new(config);
    let provider = BytesProvider::new(MAIN_WAT);

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(runtime.state(), LifecycleState::Exited);
    // Distinct from NotReady: the instance was ready once.
    assert!(matches!(
        runtime.invoke("main", &[]),
        Err(BootError::Exited)
    ));
}

#[tokio::test]
async fn test_stay_alive_after_entry_point() {
    let config = BootConfig {
        entry_point: Some("main".into()),
        stay_alive_after_exit: true,
        ..Default::default()
    };
    let runtime = ModuleRuntime::new(config);
    let provider = BytesProvider::new(MAIN_WAT);

    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(runtime.state(), LifecycleState::Ready);
    assert_eq!(runtime.invoke("main", &[]).unwrap()[0].unwrap_i32(), 7);
}

#[tokio::test]
async fn test_explicit_exit() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert!(runtime.exit());
    assert!(!runtime.exit());
    assert!(matches!(
        runtime.invoke("main", &[]),
        Err(BootError::Exited)
    ));
}

#[tokio::test]
async fn test_trapping_entry_point_still_exits() {
    let config = BootConfig {
        entry_point: Some("boom".into()),
        ..Default::default()
    };
    let runtime = ModuleRuntime::new(config);
    let provider = BytesProvider::new(MAIN_WAT);

    let result = runtime.boot(&provider, ImportObject::empty()).await;
    assert!(matches!(result, Err(BootError::Trap { .. })));
    assert_eq!(runtime.state(), LifecycleState::Exited);
}

// ============================================================================
// Test: export lookup
// ============================================================================

#[tokio::test]
async fn test_unknown_export_in_every_state() {
    let runtime = ModuleRuntime::new(BootConfig::default());

    // Uninitialized: the export mapping does not exist yet.
    assert!(matches!(
        runtime.export("doesNotExist"),
        Err(BootError::UnknownExport { .. })
    ));

    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    // Ready: gate passes, lookup fails.
    assert!(matches!(
        runtime.export("doesNotExist"),
        Err(BootError::UnknownExport { .. })
    ));
    assert!(matches!(
        runtime.invoke("doesNotExist", &[]),
        Err(BootError::UnknownExport { .. })
    ));

    runtime.exit();
    assert!(matches!(
        runtime.export("doesNotExist"),
        Err(BootError::UnknownExport { .. })
    ));
}

#[tokio::test]
async fn test_export_handle_is_gated() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    let main = runtime.export("main").unwrap();
    assert_eq!(main.name(), "main");
    assert_eq!(main.call(&[]).unwrap()[0].unwrap_i32(), 7);

    // A handle kept across exit re-checks the state at call time.
    runtime.exit();
    assert!(matches!(main.call(&[]), Err(BootError::Exited)));
}

#[tokio::test]
async fn test_export_names_empty_until_ready() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    assert!(runtime.export_names().is_empty());

    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    let mut names = runtime.export_names();
    names.sort();
    assert_eq!(names, vec!["boom", "main"]);
}

// ============================================================================
// Test: pre-main setup and imports
// ============================================================================

#[tokio::test]
async fn test_pre_main_setup_runs_before_ready() {
    const REACTOR_WAT: &str = r#"
        (module
            (global $g (mut i32) (i32.const 0))
            (func (export "_initialize")
                (global.set $g (i32.const 5)))
            (func (export "main") (result i32)
                (global.get $g))
        )
    "#;

    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(REACTOR_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    // The global was initialized before the first host call could run.
    assert_eq!(runtime.invoke("main", &[]).unwrap()[0].unwrap_i32(), 5);
}

#[tokio::test]
async fn test_imports_pass_through() {
    const IMPORTING_WAT: &str = r#"
        (module
            (import "host" "magic" (func $magic (result i32)))
            (func (export "main") (result i32)
                (call $magic))
        )
    "#;

    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(IMPORTING_WAT);
    let imports = ImportObject::new(|linker| {
        linker.func_wrap("host", "magic", || -> i32 { 41 })?;
        Ok(())
    });

    runtime.boot(&provider, imports).await.unwrap();
    assert_eq!(runtime.invoke("main", &[]).unwrap()[0].unwrap_i32(), 41);
}

#[tokio::test]
async fn test_unlinkable_import_is_fatal() {
    const IMPORTING_WAT: &str = r#"
        (module
            (import "host" "missing" (func (result i32)))
        )
    "#;

    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(IMPORTING_WAT);

    let result = runtime.boot(&provider, ImportObject::empty()).await;
    assert!(matches!(
        result,
        Err(BootError::BufferedInstantiate { .. })
    ));
    assert!(matches!(
        runtime.state(),
        LifecycleState::LoadFailed { .. }
    ));
}

// ============================================================================
// Test: memory and arguments
// ============================================================================

#[tokio::test]
async fn test_memory_size_is_gated() {
    let runtime = ModuleRuntime::new(BootConfig::default());
    assert!(matches!(runtime.memory_size(), Err(BootError::NotReady)));

    let provider = BytesProvider::new(MAIN_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(runtime.memory_size().unwrap(), Some(64 * 1024));
}

#[tokio::test]
async fn test_arguments_delegate_unchanged() {
    const ADD_WAT: &str = r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1)))
        )
    "#;

    let runtime = ModuleRuntime::new(BootConfig::default());
    let provider = BytesProvider::new(ADD_WAT);
    runtime.boot(&provider, ImportObject::empty()).await.unwrap();

    let results = runtime
        .invoke("add", &[Val::I32(19), Val::I32(23)])
        .unwrap();
    assert_eq!(results[0].unwrap_i32(), 42);
}

// ============================================================================
// Test: independent instances
// ============================================================================

#[tokio::test]
async fn test_instances_are_independent() {
    let alpha = ModuleRuntime::new(BootConfig::default());
    let beta = ModuleRuntime::new(BootConfig::default());

    let provider = BytesProvider::new(MAIN_WAT);
    alpha.boot(&provider, ImportObject::empty()).await.unwrap();

    assert_eq!(alpha.state(), LifecycleState::Ready);
    assert_eq!(beta.state(), LifecycleState::Uninitialized);
    assert!(matches!(beta.invoke("main", &[]), Err(BootError::NotReady)));

    alpha.exit();
    assert_eq!(beta.state(), LifecycleState::Uninitialized);
}
