//! Core bootstrap runtime for wasm-boot.
//!
//! This crate loads a compiled WebAssembly module asynchronously,
//! instantiates it (streaming when possible, buffered as fallback), and
//! gates every export behind the instance lifecycle:
//!
//! - [`BinaryProvider`]: where the module bytes come from (HTTP, file,
//!   or a host-supplied buffer)
//! - [`select_path`]: the streaming-vs-buffered instantiation decision
//! - [`LifecycleState`] / [`lifecycle::StateCell`]: the one-way lifecycle
//! - [`ExportGateway`]: dictionary of guarded exports, built at readiness
//! - [`ReadySignal`]: the single-fire readiness notification
//! - [`ModuleRuntime`]: the handle that ties it all together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   bytes    ┌─────────────────────────┐
//! │  BinaryProvider  │──────────▶│ instantiation strategy   │
//! │  (http/file/buf) │  stream /  │ streaming ─▶ fallback   │
//! └──────────────────┘  buffered  └───────────┬─────────────┘
//!                                             │ instance
//!                                             ▼
//!                    ┌────────────────────────────────────┐
//!                    │           ModuleRuntime            │
//!                    │  StateCell: Uninitialized → … →    │
//!                    │  Ready → Exited  (or LoadFailed)   │
//!                    │  ReadySignal: fires once at Ready  │
//!                    │  ExportGateway: guarded delegation │
//!                    └────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use wasm_boot_common::BootConfig;
//! use wasm_boot_core::{BytesProvider, ImportObject, ModuleRuntime};
//!
//! let runtime = ModuleRuntime::new(BootConfig::default());
//! runtime.on_ready(|| println!("ready"));
//!
//! let provider = BytesProvider::new(wasm_bytes);
//! runtime.boot(&provider, ImportObject::empty()).await?;
//!
//! let results = runtime.invoke("main", &[])?;
//! ```

pub mod gateway;
pub mod lifecycle;
pub mod notifier;
pub mod provider;
pub mod runtime;
pub mod strategy;

pub use gateway::ExportGateway;
pub use lifecycle::LifecycleState;
pub use notifier::ReadySignal;
pub use provider::{BinaryProvider, ByteStream, BytesProvider, FileProvider, HttpProvider};
pub use runtime::{ExportedEntryPoint, HostState, ImportObject, ModuleRuntime};
pub use strategy::{select_path, InstantiationPath};
