//! Common types, errors, and configuration for wasm-boot.
//!
//! This crate provides shared functionality used across the wasm-boot
//! workspace:
//! - Error types using `thiserror` for the bootstrap failure surface
//! - Configuration structures for bootstrap and fetch settings

pub mod config;
pub mod error;

pub use config::{BootConfig, ConfigError, FetchConfig};
pub use error::BootError;
