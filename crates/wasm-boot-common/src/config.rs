//! Configuration structures for the bootstrap runtime.
//!
//! This module defines configuration options for a module bootstrap:
//! - [`BootConfig`]: Top-level configuration for one runtime instance
//! - [`FetchConfig`]: Transport settings for fetching the module binary
//!
//! Configurations can be loaded from TOML files or built in code.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration for one bootstrap instance.
///
/// # Example
///
/// ```toml
/// streaming_instantiation = true
/// stay_alive_after_exit = false
/// entry_point = "main"
///
/// [fetch]
/// timeout_ms = 30000
/// chunk_size = 65536
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootConfig {
    /// Attempt streaming instantiation when the binary source supports it.
    ///
    /// When disabled, the bootstrap goes directly to the buffered path.
    #[serde(default = "defaults::streaming_instantiation")]
    pub streaming_instantiation: bool,

    /// Keep the runtime in the `Ready` state after the auto-invoked entry
    /// point returns.
    ///
    /// When false (the default), the runtime transitions to `Exited` once
    /// the configured entry point completes, and later export calls fail.
    #[serde(default = "defaults::stay_alive_after_exit")]
    pub stay_alive_after_exit: bool,

    /// Export to invoke automatically once the runtime is ready.
    ///
    /// The readiness callback fires before this call. When unset, the
    /// runtime stays `Ready` until the host calls `exit`.
    #[serde(default)]
    pub entry_point: Option<String>,

    /// Transport settings for fetching the module binary.
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            streaming_instantiation: defaults::streaming_instantiation(),
            stay_alive_after_exit: defaults::stay_alive_after_exit(),
            entry_point: None,
            fetch: FetchConfig::default(),
        }
    }
}

/// Transport settings for fetching the module binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Overall fetch timeout in milliseconds.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Read chunk size in bytes for streaming delivery.
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            chunk_size: defaults::chunk_size(),
        }
    }
}

impl FetchConfig {
    /// Get the fetch timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BootConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }
}

/// Errors from loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path of the file that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse config file: {reason}")]
    Parse {
        /// Description of the parse failure.
        reason: String,
    },
}

/// Default value functions for serde.
mod defaults {
    pub const fn streaming_instantiation() -> bool {
        true
    }

    pub const fn stay_alive_after_exit() -> bool {
        false
    }

    pub const fn timeout_ms() -> u64 {
        30_000
    }

    pub const fn chunk_size() -> usize {
        64 * 1024
    }
}
