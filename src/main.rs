//! wasm-boot CLI entry point.
//!
//! Boots a WebAssembly module from a local path or URL, and optionally
//! invokes one of its exports once the runtime is ready.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use wasm_boot_common::BootConfig;
use wasm_boot_core::{BinaryProvider, FileProvider, HttpProvider, ImportObject, ModuleRuntime};

/// Bootstrap a WebAssembly module and gate its exports.
#[derive(Debug, Parser)]
#[command(name = "wasm-boot", version, about)]
struct Args {
    /// Module source: a file path or an http(s) URL.
    source: String,

    /// Export to invoke once the runtime is ready.
    #[arg(long)]
    invoke: Option<String>,

    /// Skip the streaming instantiation attempt.
    #[arg(long)]
    no_streaming: bool,

    /// Keep the runtime alive after the invoked entry point returns.
    #[arg(long)]
    stay_alive: bool,

    /// Path to a TOML configuration file.
    #[arg(long, env = "WASM_BOOT_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wasm_boot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BootConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BootConfig::default(),
    };
    if args.no_streaming {
        config.streaming_instantiation = false;
    }
    if args.stay_alive {
        config.stay_alive_after_exit = true;
    }
    if args.invoke.is_some() {
        config.entry_point = args.invoke.clone();
    }

    let provider = build_provider(&args.source, &config)?;
    info!(source = %provider.describe(), "Configuration loaded");

    let runtime = ModuleRuntime::new(config);
    runtime.on_ready(|| info!("Readiness callback fired"));

    runtime
        .boot(provider.as_ref(), ImportObject::empty())
        .await
        .context("bootstrap failed")?;

    let mut exports = runtime.export_names();
    exports.sort();
    info!(state = %runtime.state(), ?exports, "Bootstrap complete");

    Ok(())
}

/// Pick a binary provider from the source string.
fn build_provider(
    source: &str,
    config: &BootConfig,
) -> anyhow::Result<Box<dyn BinaryProvider>> {
    if let Ok(url) = Url::parse(source) {
        if matches!(url.scheme(), "http" | "https") {
            let provider = HttpProvider::new(url, &config.fetch)
                .context("building HTTP provider")?;
            return Ok(Box::new(provider));
        }
    }

    Ok(Box::new(FileProvider::new(source, &config.fetch)))
}
