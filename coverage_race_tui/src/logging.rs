//! Diagnostic logging via `RUST_LOG`.
//!
//! The TUI owns the terminal, so in interactive mode logs only go to a file
//! passed with `--log-file`; without one, logging stays off. Headless runs
//! log to stderr.

use std::{fs::File, path::Path, sync::Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Logs to stderr in compact form. Defaults to `warn` if `RUST_LOG` is unset.
pub fn init_stderr() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Logs to `path`, truncating it.
pub fn init_file(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .init();
    Ok(())
}
