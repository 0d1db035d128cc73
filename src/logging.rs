//! Run-log setup for applications built on the crate.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the caller. [`init_run_log`] is the usual choice for a photometry run:
//! console output plus a fresh `photometry.log` in the data directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Name of the per-run log file.
pub const LOG_FILE_NAME: &str = "photometry.log";

/// Install a global subscriber writing to stderr and to `<dir>/photometry.log`.
///
/// The log file is truncated on every run. The filter comes from `RUST_LOG`
/// and defaults to `info`. Fails if the file cannot be created or a global
/// subscriber is already installed.
pub fn init_run_log(dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(path = %path.display(), "Run log initialized");
    Ok(path)
}
