//! Subscriber setup for the `profiling` feature.
//!
//! The loader itself only emits `tracing` events and spans. These helpers
//! install a global subscriber for hosts and tools that do not bring their
//! own.
//!
//! ```ignore
//! let _guard = archetype_bundle::logging::init_file("logs", "bundles.json")?;
//! ```

use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

use crate::error::{BundleError, Result};

/// Log to stdout, as plain text or one JSON object per line
pub fn init_stdout(level: Level, json: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| BundleError::Config(format!("tracing subscriber: {e}")))
}

/// Log JSON lines to `dir/file_name` through a background writer.
///
/// Keep the returned guard alive; dropping it flushes and stops the writer.
pub fn init_file(dir: impl AsRef<Path>, file_name: &str) -> Result<WorkerGuard> {
    let appender = tracing_appender::rolling::never(dir.as_ref(), file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(Level::TRACE)
        .try_init()
        .map_err(|e| BundleError::Config(format!("tracing subscriber: {e}")))?;
    Ok(guard)
}
