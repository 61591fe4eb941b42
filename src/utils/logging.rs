//! Diagnostic logging to a file.
//!
//! The terminal belongs to the live renderer, so diagnostics never go to
//! stdout or stderr. Without a log file no subscriber is installed and the
//! `tracing` macros are no-ops.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_ENV: &str = "SIMPL_LOG_FILE";
pub const LOG_FILTER_ENV: &str = "SIMPL_LOG";
const DEFAULT_FILTER: &str = "info";

/// Log file from the command line, else from `SIMPL_LOG_FILE`.
pub fn resolve_log_path(cli: Option<&Path>) -> Option<PathBuf> {
    cli.map(Path::to_path_buf).or_else(|| {
        std::env::var_os(LOG_FILE_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    })
}

/// Install the global subscriber. Returns the log path when one was set up.
pub fn init_tracing(cli: Option<&Path>) -> io::Result<Option<PathBuf>> {
    let Some(path) = resolve_log_path(cli) else {
        return Ok(None);
    };
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    build_subscriber(file, env_filter())
        .try_init()
        .map_err(io::Error::other)?;
    Ok(Some(path))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn build_subscriber(
    log_file: File,
    filter: EnvFilter,
) -> impl tracing::Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(filter)
}
