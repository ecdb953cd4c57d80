//! Tracing setup: compact stdout output mirrored into an append-only log file.
//!
//! The file path comes from `RAG_GATEWAY_LOG_FILE`, falling back to `logs/rag-gateway.log`.
//! Missing parent directories are created. When the file cannot be opened the gateway keeps
//! logging to stdout only.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "RAG_GATEWAY_LOG_FILE";
const DEFAULT_LOG_PATH: &str = "logs/rag-gateway.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber and return the log file in use, if any.
///
/// `RUST_LOG` drives filtering and defaults to `info`.
pub fn init_tracing() -> Option<PathBuf> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let path = log_file_path(|key| std::env::var(key).ok());
    match open_log_writer(&path) {
        Ok((writer, guard)) => {
            let _ = LOG_GUARD.set(guard);
            registry
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .compact(),
                )
                .init();
            Some(path)
        }
        Err(err) => {
            registry.init();
            tracing::warn!(path = %path.display(), error = %err, "File logging disabled");
            None
        }
    }
}

fn log_file_path<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(LOG_FILE_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_PATH), PathBuf::from)
}

fn open_log_writer(path: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(tracing_appender::non_blocking(file))
}
