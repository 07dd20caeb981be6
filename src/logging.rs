use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{self, LogConfig};

pub const LOG_FILE: &str = "alt-timeline.log";

// Buffered lines are lost unless the guard lives until exit.
pub fn init(cfg: &LogConfig) -> Result<(WorkerGuard, PathBuf)> {
    let log_dir = cfg
        .dir
        .clone()
        .or_else(config::default_cache_dir)
        .context("log: no cache directory available")?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("log: create {}", log_dir.display()))?;

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let path = log_dir.join(LOG_FILE);
    let file = options
        .open(&path)
        .with_context(|| format!("log: open {}", path.display()))?;
    let (writer, guard) = non_blocking(file);

    let default_filter = default_filter(&cfg.level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_ansi(false)
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(file_layer).try_init();
    Ok((guard, path))
}

fn default_filter(level: &str) -> String {
    let level = match level.trim().to_ascii_lowercase().as_str() {
        "" => "warn".to_string(),
        other => other.to_string(),
    };
    format!("alt_timeline={level}")
}
