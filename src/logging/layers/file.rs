use crate::logging::config::{LoggingConfig, STATE_DIR};
use crate::logging::layers::BoxedLayer;
use crate::Result;
use anyhow::{anyhow, Context};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::Layer;

pub const LOG_PREFIX: &str = "chainbuild";

/// Where log files go: the configured dir, else `.chainbuild/logs` under the
/// project root, else under the home directory.
pub fn log_dir(config: &LoggingConfig, project_root: Option<&Path>) -> Result<PathBuf> {
    let base = match project_root {
        Some(root) => root.to_path_buf(),
        None => dirs_next::home_dir().ok_or_else(|| anyhow!("home directory unavailable"))?,
    };
    Ok(match &config.dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => base.join(dir),
        None => base.join(STATE_DIR).join("logs"),
    })
}

/// Daily-rolling `chainbuild.<date>.log` files written off the async runtime.
pub fn file_layer(dir: &Path, keep_files: usize) -> Result<(BoxedLayer, WorkerGuard)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .max_log_files(keep_files)
        .build(dir)
        .with_context(|| format!("failed to open log files in {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer)
        .boxed();
    Ok((layer, guard))
}
