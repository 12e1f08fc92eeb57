//! Process-wide tracing setup: an `EnvFilter` over a console sink on stderr and
//! a rolling file sink.

pub mod config;
pub mod context;
pub mod layers;

pub use context::{console_mode, ConsoleMode};
pub use layers::console::ConsoleStyle;

use crate::logging::config::LoggingConfig;
use crate::logging::layers::{console, file, BoxedLayer};
use crate::{cli::Command, Result};
use anyhow::{bail, Context};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Keeps the file writer flushing until the command finishes.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    console: ConsoleStyle,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn console(&self) -> ConsoleStyle {
        self.console
    }

    /// Directory of the rolling log files, when file logging is on.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Install the global subscriber for `command`. Fails on a second call.
///
/// `RUST_LOG` wins over `logging.level`; `--verbose` adds `chainbuild=debug`.
pub fn init(command: &Command, project_root: Option<&Path>) -> Result<LoggingGuard> {
    install(command, project_root, BoxMakeWriter::new(io::stderr))
}

fn install(
    command: &Command,
    project_root: Option<&Path>,
    console_writer: BoxMakeWriter,
) -> Result<LoggingGuard> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        bail!("logging already initialized");
    }

    let config = LoggingConfig::load(project_root)?;
    let verbose = command.project().map(|args| args.verbose).unwrap_or(false);
    let filter = filter(&config, verbose)?;

    let style = console_mode(command).style(config.console);
    let mut sinks: Vec<BoxedLayer> = Vec::new();
    sinks.extend(console::console_layer(style, console_writer));

    let mut file_guard = None;
    let mut log_dir = None;
    if config.file {
        let dir = file::log_dir(&config, project_root)?;
        let (layer, guard) = file::file_layer(&dir, config.keep_files)?;
        sinks.push(layer);
        file_guard = Some(guard);
        log_dir = Some(dir);
    }

    tracing_subscriber::registry()
        .with(sinks)
        .with(filter)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        console: style,
        log_dir,
    })
}

/// Directories a build must never read as sources: the project's state
/// directory and the log directory, wherever it is configured.
pub fn state_dirs(project_root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![project_root.join(config::STATE_DIR)];
    let log_dir = LoggingConfig::load(Some(project_root))
        .and_then(|config| file::log_dir(&config, Some(project_root)));
    if let Ok(log_dir) = log_dir {
        if !log_dir.starts_with(&dirs[0]) {
            dirs.push(log_dir);
        }
    }
    dirs
}

fn filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let mut filter = EnvFilter::try_new(&config.level).context("invalid logging.level")?;
    if verbose {
        filter = filter.add_directive(
            "chainbuild=debug"
                .parse()
                .context("invalid verbose directive")?,
        );
    }
    Ok(filter)
}
