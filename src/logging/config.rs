use crate::logging::layers::console::ConsoleStyle;
use crate::Result;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Per-project directory holding `logging.toml` and, by default, the logs.
pub const STATE_DIR: &str = ".chainbuild";

/// `[logging]` table of `<root>/.chainbuild/logging.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub level: String,
    /// Log directory; relative paths resolve against the project root.
    pub dir: Option<PathBuf>,
    pub file: bool,
    pub console: ConsoleStyle,
    /// Daily log files kept before the oldest is removed.
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            file: true,
            console: ConsoleStyle::default(),
            keep_files: 7,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingFile {
    #[serde(default)]
    logging: LoggingConfig,
}

impl LoggingConfig {
    pub fn path(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join("logging.toml")
    }

    /// Defaults, overridden by the project file when one exists.
    pub fn load(project_root: Option<&Path>) -> Result<Self> {
        let config = match project_root.map(Self::path) {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: LoggingFile = toml::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(file.logging)
    }

    fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level)
            .with_context(|| format!("logging.level '{}' is not a valid filter", self.level))?;
        if self.keep_files == 0 {
            bail!("logging.keep_files must be at least 1");
        }
        Ok(())
    }
}
