#![allow(clippy::result_large_err)] // Walkers report failures as AppError for uniform run reporting.

use crate::core::error::AppError;
use crate::core::pipeline::destination::normalize;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Enumerates regular files under a source directory.
#[async_trait]
pub trait SourceWalker: Send + Sync {
    /// Paths relative to `root`, sorted.
    async fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, AppError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("source directory {0} does not exist")]
    Missing(PathBuf),
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("walker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<WalkError> for AppError {
    fn from(err: WalkError) -> Self {
        let root = match &err {
            WalkError::Missing(root) | WalkError::Walk { root, .. } => {
                Some(root.display().to_string())
            }
            WalkError::Join(_) => None,
        };
        let error = AppError::with_cause(
            ErrorCategory::IoError,
            "source directory could not be walked",
            err,
        )
        .with_code("CB-IO-002");
        match root {
            Some(root) => error.with_context("source_dir", root),
            None => error,
        }
    }
}

/// Filesystem walker backed by `walkdir` on the blocking pool.
///
/// Excluded paths are pruned with everything below them, unless one is itself
/// the walked root.
#[derive(Debug, Clone, Default)]
pub struct FsWalker {
    follow_links: bool,
    excluded: Vec<PathBuf>,
}

impl FsWalker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Skip `path` and everything below it.
    pub fn exclude(mut self, path: impl AsRef<Path>) -> Self {
        self.excluded.push(normalize(path.as_ref()));
        self
    }

    fn walk_blocking(
        root: &Path,
        follow_links: bool,
        excluded: &[PathBuf],
    ) -> Result<Vec<PathBuf>, WalkError> {
        if !root.is_dir() {
            return Err(WalkError::Missing(root.to_path_buf()));
        }
        let root = normalize(root);
        let mut files = Vec::new();
        let entries = WalkDir::new(&root)
            .follow_links(follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !excluded.iter().any(|path| entry.path() == path)
            });
        for entry in entries {
            let entry = entry.map_err(|source| WalkError::Walk {
                root: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl SourceWalker for FsWalker {
    async fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, AppError> {
        let root_owned = root.to_path_buf();
        let follow_links = self.follow_links;
        let excluded = self.excluded.clone();
        let files = tokio::task::spawn_blocking(move || {
            Self::walk_blocking(&root_owned, follow_links, &excluded)
        })
        .await
        .map_err(WalkError::from)??;
        tracing::debug!(root = %root.display(), files = files.len(), "source directory walked");
        Ok(files)
    }
}
