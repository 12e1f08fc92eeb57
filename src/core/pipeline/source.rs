#![allow(clippy::result_large_err)] // Source accessors return AppError so I/O failures keep the file path in context.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Run-unique identifier of a discovered source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        SourceId(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lazily populated view of one file under a source directory.
///
/// Every accessor computes its value at most once; concurrent callers await the same
/// in-flight read instead of issuing their own.
pub struct SourceFile {
    id: SourceId,
    path: PathBuf,
    relative: PathBuf,
    source_dir: PathBuf,
    size: OnceCell<u64>,
    content: OnceCell<Arc<Vec<u8>>>,
    text: OnceCell<Arc<str>>,
    hash: OnceCell<String>,
    reads: AtomicUsize,
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("relative", &self.relative)
            .finish()
    }
}

impl SourceFile {
    pub fn new(source_dir: impl Into<PathBuf>, relative: impl Into<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        let relative = relative.into();
        Self {
            id: SourceId::next(),
            path: source_dir.join(&relative),
            relative,
            source_dir,
            size: OnceCell::new(),
            content: OnceCell::new(),
            text: OnceCell::new(),
            hash: OnceCell::new(),
            reads: AtomicUsize::new(0),
        }
    }

    /// Build a source whose content is already known; nothing is read from disk.
    pub fn with_content(
        source_dir: impl Into<PathBuf>,
        relative: impl Into<PathBuf>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        let mut source = Self::new(source_dir, relative);
        let content = content.into();
        source.size = OnceCell::new_with(Some(content.len() as u64));
        source.content = OnceCell::new_with(Some(Arc::new(content)));
        source
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Number of times the file was actually read from disk.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub async fn size(&self) -> Result<u64, AppError> {
        self.size
            .get_or_try_init(|| async {
                if let Some(content) = self.content.get() {
                    return Ok(content.len() as u64);
                }
                let metadata = tokio::fs::metadata(&self.path)
                    .await
                    .map_err(|err| self.io_error("stat", err))?;
                Ok::<_, AppError>(metadata.len())
            })
            .await
            .copied()
    }

    pub async fn content(&self) -> Result<Arc<Vec<u8>>, AppError> {
        self.content
            .get_or_try_init(|| async {
                self.reads.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(path = %self.path.display(), "reading source");
                let bytes = tokio::fs::read(&self.path)
                    .await
                    .map_err(|err| self.io_error("read", err))?;
                Ok::<_, AppError>(Arc::new(bytes))
            })
            .await
            .cloned()
    }

    pub async fn text(&self) -> Result<Arc<str>, AppError> {
        self.text
            .get_or_try_init(|| async {
                let bytes = self.content().await?;
                let text = std::str::from_utf8(&bytes).map_err(|err| {
                    AppError::with_cause(
                        ErrorCategory::SerializationError,
                        format!("{} is not valid UTF-8", self.path.display()),
                        err,
                    )
                    .with_code("CB-SRC-002")
                })?;
                Ok::<_, AppError>(Arc::from(text))
            })
            .await
            .cloned()
    }

    /// Hex SHA-256 of the raw content.
    pub async fn hash(&self) -> Result<String, AppError> {
        self.hash
            .get_or_try_init(|| async {
                let bytes = self.content().await?;
                let mut hasher = Sha256::new();
                hasher.update(bytes.as_slice());
                Ok::<_, AppError>(hex::encode(hasher.finalize()))
            })
            .await
            .cloned()
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> AppError {
        AppError::with_cause(
            ErrorCategory::IoError,
            format!("failed to {} source {}", action, self.path.display()),
            err,
        )
        .with_code("CB-SRC-001")
    }
}
