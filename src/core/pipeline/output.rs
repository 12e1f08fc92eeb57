#![allow(clippy::result_large_err)] // Output materialization returns AppError so write failures keep their destination.

use crate::core::error::AppError;
use crate::core::pipeline::chain::Payload;
use crate::core::pipeline::destination::normalize;
use crate::core::pipeline::source::SourceFile;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Memoized chain output shared by a handler's own output and all of its forks.
pub type SharedPayload = Shared<BoxFuture<'static, Result<Payload, Arc<AppError>>>>;

/// Receives final content for a destination.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn write(&self, destination: &Path, content: &[u8]) -> Result<(), AppError>;
}

/// Writes to the local filesystem through a temp file and rename.
///
/// Temp files are hidden siblings with a random suffix, so they never share a
/// path with another output.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

#[async_trait]
impl OutputSink for FsSink {
    async fn write(&self, destination: &Path, content: &[u8]) -> Result<(), AppError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| write_error(parent, "create directory", err))?;
        }
        let tmp = temp_path(destination);
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|err| write_error(&tmp, "write", err))?;
        if let Err(err) = tokio::fs::rename(&tmp, destination).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_error(destination, "rename into", err));
        }
        Ok(())
    }
}

fn temp_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(destination.file_name().unwrap_or_default());
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    destination.with_file_name(name)
}

/// Accepts every write without touching the filesystem; used for plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

#[async_trait]
impl OutputSink for DryRunSink {
    async fn write(&self, _destination: &Path, _content: &[u8]) -> Result<(), AppError> {
        Ok(())
    }
}

fn write_error(path: &Path, action: &str, err: std::io::Error) -> AppError {
    AppError::with_cause(
        ErrorCategory::IoError,
        format!("failed to {} {}", action, path.display()),
        err,
    )
    .with_code("CB-IO-001")
    .with_context("destination", path.display().to_string())
}

/// Where an output goes once materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    /// The chain still runs but nothing is written.
    Discard,
}

/// Record of one materialized file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenOutput {
    pub destination: PathBuf,
    pub origin: String,
    pub bytes: usize,
}

/// Deferred "write this chain's result to this destination".
pub struct OutputGenerator {
    source: Arc<SourceFile>,
    target: OutputTarget,
    handler: String,
    producer: SharedPayload,
    materialized: AtomicBool,
}

impl std::fmt::Debug for OutputGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputGenerator")
            .field("target", &self.target)
            .field("origin", &self.origin())
            .finish()
    }
}

impl OutputGenerator {
    /// File destinations are normalized here, so the conflict check sees one
    /// spelling per file.
    pub fn new(
        source: Arc<SourceFile>,
        target: OutputTarget,
        handler: impl Into<String>,
        producer: SharedPayload,
    ) -> Self {
        let target = match target {
            OutputTarget::File(path) => OutputTarget::File(normalize(&path)),
            OutputTarget::Discard => OutputTarget::Discard,
        };
        Self {
            source,
            target,
            handler: handler.into(),
            producer,
            materialized: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn destination(&self) -> Option<&Path> {
        match &self.target {
            OutputTarget::File(path) => Some(path),
            OutputTarget::Discard => None,
        }
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Which handler produced this output, and from which source.
    pub fn origin(&self) -> String {
        format!("{} <- {}", self.handler, self.source.relative().display())
    }

    /// Await the chain result without writing anything.
    pub async fn content(&self) -> Result<Payload, AppError> {
        self.producer.clone().await.map_err(|err| {
            AppError::with_shared_cause(
                ErrorCategory::TransformError,
                format!("output {} could not be produced", self.origin()),
                &err,
            )
            .with_code("CB-OUT-002")
            .with_context("source", self.source.path().display().to_string())
        })
    }

    /// Produce the content and hand it to `sink`. Allowed once per generator.
    pub async fn materialize(
        &self,
        sink: &dyn OutputSink,
    ) -> Result<Option<WrittenOutput>, AppError> {
        if self.materialized.swap(true, Ordering::SeqCst) {
            return Err(AppError::new(
                ErrorCategory::InternalError,
                format!("output {} was already materialized", self.origin()),
            )
            .with_code("CB-OUT-001"));
        }
        let payload = self.content().await?;
        match &self.target {
            OutputTarget::Discard => Ok(None),
            OutputTarget::File(destination) => {
                let bytes = payload.content.as_bytes();
                sink.write(destination, bytes).await.map_err(|err| {
                    AppError::with_cause(
                        ErrorCategory::IoError,
                        format!("failed to write {}", destination.display()),
                        err,
                    )
                    .with_code("CB-IO-001")
                    .with_context("origin", self.origin())
                })?;
                tracing::debug!(
                    destination = %destination.display(),
                    origin = %self.origin(),
                    bytes = bytes.len(),
                    "output written"
                );
                Ok(Some(WrittenOutput {
                    destination: destination.clone(),
                    origin: self.origin(),
                    bytes: bytes.len(),
                }))
            }
        }
    }
}
