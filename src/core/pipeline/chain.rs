#![allow(clippy::result_large_err)] // Chain execution returns AppError so step failures keep handler and source context.

use crate::core::error::AppError;
use crate::core::pipeline::context::HandlerContext;
use crate::core::pipeline::loader::{Loader, LoaderOptions, LoaderResolver, StepContext};
use crate::core::types::ErrorCategory;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Transformable payload carried from step to step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Decode raw bytes, keeping them as bytes when they are not UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Content::Text(text),
            Err(err) => Content::Bytes(err.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Borrow the content as text; binary content is a transform error.
    pub fn as_text(&self) -> Result<&str, AppError> {
        match self {
            Content::Text(text) => Ok(text),
            Content::Bytes(bytes) => std::str::from_utf8(bytes).map_err(|err| {
                AppError::with_cause(
                    ErrorCategory::TransformError,
                    "content is not valid UTF-8 text",
                    err,
                )
                .with_code("CB-STEP-004")
            }),
        }
    }
}

/// `{content, value}` record threaded through a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub content: Content,
    pub value: Option<Value>,
}

impl Payload {
    pub fn new(content: Content) -> Self {
        Self {
            content,
            value: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Content::Text(text.into()))
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }
}

/// How a step names its loader.
#[derive(Clone)]
pub enum LoaderRef {
    Named(String),
    Direct(Arc<dyn Loader>),
}

/// One loader reference plus its options; resolves the loader at most once.
pub struct TransformStep {
    reference: LoaderRef,
    options: Arc<LoaderOptions>,
    ident: Option<String>,
    resolved: OnceCell<Result<Arc<dyn Loader>, Arc<AppError>>>,
}

impl TransformStep {
    pub fn named(name: impl Into<String>) -> Self {
        Self::from_ref(LoaderRef::Named(name.into()))
    }

    pub fn direct(loader: Arc<dyn Loader>) -> Self {
        Self::from_ref(LoaderRef::Direct(loader))
    }

    fn from_ref(reference: LoaderRef) -> Self {
        Self {
            reference,
            options: Arc::new(LoaderOptions::new()),
            ident: None,
            resolved: OnceCell::new(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn with_ident(mut self, ident: Option<String>) -> Self {
        self.ident = ident;
        self
    }

    /// Identity used in diagnostics: the ident, else the loader name.
    pub fn label(&self) -> String {
        if let Some(ident) = &self.ident {
            return ident.clone();
        }
        match &self.reference {
            LoaderRef::Named(name) => name.clone(),
            LoaderRef::Direct(loader) => loader.name().to_string(),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Resolve the loader. Success and failure are both cached for the rest of the run.
    pub async fn resolve(
        &self,
        resolver: &dyn LoaderResolver,
        context_dir: &Path,
    ) -> Result<Arc<dyn Loader>, AppError> {
        let resolved = self
            .resolved
            .get_or_init(|| async {
                let loader = match &self.reference {
                    LoaderRef::Named(name) => resolver.resolve(name, context_dir).await,
                    LoaderRef::Direct(loader) => Ok(Arc::clone(loader)),
                };
                let loader = loader.and_then(|loader| {
                    loader.validate_options(&self.options)?;
                    Ok(loader)
                });
                if let Err(err) = &loader {
                    tracing::warn!(step = %self.label(), error = %err, "loader resolution failed");
                }
                loader.map_err(Arc::new)
            })
            .await;
        match resolved {
            Ok(loader) => Ok(Arc::clone(loader)),
            Err(err) => Err(AppError::with_shared_cause(
                ErrorCategory::ResolutionError,
                format!("loader for step '{}' could not be resolved", self.label()),
                err,
            )
            .with_code("CB-LOAD-001")),
        }
    }
}

/// Ordered steps applied left to right.
pub struct TransformChain {
    steps: Vec<TransformStep>,
    resolver: Arc<dyn LoaderResolver>,
    context_dir: PathBuf,
}

impl TransformChain {
    pub fn new(
        steps: Vec<TransformStep>,
        resolver: Arc<dyn LoaderResolver>,
        context_dir: PathBuf,
    ) -> Self {
        Self {
            steps,
            resolver,
            context_dir,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.steps.iter().map(TransformStep::label).collect()
    }

    /// Run every step in order; the first failure aborts the chain.
    pub async fn apply(&self, input: Payload, ctx: &HandlerContext) -> Result<Payload, AppError> {
        let mut current = input;
        for step in &self.steps {
            let label = step.label();
            let loader = step
                .resolve(self.resolver.as_ref(), &self.context_dir)
                .await
                .map_err(|err| annotate(err, &label, ctx))?;
            let step_ctx = StepContext {
                step: label.clone(),
                options: Arc::clone(&step.options),
                value: current.value.clone(),
                resource_path: ctx.resource_path.clone(),
                resource_query: ctx.resource_query.clone(),
                data: ctx.data.clone(),
                context_dir: self.context_dir.clone(),
            };
            tracing::trace!(step = %label, source = %ctx.resource_path.display(), "applying step");
            let outcome = match loader.run(current, step_ctx) {
                Ok(outcome) => outcome.resolve().await,
                Err(err) => Err(err),
            };
            current = outcome.map_err(|err| {
                let wrapped = AppError::with_cause(
                    ErrorCategory::TransformError,
                    format!(
                        "step '{}' failed on {}",
                        label,
                        ctx.relative_path().display()
                    ),
                    err,
                )
                .with_code("CB-STEP-002");
                annotate(wrapped, &label, ctx)
            })?;
        }
        Ok(current)
    }
}

fn annotate(err: AppError, label: &str, ctx: &HandlerContext) -> AppError {
    err.with_context("step", label)
        .with_context("handler", ctx.origin.clone())
        .with_context("source", ctx.resource_path.display().to_string())
}
