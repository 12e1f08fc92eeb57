#![allow(clippy::result_large_err)] // Configuration construction returns AppError so failures stop the run before any file is read.

use crate::core::error::AppError;
use crate::core::pipeline::document::PipelineDocument;
use crate::core::pipeline::expression::ExpressionEngine;
use crate::core::pipeline::handler::{
    source_payload, HandlerDefinition, HandlerTree, TransformCache,
};
use crate::core::pipeline::loader::{LoaderRegistry, LoaderResolver};
use crate::core::pipeline::output::OutputGenerator;
use crate::core::pipeline::source::SourceFile;
use crate::core::pipeline::walker::SourceWalker;
use crate::core::types::ErrorCategory;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything gathered by the matching phase.
#[derive(Debug, Default)]
pub struct CollectedOutputs {
    pub outputs: Vec<OutputGenerator>,
    /// Per-source (or per-directory) failures; the affected sources contribute no outputs.
    pub errors: Vec<AppError>,
    pub sources: usize,
    /// Distinct `(handler, source)` chains memoized during this pass.
    pub memoized: usize,
}

impl CollectedOutputs {
    fn merge(&mut self, other: CollectedOutputs) {
        self.outputs.extend(other.outputs);
        self.errors.extend(other.errors);
        self.sources += other.sources;
    }
}

/// Immutable run configuration: source directories plus the handler tree.
pub struct Configuration {
    root: PathBuf,
    source_dirs: Vec<PathBuf>,
    context_dir: PathBuf,
    output_root: PathBuf,
    tree: Arc<HandlerTree>,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("root", &self.root)
            .field("source_dirs", &self.source_dirs)
            .field("context_dir", &self.context_dir)
            .field("output_root", &self.output_root)
            .field("handlers", &self.tree.len())
            .finish()
    }
}

impl Configuration {
    pub fn builder(root: impl Into<PathBuf>) -> ConfigurationBuilder {
        ConfigurationBuilder::new(root)
    }

    /// Build from a parsed document; relative paths resolve against `root`.
    pub fn from_document(
        doc: &PipelineDocument,
        root: &Path,
        resolver: Arc<dyn LoaderResolver>,
    ) -> Result<Self, AppError> {
        let engine = Arc::new(ExpressionEngine::default());
        let mut builder = ConfigurationBuilder::new(root)
            .context_dir(&doc.context)
            .output(&doc.output.path)
            .resolver(resolver)
            .engine(Arc::clone(&engine));
        for dir in &doc.source_dirs {
            builder = builder.source_dir(dir);
        }
        for definition in doc.handler_definitions(root, &engine)? {
            builder = builder.handler(definition);
        }
        builder.build()
    }

    /// Load a document from disk. `root` defaults to the document's directory.
    pub fn load(
        path: &Path,
        root: Option<&Path>,
        resolver: Arc<dyn LoaderResolver>,
    ) -> Result<Self, AppError> {
        let doc = PipelineDocument::load_from_file(path)?;
        let root = match root {
            Some(root) => root.to_path_buf(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        Self::from_document(&doc, &root, resolver)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dirs(&self) -> &[PathBuf] {
        &self.source_dirs
    }

    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn tree(&self) -> &Arc<HandlerTree> {
        &self.tree
    }

    /// Walk every source directory and ask every handler for its outputs.
    ///
    /// Directories, files and top-level handlers are all visited concurrently. A
    /// failure is recorded against its source (or directory) and does not stop the
    /// others. The memo of chain results lives only for this call.
    pub async fn collect_outputs(&self, walker: &dyn SourceWalker) -> CollectedOutputs {
        let cache = Arc::new(TransformCache::default());
        let walks = self
            .source_dirs
            .iter()
            .map(|dir| self.collect_dir(dir, walker, &cache));
        let mut collected = CollectedOutputs::default();
        for result in join_all(walks).await {
            collected.merge(result);
        }
        collected.memoized = cache.len();
        tracing::info!(
            sources = collected.sources,
            outputs = collected.outputs.len(),
            errors = collected.errors.len(),
            "matching finished"
        );
        collected
    }

    async fn collect_dir(
        &self,
        dir: &Path,
        walker: &dyn SourceWalker,
        cache: &Arc<TransformCache>,
    ) -> CollectedOutputs {
        let mut collected = CollectedOutputs::default();
        let files = match walker.walk(dir).await {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(source_dir = %dir.display(), error = %err, "walk failed");
                collected.errors.push(err);
                return collected;
            }
        };
        collected.sources = files.len();
        let pending = files.into_iter().map(|relative| {
            let source = Arc::new(SourceFile::new(dir, relative));
            let input = source_payload(Arc::clone(&source));
            self.tree
                .outputs_for_source(source, input, Arc::clone(cache))
        });
        for result in join_all(pending).await {
            match result {
                Ok(outputs) => collected.outputs.extend(outputs),
                Err(err) => {
                    tracing::warn!(error = %err, "source skipped");
                    collected.errors.push(err);
                }
            }
        }
        collected
    }
}

/// Programmatic construction, including loaders, predicates and destination
/// functions given as values.
pub struct ConfigurationBuilder {
    root: PathBuf,
    source_dirs: Vec<PathBuf>,
    context_dir: Option<PathBuf>,
    output_root: Option<PathBuf>,
    handlers: Vec<HandlerDefinition>,
    resolver: Option<Arc<dyn LoaderResolver>>,
    engine: Option<Arc<ExpressionEngine>>,
}

impl ConfigurationBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source_dirs: Vec::new(),
            context_dir: None,
            output_root: None,
            handlers: Vec::new(),
            resolver: None,
            engine: None,
        }
    }

    pub fn source_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.source_dirs.push(self.root.join(dir));
        self
    }

    pub fn context_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.context_dir = Some(self.root.join(dir));
        self
    }

    pub fn output(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_root = Some(self.root.join(dir));
        self
    }

    pub fn handler(mut self, handler: HandlerDefinition) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Loader resolver; defaults to the built-in registry.
    pub fn resolver(mut self, resolver: Arc<dyn LoaderResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn engine(mut self, engine: Arc<ExpressionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<Configuration, AppError> {
        if self.source_dirs.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "configuration needs at least one source directory",
            )
            .with_code("CB-CFG-003"));
        }
        let output_root = self.output_root.ok_or_else(|| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                "configuration needs an output directory",
            )
            .with_code("CB-CFG-003")
        })?;
        let context_dir = self.context_dir.unwrap_or_else(|| self.root.clone());
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(LoaderRegistry::with_builtins()));
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(ExpressionEngine::default()));
        let tree = HandlerTree::build(
            self.handlers,
            &output_root,
            &engine,
            resolver,
            &context_dir,
        )?;
        tracing::debug!(
            handlers = tree.len(),
            sources = self.source_dirs.len(),
            output = %output_root.display(),
            "configuration built"
        );
        Ok(Configuration {
            root: self.root,
            source_dirs: self.source_dirs,
            context_dir,
            output_root,
            tree,
        })
    }
}
