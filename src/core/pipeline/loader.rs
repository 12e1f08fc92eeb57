#![allow(clippy::result_large_err)] // Loader trait and registry return AppError directly for structured diagnostics without boxing.

use crate::core::error::AppError;
use crate::core::pipeline::chain::Payload;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Per-step options as written in the pipeline document.
pub type LoaderOptions = IndexMap<String, Value>;

/// Everything a loader may look at besides its input payload.
#[derive(Clone)]
pub struct StepContext {
    pub step: String,
    pub options: Arc<LoaderOptions>,
    pub value: Option<Value>,
    pub resource_path: PathBuf,
    pub resource_query: Option<String>,
    pub data: Value,
    pub context_dir: PathBuf,
}

impl StepContext {
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Switch to callback-style completion.
    ///
    /// The returned [`Completer`] resolves the returned outcome; only its first signal
    /// counts.
    pub fn deferred(&self) -> (Completer, StepOutcome) {
        let (sender, receiver) = oneshot::channel();
        let completer = Completer {
            slot: Arc::new(Mutex::new(Some(sender))),
        };
        let step = self.step.clone();
        let pending = async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(AppError::new(
                    ErrorCategory::TransformError,
                    format!("loader '{}' finished without signalling a result", step),
                )
                .with_code("CB-STEP-003")),
            }
        }
        .boxed();
        (completer, StepOutcome::Pending(pending))
    }
}

/// What a loader hands back: a finished payload or one still being produced.
pub enum StepOutcome {
    Ready(Payload),
    Pending(BoxFuture<'static, Result<Payload, AppError>>),
}

impl StepOutcome {
    pub async fn resolve(self) -> Result<Payload, AppError> {
        match self {
            StepOutcome::Ready(payload) => Ok(payload),
            StepOutcome::Pending(future) => future.await,
        }
    }
}

impl From<Payload> for StepOutcome {
    fn from(payload: Payload) -> Self {
        StepOutcome::Ready(payload)
    }
}

/// Single-assignment completion handle for a deferred step.
#[derive(Clone)]
pub struct Completer {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<Payload, AppError>>>>>,
}

impl Completer {
    /// Deliver the step result. Returns `false` when a result was already delivered.
    pub fn complete(&self, result: Result<Payload, AppError>) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.slot.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

/// A single content transformation.
pub trait Loader: Send + Sync + 'static {
    /// Name used to reference the loader from pipeline documents.
    fn name(&self) -> &str;

    /// Reject unusable options once, when the step first resolves the loader.
    fn validate_options(&self, _options: &LoaderOptions) -> Result<(), AppError> {
        Ok(())
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError>;
}

/// Turns a step's loader name into a loader instance.
#[async_trait]
pub trait LoaderResolver: Send + Sync + 'static {
    async fn resolve(&self, name: &str, context_dir: &Path) -> Result<Arc<dyn Loader>, AppError>;
}

/// Builder used to register loaders before a run.
pub struct LoaderRegistryBuilder {
    loaders: HashMap<String, Arc<dyn Loader>>,
}

impl Default for LoaderRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderRegistryBuilder {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    pub fn register<T: Loader>(&mut self, loader: T) -> &mut Self {
        self.register_arc(Arc::new(loader))
    }

    pub fn register_arc(&mut self, loader: Arc<dyn Loader>) -> &mut Self {
        let name = loader.name().to_string();
        if self.loaders.contains_key(&name) {
            panic!("duplicate loader registered: {}", name);
        }
        self.loaders.insert(name, loader);
        self
    }

    pub fn build(self) -> LoaderRegistry {
        LoaderRegistry {
            inner: Arc::new(self.loaders),
        }
    }
}

/// Immutable name-to-loader table; the default [`LoaderResolver`].
#[derive(Clone)]
pub struct LoaderRegistry {
    inner: Arc<HashMap<String, Arc<dyn Loader>>>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoaderRegistry {
    pub fn new() -> Self {
        LoaderRegistryBuilder::new().build()
    }

    pub fn builder() -> LoaderRegistryBuilder {
        LoaderRegistryBuilder::new()
    }

    /// Registry preloaded with every built-in loader.
    pub fn with_builtins() -> Self {
        let mut builder = LoaderRegistryBuilder::new();
        crate::core::pipeline::loaders::register_builtins(&mut builder);
        builder.build()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Loader>> {
        self.inner.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl LoaderResolver for LoaderRegistry {
    async fn resolve(&self, name: &str, context_dir: &Path) -> Result<Arc<dyn Loader>, AppError> {
        self.get(name).ok_or_else(|| {
            AppError::new(
                ErrorCategory::ResolutionError,
                format!("unknown loader '{}'", name),
            )
            .with_code("CB-LOAD-002")
            .with_context("context", context_dir.display().to_string())
        })
    }
}
