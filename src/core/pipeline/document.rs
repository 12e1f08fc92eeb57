#![allow(clippy::result_large_err)] // Document APIs return AppError to preserve structured validation context without boxing.

use crate::core::error::AppError;
use crate::core::pipeline::chain::TransformStep;
use crate::core::pipeline::condition::{ConditionObject, ConditionSpec};
use crate::core::pipeline::destination::DestinationSpec;
use crate::core::pipeline::expression::ExpressionEngine;
use crate::core::pipeline::handler::HandlerDefinition;
use crate::core::pipeline::loader::LoaderOptions;
use crate::core::pipeline::loaders::ExprLoader;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name looked up when no document is given explicitly.
pub const DEFAULT_DOCUMENT: &str = "chainbuild.yaml";

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_data() -> Value {
    Value::Object(Map::new())
}

/// Root of a pipeline document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDocument {
    #[serde(alias = "sourceDirs")]
    pub source_dirs: Vec<PathBuf>,
    /// Base directory for loader resolution.
    #[serde(default = "default_context")]
    pub context: PathBuf,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub path: PathBuf,
    pub handlers: Vec<HandlerSpec>,
}

/// One handler entry. Condition and destination values stay untyped here and are
/// cast when the handler tree is built.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub test: Option<Value>,
    #[serde(default)]
    pub include: Option<Value>,
    #[serde(default)]
    pub exclude: Option<Value>,
    #[serde(default)]
    pub destination: Option<Value>,
    #[serde(default, rename = "use")]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub fork: Vec<HandlerSpec>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default = "default_data")]
    pub data: Value,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StepSpec {
    Name(String),
    Loader(LoaderStepSpec),
    Expr(ExprStepSpec),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderStepSpec {
    pub loader: String,
    #[serde(default)]
    pub options: LoaderOptions,
    #[serde(default)]
    pub ident: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExprStepSpec {
    pub expr: String,
    #[serde(default)]
    pub ident: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

impl PipelineDocument {
    /// Load and validate a pipeline document; `.json` files are read as JSON,
    /// everything else as YAML.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::with_cause(
                ErrorCategory::IoError,
                format!("failed to read {}", path.display()),
                err,
            )
            .with_code("CB-CFG-001")
        })?;
        Self::parse(&text, DocumentFormat::from_path(path))
            .map_err(|err| err.with_context("document", path.display().to_string()))
    }

    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self, AppError> {
        let doc: PipelineDocument = match format {
            DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(parse_error)?,
            DocumentFormat::Json => serde_json::from_str(text).map_err(parse_error)?,
        };
        doc.validate()?;
        Ok(doc)
    }

    /// Structural checks that do not need the expression engine or loaders.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.source_dirs.is_empty() {
            return Err(invalid("source_dirs must list at least one directory"));
        }
        if self.output.path.as_os_str().is_empty() {
            return Err(invalid("output.path must not be empty"));
        }
        if self.output.handlers.is_empty() {
            return Err(invalid("output.handlers must define at least one handler"));
        }
        for (index, handler) in self.output.handlers.iter().enumerate() {
            handler.validate(&format!("handlers[{}]", index))?;
        }
        Ok(())
    }

    /// Cast every handler entry into a definition ready for the handler tree.
    ///
    /// Relative path-prefix conditions are anchored at `root`.
    pub fn handler_definitions(
        &self,
        root: &Path,
        engine: &Arc<ExpressionEngine>,
    ) -> Result<Vec<HandlerDefinition>, AppError> {
        self.output
            .handlers
            .iter()
            .enumerate()
            .map(|(index, handler)| {
                handler
                    .to_definition(root, engine)
                    .map_err(|err| err.with_context("handler", format!("handlers[{}]", index)))
            })
            .collect()
    }
}

impl HandlerSpec {
    fn validate(&self, label: &str) -> Result<(), AppError> {
        for (index, step) in self.steps.iter().enumerate() {
            let blank = match step {
                StepSpec::Name(name) => name.trim().is_empty(),
                StepSpec::Loader(spec) => spec.loader.trim().is_empty(),
                StepSpec::Expr(spec) => spec.expr.trim().is_empty(),
            };
            if blank {
                return Err(invalid(format!("{}.use[{}] is empty", label, index)));
            }
        }
        if !self.data.is_object() {
            return Err(invalid(format!("{}.data must be a mapping", label)));
        }
        for (index, fork) in self.fork.iter().enumerate() {
            fork.validate(&format!("{}.fork[{}]", label, index))?;
        }
        Ok(())
    }

    pub fn to_definition(
        &self,
        root: &Path,
        engine: &Arc<ExpressionEngine>,
    ) -> Result<HandlerDefinition, AppError> {
        let test = self
            .test
            .as_ref()
            .map(|value| ConditionSpec::from_value(value, root))
            .transpose()?;
        let condition = ConditionSpec::Object(ConditionObject {
            test: test.map(Box::new),
            include: ConditionSpec::list_from_value(self.include.as_ref(), root)?,
            exclude: ConditionSpec::list_from_value(self.exclude.as_ref(), root)?,
        });

        let mut definition = HandlerDefinition::new()
            .when(condition)
            .destination(DestinationSpec::from_value(self.destination.as_ref())?)
            .data(self.data.clone());
        definition.name = self.name.clone();
        definition.output = self.output.clone();
        definition.query = self.query.clone();
        for step in &self.steps {
            definition = definition.step(step.to_step(engine)?);
        }
        for fork in &self.fork {
            definition = definition.fork(fork.to_definition(root, engine)?);
        }
        Ok(definition)
    }
}

impl StepSpec {
    pub fn to_step(&self, engine: &Arc<ExpressionEngine>) -> Result<TransformStep, AppError> {
        match self {
            StepSpec::Name(name) => Ok(TransformStep::named(name.clone())),
            StepSpec::Loader(spec) => Ok(TransformStep::named(spec.loader.clone())
                .with_options(spec.options.clone())
                .with_ident(spec.ident.clone())),
            StepSpec::Expr(spec) => {
                let loader = ExprLoader::compile(engine, spec.expr.clone())?;
                Ok(TransformStep::direct(Arc::new(loader)).with_ident(spec.ident.clone()))
            }
        }
    }
}

fn parse_error<E>(err: E) -> AppError
where
    E: std::error::Error + Send + Sync + 'static,
{
    AppError::with_cause(
        ErrorCategory::ConfigurationError,
        format!("failed to parse pipeline document: {}", err),
        err,
    )
    .with_code("CB-CFG-002")
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("CB-CFG-003")
}

pub fn load_document(path: &Path) -> Result<PipelineDocument, AppError> {
    PipelineDocument::load_from_file(path)
}
