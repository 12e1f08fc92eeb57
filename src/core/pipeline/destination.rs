#![allow(clippy::result_large_err)] // Destination policies return AppError for structured diagnostics.

use crate::core::error::AppError;
use crate::core::pipeline::context::{path_value, HandlerContext};
use crate::core::pipeline::expression::ExpressionEngine;
use crate::core::types::ErrorCategory;
use regex::{Captures, Regex};
use rhai::AST;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

const PLACEHOLDERS: [&str; 6] = ["default", "dir", "name", "stem", "ext", "relative"];

/// Computes a destination from the default destination and the handler context.
///
/// `Ok(None)` means the handler level emits no file.
pub trait DestinationFn: Send + Sync + 'static {
    fn destination(
        &self,
        default: &Path,
        ctx: &HandlerContext,
    ) -> Result<Option<PathBuf>, AppError>;
}

impl<F> DestinationFn for F
where
    F: Fn(&Path, &HandlerContext) -> Result<Option<PathBuf>, AppError> + Send + Sync + 'static,
{
    fn destination(
        &self,
        default: &Path,
        ctx: &HandlerContext,
    ) -> Result<Option<PathBuf>, AppError> {
        self(default, ctx)
    }
}

/// Destination policy as configured.
#[derive(Clone, Default)]
pub enum DestinationSpec {
    #[default]
    Default,
    Never,
    Template(String),
    Expr(String),
    Function(Arc<dyn DestinationFn>),
}

impl DestinationSpec {
    pub fn from_value(value: Option<&Value>) -> Result<Self, AppError> {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(true)) => Ok(DestinationSpec::Default),
            Some(Value::Bool(false)) => Ok(DestinationSpec::Never),
            Some(Value::String(template)) => Ok(DestinationSpec::Template(template.clone())),
            Some(Value::Object(map)) if map.len() == 1 => match map.get("$expr") {
                Some(Value::String(expr)) => Ok(DestinationSpec::Expr(expr.clone())),
                _ => Err(invalid_destination(&Value::Object(map.clone()))),
            },
            Some(other) => Err(invalid_destination(other)),
        }
    }
}

fn invalid_destination(value: &Value) -> AppError {
    AppError::new(
        ErrorCategory::ConfigurationError,
        format!(
            "unsupported destination {}; expected a template string, false, or {{\"$expr\": ...}}",
            value
        ),
    )
    .with_code("CB-CFG-004")
}

fn placeholder_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z]+)\}").expect("placeholder pattern is valid"))
}

/// Compiled destination policy.
pub enum Destination {
    Default,
    Never,
    Template(String),
    Expr {
        source: String,
        ast: AST,
        engine: Arc<ExpressionEngine>,
    },
    Function(Arc<dyn DestinationFn>),
}

impl Destination {
    pub fn build(spec: DestinationSpec, engine: &Arc<ExpressionEngine>) -> Result<Self, AppError> {
        match spec {
            DestinationSpec::Default => Ok(Destination::Default),
            DestinationSpec::Never => Ok(Destination::Never),
            DestinationSpec::Template(template) => {
                for captures in placeholder_regex().captures_iter(&template) {
                    let name = &captures[1];
                    if !PLACEHOLDERS.contains(&name) {
                        return Err(AppError::new(
                            ErrorCategory::ConfigurationError,
                            format!(
                                "unknown placeholder {{{}}} in destination '{}'; supported: {}",
                                name,
                                template,
                                PLACEHOLDERS.join(", ")
                            ),
                        )
                        .with_code("CB-CFG-004"));
                    }
                }
                Ok(Destination::Template(template))
            }
            DestinationSpec::Expr(source) => {
                let ast = engine.compile(&source)?;
                Ok(Destination::Expr {
                    source,
                    ast,
                    engine: Arc::clone(engine),
                })
            }
            DestinationSpec::Function(function) => Ok(Destination::Function(function)),
        }
    }

    /// Final destination, joined under the handler's output dir when relative.
    pub fn resolve(
        &self,
        default: &Path,
        ctx: &HandlerContext,
    ) -> Result<Option<PathBuf>, AppError> {
        let resolved = match self {
            Destination::Default => Some(default.to_path_buf()),
            Destination::Never => None,
            Destination::Template(template) => Some(PathBuf::from(render_template(
                template,
                default,
                ctx.relative_path(),
            ))),
            Destination::Expr {
                source,
                ast,
                engine,
            } => {
                let vars = ctx.expr_vars().set("default", path_value(default));
                let value = engine.evaluate(ast, &vars).map_err(|err| {
                    AppError::with_cause(
                        ErrorCategory::EvaluationError,
                        format!("destination '{}' failed", source),
                        err,
                    )
                    .with_code("CB-DEST-001")
                })?;
                match value {
                    Value::String(path) if !path.is_empty() => Some(PathBuf::from(path)),
                    Value::String(_) | Value::Null | Value::Bool(false) => None,
                    other => {
                        return Err(AppError::new(
                            ErrorCategory::EvaluationError,
                            format!(
                                "destination '{}' returned {}; expected a path string or false",
                                source, other
                            ),
                        )
                        .with_code("CB-DEST-001"))
                    }
                }
            }
            Destination::Function(function) => function.destination(default, ctx)?,
        };
        Ok(resolved.map(|path| {
            if path.is_absolute() {
                normalize(&path)
            } else {
                normalize(&ctx.output_dir.join(path))
            }
        }))
    }
}

/// Fold `.` and `..` away without touching the filesystem, so one file always
/// has one spelling when destinations are grouped. `..` never climbs above the
/// root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn render_template(template: &str, default: &Path, relative: &Path) -> String {
    placeholder_regex()
        .replace_all(template, |captures: &Captures| match &captures[1] {
            "default" => default.to_string_lossy().into_owned(),
            "relative" => relative.to_string_lossy().into_owned(),
            "dir" => relative
                .parent()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default(),
            "name" => file_part(relative.file_name()),
            "stem" => file_part(relative.file_stem()),
            "ext" => file_part(relative.extension()),
            other => format!("{{{}}}", other),
        })
        .into_owned()
}

fn file_part(part: Option<&std::ffi::OsStr>) -> String {
    part.map(|part| part.to_string_lossy().into_owned())
        .unwrap_or_default()
}
