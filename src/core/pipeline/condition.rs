#![allow(clippy::result_large_err)] // Condition construction returns AppError to keep the offending spec in the message.

use crate::core::error::AppError;
use crate::core::pipeline::context::{path_value, HandlerContext};
use crate::core::pipeline::expression::{is_truthy, ExpressionEngine};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use rhai::AST;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const OBJECT_KEYS: [&str; 4] = ["test", "include", "exclude", "strict"];

/// User supplied predicate over a source path.
#[async_trait]
pub trait Predicate: Send + Sync + 'static {
    async fn test(&self, path: &Path, ctx: &HandlerContext) -> Result<bool, AppError>;
}

/// Adapter that lets a plain closure act as a [`Predicate`].
pub struct FnPredicate<F>(F);

#[async_trait]
impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&Path, &HandlerContext) -> Result<bool, AppError> + Send + Sync + 'static,
{
    async fn test(&self, path: &Path, ctx: &HandlerContext) -> Result<bool, AppError> {
        (self.0)(path, ctx)
    }
}

pub fn predicate_fn<F>(f: F) -> Arc<dyn Predicate>
where
    F: Fn(&Path, &HandlerContext) -> Result<bool, AppError> + Send + Sync + 'static,
{
    Arc::new(FnPredicate(f))
}

/// Unnormalized condition as written in configuration.
#[derive(Clone)]
pub enum ConditionSpec {
    Literal(bool),
    PathPrefix(String),
    Pattern(String),
    Expr(String),
    Predicate(Arc<dyn Predicate>),
    Nested(Arc<Condition>),
    List(Vec<ConditionSpec>),
    Object(ConditionObject),
}

/// Explicit `test`/`include`/`exclude` form.
#[derive(Clone, Default)]
pub struct ConditionObject {
    pub test: Option<Box<ConditionSpec>>,
    pub include: Vec<ConditionSpec>,
    pub exclude: Vec<ConditionSpec>,
}

impl fmt::Debug for ConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionSpec::Literal(flag) => write!(f, "{}", flag),
            ConditionSpec::PathPrefix(prefix) => write!(f, "prefix({:?})", prefix),
            ConditionSpec::Pattern(pattern) => write!(f, "regex({:?})", pattern),
            ConditionSpec::Expr(expr) => write!(f, "expr({:?})", expr),
            ConditionSpec::Predicate(_) => write!(f, "predicate"),
            ConditionSpec::Nested(_) => write!(f, "condition"),
            ConditionSpec::List(items) => f.debug_list().entries(items).finish(),
            ConditionSpec::Object(object) => f
                .debug_struct("object")
                .field("test", &object.test)
                .field("include", &object.include)
                .field("exclude", &object.exclude)
                .finish(),
        }
    }
}

impl ConditionSpec {
    /// Interpret a document value.
    ///
    /// Relative path prefixes are anchored at `root` so they compare against absolute
    /// source paths.
    pub fn from_value(value: &Value, root: &Path) -> Result<Self, AppError> {
        match value {
            Value::Bool(flag) => Ok(ConditionSpec::Literal(*flag)),
            Value::String(prefix) => {
                let prefix_path = Path::new(prefix);
                if prefix_path.is_absolute() {
                    Ok(ConditionSpec::PathPrefix(prefix.clone()))
                } else {
                    Ok(ConditionSpec::PathPrefix(
                        root.join(prefix_path).to_string_lossy().into_owned(),
                    ))
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|item| Self::from_value(item, root))
                .collect::<Result<Vec<_>, _>>()
                .map(ConditionSpec::List),
            Value::Object(map) => {
                if let Some(pattern) = single_key(map, "$regex") {
                    return Ok(ConditionSpec::Pattern(pattern.to_string()));
                }
                if let Some(expr) = single_key(map, "$expr") {
                    return Ok(ConditionSpec::Expr(expr.to_string()));
                }
                let strict = match map.get("strict") {
                    None => true,
                    Some(Value::Bool(flag)) => *flag,
                    Some(other) => {
                        return Err(invalid_spec(format!(
                            "condition 'strict' must be a boolean, got {}",
                            other
                        )))
                    }
                };
                if strict {
                    let mut unknown: Vec<&str> = map
                        .keys()
                        .map(String::as_str)
                        .filter(|key| !OBJECT_KEYS.contains(key))
                        .collect();
                    if !unknown.is_empty() {
                        unknown.sort_unstable();
                        return Err(invalid_spec(format!(
                            "unknown condition key(s): {}; expected test, include, exclude",
                            unknown.join(", ")
                        )));
                    }
                }
                let test = match map.get("test") {
                    Some(test) => Some(Box::new(Self::from_value(test, root)?)),
                    None => None,
                };
                Ok(ConditionSpec::Object(ConditionObject {
                    test,
                    include: Self::list_from_value(map.get("include"), root)?,
                    exclude: Self::list_from_value(map.get("exclude"), root)?,
                }))
            }
            Value::Null | Value::Number(_) => Err(invalid_spec(format!(
                "unsupported condition value: {}",
                value
            ))),
        }
    }

    /// Values of `include`/`exclude`: arrays list conditions, scalars become one entry.
    pub fn list_from_value(value: Option<&Value>, root: &Path) -> Result<Vec<Self>, AppError> {
        match value {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| Self::from_value(item, root))
                .collect(),
            Some(other) => Ok(vec![Self::from_value(other, root)?]),
        }
    }
}

fn single_key<'a>(map: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    if map.len() == 1 {
        map.get(key).and_then(Value::as_str)
    } else {
        None
    }
}

fn invalid_spec(message: String) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("CB-COND-001")
}

enum Test {
    Constant(bool),
    Prefix(String),
    Pattern(Regex),
    Expr {
        source: String,
        ast: AST,
        engine: Arc<ExpressionEngine>,
    },
    Predicate(Arc<dyn Predicate>),
    Nested(Arc<Condition>),
}

/// Normalized evaluator: `test AND all(include) AND NOT any(exclude)`.
pub struct Condition {
    test: Test,
    include: Vec<Arc<Condition>>,
    exclude: Vec<Arc<Condition>>,
}

impl Condition {
    /// Condition that always evaluates to `flag`.
    pub fn constant(flag: bool) -> Arc<Self> {
        Arc::new(Self::leaf(Test::Constant(flag)))
    }

    fn leaf(test: Test) -> Self {
        Self {
            test,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Normalize a spec into an evaluator tree. Regexes and expressions compile here.
    pub fn build(
        spec: ConditionSpec,
        engine: &Arc<ExpressionEngine>,
    ) -> Result<Arc<Self>, AppError> {
        let condition = match spec {
            ConditionSpec::Literal(flag) => Self::leaf(Test::Constant(flag)),
            ConditionSpec::PathPrefix(prefix) => Self::leaf(Test::Prefix(prefix)),
            ConditionSpec::Pattern(pattern) => {
                let regex = Regex::new(&pattern).map_err(|err| {
                    AppError::with_cause(
                        ErrorCategory::ConfigurationError,
                        format!("invalid condition regex '{}'", pattern),
                        err,
                    )
                    .with_code("CB-COND-001")
                })?;
                Self::leaf(Test::Pattern(regex))
            }
            ConditionSpec::Expr(source) => {
                let ast = engine.compile(&source)?;
                Self::leaf(Test::Expr {
                    source,
                    ast,
                    engine: Arc::clone(engine),
                })
            }
            ConditionSpec::Predicate(predicate) => Self::leaf(Test::Predicate(predicate)),
            ConditionSpec::Nested(condition) => return Ok(condition),
            ConditionSpec::List(items) => Self {
                test: Test::Constant(true),
                include: Self::build_all(items, engine)?,
                exclude: Vec::new(),
            },
            ConditionSpec::Object(object) => Self {
                test: match object.test {
                    Some(test) => Test::Nested(Self::build(*test, engine)?),
                    None => Test::Constant(true),
                },
                include: Self::build_all(object.include, engine)?,
                exclude: Self::build_all(object.exclude, engine)?,
            },
        };
        Ok(Arc::new(condition))
    }

    fn build_all(
        specs: Vec<ConditionSpec>,
        engine: &Arc<ExpressionEngine>,
    ) -> Result<Vec<Arc<Self>>, AppError> {
        specs
            .into_iter()
            .map(|spec| Self::build(spec, engine))
            .collect()
    }

    /// Evaluate against an absolute source path.
    pub fn evaluate<'a>(
        &'a self,
        path: &'a Path,
        ctx: &'a HandlerContext,
    ) -> BoxFuture<'a, Result<bool, AppError>> {
        async move {
            if !self.test_matches(path, ctx).await? {
                return Ok(false);
            }
            for condition in &self.include {
                if !condition.evaluate(path, ctx).await? {
                    return Ok(false);
                }
            }
            for condition in &self.exclude {
                if condition.evaluate(path, ctx).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        .boxed()
    }

    async fn test_matches(&self, path: &Path, ctx: &HandlerContext) -> Result<bool, AppError> {
        match &self.test {
            Test::Constant(flag) => Ok(*flag),
            Test::Prefix(prefix) => Ok(path.to_string_lossy().starts_with(prefix.as_str())),
            Test::Pattern(regex) => Ok(regex.is_match(&path.to_string_lossy())),
            Test::Expr {
                source,
                ast,
                engine,
            } => {
                let vars = ctx.expr_vars().set("path", path_value(path));
                let value = engine.evaluate(ast, &vars).map_err(|err| {
                    AppError::with_cause(
                        ErrorCategory::EvaluationError,
                        format!("condition '{}' failed", source),
                        err,
                    )
                    .with_code("CB-COND-002")
                })?;
                Ok(is_truthy(&value))
            }
            Test::Predicate(predicate) => predicate.test(path, ctx).await.map_err(|err| {
                AppError::with_cause(
                    ErrorCategory::EvaluationError,
                    format!("condition predicate failed for {}", path.display()),
                    err,
                )
                .with_code("CB-COND-002")
            }),
            Test::Nested(condition) => condition.evaluate(path, ctx).await,
        }
    }
}
