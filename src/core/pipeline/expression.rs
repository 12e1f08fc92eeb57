use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

/// Named JSON values pushed into the scope of one evaluation.
#[derive(Clone, Default)]
pub struct ExprVars {
    values: Vec<(&'static str, Value)>,
}

impl ExprVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: Into<Value>>(mut self, name: &'static str, value: V) -> Self {
        self.values.push((name, value.into()));
        self
    }

    fn scope(&self) -> Result<Scope<'static>, AppError> {
        let mut scope = Scope::new();
        for (name, value) in &self.values {
            let dynamic = rhai::serde::to_dynamic(value).map_err(|err| {
                runtime_error(format!("variable '{}' cannot be exposed: {}", name, err))
            })?;
            scope.push_dynamic(*name, dynamic);
        }
        Ok(scope)
    }
}

/// Sandboxed rhai engine shared by conditions, destinations and inline loaders.
///
/// Expressions are compiled once at configuration time and evaluated per
/// source; results come back as JSON.
pub struct ExpressionEngine {
    engine: Engine,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        let mut engine = Engine::new();
        engine
            .set_max_operations(50_000)
            .set_max_call_levels(64)
            .set_max_expr_depths(64, 64)
            .set_max_string_size(16 * 1024 * 1024);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
        Self { engine }
    }
}

impl ExpressionEngine {
    pub fn compile(&self, source: &str) -> Result<AST, AppError> {
        self.engine.compile_expression(source).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("cannot compile expression '{}': {}", source, err),
            )
            .with_code("CB-EXPR-001")
        })
    }

    pub fn evaluate(&self, ast: &AST, vars: &ExprVars) -> Result<Value, AppError> {
        let mut scope = vars.scope()?;
        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, ast)
            .map_err(|err| runtime_error(format!("expression failed: {}", err)))?;
        rhai::serde::from_dynamic(&result)
            .map_err(|err| runtime_error(format!("expression result is not data: {}", err)))
    }
}

fn runtime_error(message: String) -> AppError {
    AppError::new(ErrorCategory::EvaluationError, message).with_code("CB-EXPR-002")
}

/// JSON truthiness: null, false, zero and empty values are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
