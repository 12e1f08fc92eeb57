#![allow(clippy::result_large_err)] // Inline expression compilation reports AppError at configuration time.

use crate::core::error::AppError;
use crate::core::pipeline::chain::Payload;
use crate::core::pipeline::context::path_value;
use crate::core::pipeline::expression::{ExprVars, ExpressionEngine};
use crate::core::pipeline::loader::{Loader, StepContext, StepOutcome};
use crate::core::types::ErrorCategory;
use rhai::AST;
use serde_json::Value;
use std::sync::Arc;

/// Inline step written as an expression in the pipeline document.
///
/// In scope: `content` (text), `value`, `options`, `resource`, `query`, `data`.
/// A string result becomes the new content; anything else is serialized as JSON.
pub struct ExprLoader {
    source: String,
    ast: AST,
    engine: Arc<ExpressionEngine>,
}

impl ExprLoader {
    pub fn compile(
        engine: &Arc<ExpressionEngine>,
        source: impl Into<String>,
    ) -> Result<Self, AppError> {
        let source = source.into();
        let ast = engine.compile(&source)?;
        Ok(Self {
            source,
            ast,
            engine: Arc::clone(engine),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Loader for ExprLoader {
    fn name(&self) -> &str {
        "expr"
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError> {
        let options: serde_json::Map<String, Value> = ctx
            .options
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let vars = ExprVars::new()
            .set("content", input.content.as_text()?.to_string())
            .set("value", input.value.clone().unwrap_or(Value::Null))
            .set("options", Value::Object(options))
            .set("resource", path_value(&ctx.resource_path))
            .set(
                "query",
                ctx.resource_query.clone().map(Value::String).unwrap_or(Value::Null),
            )
            .set("data", ctx.data.clone());
        let result = self.engine.evaluate(&self.ast, &vars)?;
        let text = match result {
            Value::String(text) => text,
            other => serde_json::to_string(&other).map_err(|err| {
                AppError::with_cause(
                    ErrorCategory::SerializationError,
                    format!("expression '{}' produced an unserializable value", self.source),
                    err,
                )
                .with_code("CB-STEP-006")
            })?,
        };
        Ok(Payload::text(text).with_value(input.value).into())
    }
}
