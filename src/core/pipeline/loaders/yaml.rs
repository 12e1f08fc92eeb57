use crate::core::error::AppError;
use crate::core::pipeline::chain::Payload;
use crate::core::pipeline::loader::{Loader, StepContext, StepOutcome};
use crate::core::types::ErrorCategory;
use serde_json::Value;

/// Parses YAML content and emits compact JSON.
pub struct YamlToJsonLoader;

impl Default for YamlToJsonLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl YamlToJsonLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for YamlToJsonLoader {
    fn name(&self) -> &str {
        "yaml-to-json"
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError> {
        let text = input.content.as_text()?;
        let document: Value = serde_yaml::from_str(text).map_err(|err| {
            AppError::with_cause(
                ErrorCategory::SerializationError,
                format!("{} is not valid YAML", ctx.resource_path.display()),
                err,
            )
            .with_code("CB-STEP-006")
        })?;
        let json = serde_json::to_string(&document).map_err(|err| {
            AppError::with_cause(ErrorCategory::SerializationError, "failed to emit JSON", err)
                .with_code("CB-STEP-006")
        })?;
        Ok(Payload::text(json).with_value(input.value).into())
    }
}

/// Re-emits JSON content pretty-printed.
pub struct JsonPrettyLoader;

impl Default for JsonPrettyLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonPrettyLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for JsonPrettyLoader {
    fn name(&self) -> &str {
        "json-pretty"
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError> {
        let document: Value = serde_json::from_str(input.content.as_text()?).map_err(|err| {
            AppError::with_cause(
                ErrorCategory::SerializationError,
                format!("{} is not valid JSON", ctx.resource_path.display()),
                err,
            )
            .with_code("CB-STEP-006")
        })?;
        let pretty = serde_json::to_string_pretty(&document).map_err(|err| {
            AppError::with_cause(ErrorCategory::SerializationError, "failed to emit JSON", err)
                .with_code("CB-STEP-006")
        })?;
        Ok(Payload::text(pretty).with_value(input.value).into())
    }
}
