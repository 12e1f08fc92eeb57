use crate::core::error::AppError;
use crate::core::pipeline::chain::Payload;
use crate::core::pipeline::loader::{Loader, LoaderOptions, StepContext, StepOutcome};
use crate::core::types::ErrorCategory;
use serde_json::Value;

/// Replaces the content with its decimal character length.
pub struct LengthLoader;

impl Default for LengthLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl LengthLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for LengthLoader {
    fn name(&self) -> &str {
        "length"
    }

    fn run(&self, input: Payload, _ctx: StepContext) -> Result<StepOutcome, AppError> {
        let length = input.content.as_text()?.chars().count();
        Ok(Payload::text(length.to_string())
            .with_value(input.value)
            .into())
    }
}

fn required_text(name: &str, options: &LoaderOptions) -> Result<(), AppError> {
    match options.get("text") {
        Some(Value::String(_)) => Ok(()),
        _ => Err(AppError::new(
            ErrorCategory::ConfigurationError,
            format!("loader '{}' requires a string option 'text'", name),
        )
        .with_code("CB-STEP-005")),
    }
}

/// Adds `options.text` after the content.
pub struct AppendLoader;

impl Default for AppendLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AppendLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for AppendLoader {
    fn name(&self) -> &str {
        "append"
    }

    fn validate_options(&self, options: &LoaderOptions) -> Result<(), AppError> {
        required_text(self.name(), options)
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError> {
        let suffix = ctx.option_str("text").unwrap_or_default();
        let text = format!("{}{}", input.content.as_text()?, suffix);
        Ok(Payload::text(text).with_value(input.value).into())
    }
}

/// Adds `options.text` before the content.
pub struct PrependLoader;

impl Default for PrependLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PrependLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for PrependLoader {
    fn name(&self) -> &str {
        "prepend"
    }

    fn validate_options(&self, options: &LoaderOptions) -> Result<(), AppError> {
        required_text(self.name(), options)
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError> {
        let prefix = ctx.option_str("text").unwrap_or_default();
        let text = format!("{}{}", prefix, input.content.as_text()?);
        Ok(Payload::text(text).with_value(input.value).into())
    }
}

pub struct UppercaseLoader;

impl Default for UppercaseLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl UppercaseLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for UppercaseLoader {
    fn name(&self) -> &str {
        "uppercase"
    }

    fn run(&self, input: Payload, _ctx: StepContext) -> Result<StepOutcome, AppError> {
        let text = input.content.as_text()?.to_uppercase();
        Ok(Payload::text(text).with_value(input.value).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::chain::Content;
    use crate::core::pipeline::loaders::testing::step_context;
    use serde_json::json;

    async fn run(loader: &dyn Loader, options: LoaderOptions, text: &str) -> String {
        let ctx = step_context(loader.name(), options);
        let payload = loader
            .run(Payload::text(text), ctx)
            .expect("run")
            .resolve()
            .await
            .expect("resolve");
        match payload.content {
            Content::Text(text) => text,
            Content::Bytes(_) => panic!("expected text"),
        }
    }

    fn text_option(text: &str) -> LoaderOptions {
        let mut options = LoaderOptions::new();
        options.insert("text".to_string(), json!(text));
        options
    }

    #[tokio::test]
    async fn length_counts_characters() {
        assert_eq!(run(&LengthLoader, LoaderOptions::new(), "{\"k\":\"v\"}").await, "9");
        assert_eq!(run(&LengthLoader, LoaderOptions::new(), "héllo").await, "5");
    }

    #[tokio::test]
    async fn append_and_prepend_use_the_text_option() {
        assert_eq!(run(&AppendLoader, text_option("!"), "hi").await, "hi!");
        assert_eq!(run(&PrependLoader, text_option("> "), "hi").await, "> hi");
        assert_eq!(run(&UppercaseLoader, LoaderOptions::new(), "hi").await, "HI");
    }

    #[test]
    fn missing_text_option_is_rejected() {
        let err = AppendLoader
            .validate_options(&LoaderOptions::new())
            .expect_err("text required");
        assert_eq!(err.code, "CB-STEP-005");
        assert!(PrependLoader.validate_options(&text_option("x")).is_ok());
    }

    #[tokio::test]
    async fn binary_content_is_rejected() {
        let ctx = step_context("uppercase", LoaderOptions::new());
        let input = Payload::new(Content::Bytes(vec![0xff]));
        let err = UppercaseLoader.run(input, ctx).err().expect("binary");
        assert_eq!(err.code, "CB-STEP-004");
    }
}
