use crate::core::error::AppError;
use crate::core::pipeline::chain::Payload;
use crate::core::pipeline::loader::{Loader, StepContext, StepOutcome};
use crate::core::types::ErrorCategory;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Replaces the content with its SHA-256 digest (hex) and records the input size
/// as the sideband value.
///
/// Hashing runs on the blocking pool and reports back through the step's
/// completion handle.
pub struct HashLoader;

impl Default for HashLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl HashLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Loader for HashLoader {
    fn name(&self) -> &str {
        "hash"
    }

    fn run(&self, input: Payload, ctx: StepContext) -> Result<StepOutcome, AppError> {
        let (completer, outcome) = ctx.deferred();
        let worker = completer.clone();
        let task = tokio::task::spawn_blocking(move || {
            let bytes = input.content.as_bytes();
            let digest = hex::encode(Sha256::digest(bytes));
            worker.complete(Ok(Payload::text(digest).with_value(Some(json!(bytes.len())))));
        });
        tokio::spawn(async move {
            if let Err(err) = task.await {
                completer.complete(Err(AppError::with_cause(
                    ErrorCategory::InternalError,
                    "hash worker failed",
                    err,
                )
                .with_code("CB-STEP-007")));
            }
        });
        Ok(outcome)
    }
}
