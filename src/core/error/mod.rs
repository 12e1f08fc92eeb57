use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let severity = match category {
            ErrorCategory::ConfigurationError | ErrorCategory::CollisionError => {
                ErrorSeverity::Fatal
            }
            ErrorCategory::EvaluationError
            | ErrorCategory::ResolutionError
            | ErrorCategory::TransformError
            | ErrorCategory::IoError
            | ErrorCategory::SerializationError
            | ErrorCategory::InternalError => ErrorSeverity::Error,
        };
        AppError {
            category,
            severity,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: BTreeMap::new(),
            occurred_at: Utc::now(),
            source: None,
        }
    }

    /// Build an error that keeps `cause` as the next link of its chain.
    pub fn with_cause<T, E>(category: ErrorCategory, message: T, cause: E) -> Self
    where
        T: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::Error::new(cause));
        error
    }

    /// Wrap an error shared between several consumers (memoized transforms).
    pub fn with_shared_cause<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        cause: &Arc<AppError>,
    ) -> Self {
        Self::with_cause(category, message, Arc::clone(cause))
    }

    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    /// Messages of this error followed by every wrapped cause, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        if let Some(source) = &self.source {
            for cause in source.chain() {
                messages.push(cause.to_string());
            }
        }
        messages
    }

    /// Code of the innermost `AppError` in the chain, useful to classify wrapped failures.
    pub fn root_code(&self) -> &str {
        let mut code = self.code.as_str();
        let mut current = self.source.as_ref();
        while let Some(source) = current {
            if let Some(inner) = source.downcast_ref::<AppError>() {
                code = inner.code.as_str();
                current = inner.source.as_ref();
            } else if let Some(inner) = source.downcast_ref::<Arc<AppError>>() {
                code = inner.code.as_str();
                current = inner.source.as_ref();
            } else {
                break;
            }
        }
        code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            write!(f, " (Context: {:?})", self.context)?;
        }
        if f.alternate() {
            if let Some(ref source) = self.source {
                write!(f, "\nCaused by: {:#}", source)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn std::error::Error + 'static))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::InternalError, e.to_string());
        error.code = "ANYHOW_ERROR".to_string();
        error.source = Some(e);
        error
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        let mut error = AppError::new(ErrorCategory::IoError, e.to_string());
        error.code = "IO_ERROR".to_string();
        error.source = Some(anyhow::anyhow!(e));
        error
    }
}

pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
}

/// Prints errors to stderr; `verbose` adds the full causal chain.
pub struct DefaultErrorReporter {
    verbose: bool,
}

impl DefaultErrorReporter {
    pub fn new(verbose: bool) -> Self {
        DefaultErrorReporter { verbose }
    }

    /// Lines printed for `error`, without trailing newlines.
    pub fn render(&self, error: &AppError) -> Vec<String> {
        let label = match error.severity {
            ErrorSeverity::Fatal => "FATAL",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Warning => "WARNING",
        };
        let mut lines = vec![format!("[{}] {}: {}", label, error.code, error.message)];
        lines.extend(
            error
                .context
                .iter()
                .map(|(key, value)| format!("  {}: {}", key, value)),
        );
        let causes = error.chain();
        let shown = if self.verbose { causes.len() } else { 2 };
        lines.extend(
            causes
                .iter()
                .skip(1)
                .take(shown.saturating_sub(1))
                .map(|cause| format!("  Caused by: {}", cause)),
        );
        lines
    }
}

impl Default for DefaultErrorReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ErrorReporter for DefaultErrorReporter {
    fn report_error(&self, error: &AppError) {
        for line in self.render(error) {
            eprintln!("{}", line);
        }
    }
}
