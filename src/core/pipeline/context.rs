use crate::core::pipeline::expression::ExprVars;
use crate::core::pipeline::source::SourceFile;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-call context built by a handler for one source file.
#[derive(Clone)]
pub struct HandlerContext {
    pub source: Arc<SourceFile>,
    pub output_dir: PathBuf,
    pub resource_path: PathBuf,
    pub resource_query: Option<String>,
    pub data: Value,
    pub origin: String,
}

impl HandlerContext {
    pub fn new(source: Arc<SourceFile>, output_dir: PathBuf, origin: impl Into<String>) -> Self {
        let resource_path = source.path().to_path_buf();
        Self {
            source,
            output_dir,
            resource_path,
            resource_query: None,
            data: Value::Object(Default::default()),
            origin: origin.into(),
        }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.resource_query = query;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn relative_path(&self) -> &Path {
        self.source.relative()
    }

    /// Variables shared by every expression evaluated in this context.
    pub fn expr_vars(&self) -> ExprVars {
        ExprVars::new()
            .set("resource", path_value(&self.resource_path))
            .set("relative", path_value(self.source.relative()))
            .set(
                "query",
                self.resource_query
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            )
            .set("data", self.data.clone())
    }
}

pub(crate) fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
