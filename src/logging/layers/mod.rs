pub mod console;
pub mod file;

use tracing_subscriber::{Layer, Registry};

/// Type-erased sink so console and file layers can be collected in one `Vec`.
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
