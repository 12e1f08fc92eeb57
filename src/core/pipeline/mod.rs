//! Declarative file-to-file build pipeline: conditions select sources, handlers
//! thread them through loader chains, and outputs are written once the whole
//! destination set is known to be collision free.

pub mod chain;
pub mod condition;
pub mod config;
pub mod conflict;
pub mod context;
pub mod destination;
pub mod document;
pub mod expression;
pub mod handler;
pub mod loader;
pub mod loaders;
pub mod output;
pub mod runner;
pub mod source;
pub mod walker;

pub use chain::{Content, LoaderRef, Payload, TransformChain, TransformStep};
pub use condition::{predicate_fn, Condition, ConditionObject, ConditionSpec, Predicate};
pub use config::{CollectedOutputs, Configuration, ConfigurationBuilder};
pub use conflict::{detect_conflicts, find_collisions, Collision};
pub use context::HandlerContext;
pub use destination::{Destination, DestinationFn, DestinationSpec};
pub use document::{load_document, DocumentFormat, PipelineDocument, StepSpec, DEFAULT_DOCUMENT};
pub use expression::ExpressionEngine;
pub use handler::{HandlerDefinition, HandlerId, HandlerTree, TransformCache};
pub use loader::{
    Completer, Loader, LoaderOptions, LoaderRegistry, LoaderRegistryBuilder, LoaderResolver,
    StepContext, StepOutcome,
};
pub use output::{DryRunSink, FsSink, OutputGenerator, OutputSink, OutputTarget, WrittenOutput};
pub use runner::{plan, run, RunReport};
pub use source::{SourceFile, SourceId};
pub use walker::{FsWalker, SourceWalker};
