#![allow(clippy::result_large_err)] // Handler construction returns AppError so configuration mistakes name the handler.

use crate::core::error::AppError;
use crate::core::pipeline::chain::{Content, Payload, TransformChain, TransformStep};
use crate::core::pipeline::condition::{Condition, ConditionSpec};
use crate::core::pipeline::context::HandlerContext;
use crate::core::pipeline::destination::{Destination, DestinationSpec};
use crate::core::pipeline::expression::ExpressionEngine;
use crate::core::pipeline::loader::LoaderResolver;
use crate::core::pipeline::output::{OutputGenerator, OutputTarget, SharedPayload};
use crate::core::pipeline::source::{SourceFile, SourceId};
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Index of a handler inside its [`HandlerTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(usize);

impl HandlerId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handler as configured, before conditions and destinations are compiled.
pub struct HandlerDefinition {
    pub name: Option<String>,
    pub condition: ConditionSpec,
    pub destination: DestinationSpec,
    pub steps: Vec<TransformStep>,
    pub forks: Vec<HandlerDefinition>,
    pub output: Option<PathBuf>,
    pub data: Value,
    pub query: Option<String>,
}

impl Default for HandlerDefinition {
    fn default() -> Self {
        Self {
            name: None,
            condition: ConditionSpec::Literal(true),
            destination: DestinationSpec::Default,
            steps: Vec::new(),
            forks: Vec::new(),
            output: None,
            data: Value::Object(Default::default()),
            query: None,
        }
    }
}

impl HandlerDefinition {
    /// Handler that matches every source.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn when(mut self, condition: ConditionSpec) -> Self {
        self.condition = condition;
        self
    }

    pub fn destination(mut self, destination: DestinationSpec) -> Self {
        self.destination = destination;
        self
    }

    pub fn step(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn fork(mut self, fork: HandlerDefinition) -> Self {
        self.forks.push(fork);
        self
    }

    /// Output directory for this handler, relative to its parent's.
    pub fn output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

struct HandlerNode {
    label: String,
    condition: Arc<Condition>,
    destination: Destination,
    chain: TransformChain,
    forks: Vec<HandlerId>,
    output_dir: PathBuf,
    data: Value,
    query: Option<String>,
}

/// Chain results memoized per `(handler, source)` and shared by every fork.
///
/// Scoped to one matching pass; outputs keep their own handles to the shared
/// results, so the cache can be dropped once matching is over.
#[derive(Default)]
pub struct TransformCache {
    entries: DashMap<(HandlerId, SourceId), SharedPayload>,
}

impl TransformCache {
    pub fn get_or_insert_with(
        &self,
        key: (HandlerId, SourceId),
        produce: impl FnOnce() -> SharedPayload,
    ) -> SharedPayload {
        self.entries.entry(key).or_insert_with(produce).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Arena of compiled handlers. Top-level handlers are the roots; forks are
/// referenced by id from their parent.
pub struct HandlerTree {
    nodes: Vec<HandlerNode>,
    roots: Vec<HandlerId>,
}

impl HandlerTree {
    pub fn build(
        definitions: Vec<HandlerDefinition>,
        output_root: &Path,
        engine: &Arc<ExpressionEngine>,
        resolver: Arc<dyn LoaderResolver>,
        context_dir: &Path,
    ) -> Result<Arc<Self>, AppError> {
        let mut builder = TreeBuilder {
            nodes: Vec::new(),
            engine,
            resolver,
            context_dir,
        };
        let mut roots = Vec::with_capacity(definitions.len());
        for (index, definition) in definitions.into_iter().enumerate() {
            let path = format!("handlers[{}]", index);
            roots.push(builder.add(definition, path, output_root)?);
        }
        Ok(Arc::new(Self {
            nodes: builder.nodes,
            roots,
        }))
    }

    pub fn roots(&self) -> &[HandlerId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn label(&self, id: HandlerId) -> &str {
        &self.nodes[id.0].label
    }

    pub fn forks(&self, id: HandlerId) -> &[HandlerId] {
        &self.nodes[id.0].forks
    }

    pub fn steps(&self, id: HandlerId) -> Vec<String> {
        self.nodes[id.0].chain.labels()
    }

    /// Ask every top-level handler, concurrently, for its outputs on `source`.
    ///
    /// `input` is the source content as a shared payload; it is only awaited when
    /// some output is materialized. Chain results are memoized in `cache`.
    pub fn outputs_for_source(
        self: &Arc<Self>,
        source: Arc<SourceFile>,
        input: SharedPayload,
        cache: Arc<TransformCache>,
    ) -> BoxFuture<'static, Result<Vec<OutputGenerator>, AppError>> {
        let tree = Arc::clone(self);
        async move {
            let pending = tree.roots.iter().map(|root| {
                Arc::clone(&tree).outputs_for_handler(
                    *root,
                    Arc::clone(&source),
                    input.clone(),
                    Arc::clone(&cache),
                )
            });
            let mut outputs = Vec::new();
            for result in join_all(pending).await {
                outputs.extend(result?);
            }
            Ok(outputs)
        }
        .boxed()
    }

    /// Outputs of one handler and, when it matches, of all its forks.
    pub fn outputs_for_handler(
        self: Arc<Self>,
        id: HandlerId,
        source: Arc<SourceFile>,
        input: SharedPayload,
        cache: Arc<TransformCache>,
    ) -> BoxFuture<'static, Result<Vec<OutputGenerator>, AppError>> {
        async move {
            let node = &self.nodes[id.0];
            let ctx = HandlerContext::new(
                Arc::clone(&source),
                node.output_dir.clone(),
                node.label.clone(),
            )
            .with_query(node.query.clone())
            .with_data(node.data.clone());

            let matched = node
                .condition
                .evaluate(source.path(), &ctx)
                .await
                .map_err(|err| in_handler(err, node, &source))?;
            if !matched {
                tracing::trace!(
                    handler = %node.label,
                    source = %source.relative().display(),
                    "no match"
                );
                return Ok(Vec::new());
            }

            let default = node.output_dir.join(source.relative());
            let target = match node
                .destination
                .resolve(&default, &ctx)
                .map_err(|err| in_handler(err, node, &source))?
            {
                Some(path) => OutputTarget::File(path),
                None => OutputTarget::Discard,
            };
            tracing::debug!(
                handler = %node.label,
                source = %source.relative().display(),
                target = ?target,
                "handler matched"
            );

            let transformed = self.transformed(&cache, id, &source, input, ctx);
            let mut outputs = vec![OutputGenerator::new(
                Arc::clone(&source),
                target,
                node.label.clone(),
                transformed.clone(),
            )];

            let forks = node.forks.iter().map(|fork| {
                Arc::clone(&self).outputs_for_handler(
                    *fork,
                    Arc::clone(&source),
                    transformed.clone(),
                    Arc::clone(&cache),
                )
            });
            for result in join_all(forks).await {
                outputs.extend(result?);
            }
            Ok(outputs)
        }
        .boxed()
    }

    fn transformed(
        self: &Arc<Self>,
        cache: &TransformCache,
        id: HandlerId,
        source: &SourceFile,
        input: SharedPayload,
        ctx: HandlerContext,
    ) -> SharedPayload {
        let tree = Arc::clone(self);
        cache.get_or_insert_with((id, source.id()), move || {
            async move {
                let input = input.await?;
                tree.nodes[id.0]
                    .chain
                    .apply(input, &ctx)
                    .await
                    .map_err(Arc::new)
            }
            .boxed()
            .shared()
        })
    }
}

/// Raw source content as the input payload of top-level handlers.
pub fn source_payload(source: Arc<SourceFile>) -> SharedPayload {
    async move {
        let bytes = source.content().await.map_err(Arc::new)?;
        Ok(Payload::new(Content::from_bytes(bytes.to_vec())))
    }
    .boxed()
    .shared()
}

fn in_handler(err: AppError, node: &HandlerNode, source: &SourceFile) -> AppError {
    err.with_context("handler", node.label.clone())
        .with_context("source", source.path().display().to_string())
}

struct TreeBuilder<'a> {
    nodes: Vec<HandlerNode>,
    engine: &'a Arc<ExpressionEngine>,
    resolver: Arc<dyn LoaderResolver>,
    context_dir: &'a Path,
}

impl TreeBuilder<'_> {
    fn add(
        &mut self,
        definition: HandlerDefinition,
        path: String,
        parent_output: &Path,
    ) -> Result<HandlerId, AppError> {
        let label = match &definition.name {
            Some(name) => format!("{}({})", path, name),
            None => path.clone(),
        };
        let output_dir = match &definition.output {
            Some(dir) => parent_output.join(dir),
            None => parent_output.to_path_buf(),
        };
        let configured = |err: AppError| err.with_context("handler", label.clone());

        let condition = Condition::build(definition.condition, self.engine).map_err(configured)?;
        let destination =
            Destination::build(definition.destination, self.engine).map_err(configured)?;

        let mut forks = Vec::with_capacity(definition.forks.len());
        for (index, fork) in definition.forks.into_iter().enumerate() {
            let fork_path = format!("{}.fork[{}]", path, index);
            forks.push(self.add(fork, fork_path, &output_dir)?);
        }

        let chain = TransformChain::new(
            definition.steps,
            Arc::clone(&self.resolver),
            self.context_dir.to_path_buf(),
        );
        self.nodes.push(HandlerNode {
            label,
            condition,
            destination,
            chain,
            forks,
            output_dir,
            data: definition.data,
            query: definition.query,
        });
        Ok(HandlerId(self.nodes.len() - 1))
    }
}
