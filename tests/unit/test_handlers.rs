use chainbuild::core::pipeline::{
    predicate_fn, ConditionSpec, DestinationSpec, ExpressionEngine, HandlerDefinition,
    HandlerTree, Loader, LoaderRegistry, OutputGenerator, OutputTarget, Payload, SourceFile,
    StepContext, StepOutcome, TransformCache, TransformStep,
};
use chainbuild::core::{AppError, ErrorCategory};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingLoader {
    calls: Arc<AtomicUsize>,
}

impl Loader for CountingLoader {
    fn name(&self) -> &str {
        "count"
    }

    fn run(&self, input: Payload, _ctx: StepContext) -> Result<StepOutcome, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input.into())
    }
}

struct FailingLoader;

impl Loader for FailingLoader {
    fn name(&self) -> &str {
        "fail"
    }

    fn run(&self, _input: Payload, _ctx: StepContext) -> Result<StepOutcome, AppError> {
        Err(AppError::new(ErrorCategory::TransformError, "refused").with_code("TEST-FAIL"))
    }
}

fn tree(definitions: Vec<HandlerDefinition>) -> Arc<HandlerTree> {
    let engine = Arc::new(ExpressionEngine::default());
    HandlerTree::build(
        definitions,
        Path::new("/out"),
        &engine,
        Arc::new(LoaderRegistry::with_builtins()),
        Path::new("/project"),
    )
    .ok()
    .expect("tree builds")
}

async fn outputs_in(
    tree: &Arc<HandlerTree>,
    cache: &Arc<TransformCache>,
    relative: &str,
    content: &str,
) -> Vec<OutputGenerator> {
    let source = Arc::new(SourceFile::with_content("/src", relative, content));
    let input = chainbuild::core::pipeline::handler::source_payload(Arc::clone(&source));
    tree.outputs_for_source(source, input, Arc::clone(cache))
        .await
        .expect("outputs")
}

async fn outputs(tree: &Arc<HandlerTree>, relative: &str, content: &str) -> Vec<OutputGenerator> {
    outputs_in(tree, &Arc::new(TransformCache::default()), relative, content).await
}

fn text(payload: &Payload) -> String {
    String::from_utf8(payload.content.as_bytes().to_vec()).expect("utf8")
}

#[tokio::test]
async fn parent_chain_runs_once_for_all_forks() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counting = Arc::new(CountingLoader {
        calls: Arc::clone(&calls),
    });
    let tree = tree(vec![HandlerDefinition::new()
        .step(TransformStep::direct(counting))
        .fork(
            HandlerDefinition::new()
                .destination(DestinationSpec::Template("{default}.upper".into()))
                .step(TransformStep::named("uppercase")),
        )
        .fork(
            HandlerDefinition::new()
                .destination(DestinationSpec::Template("{default}.len".into()))
                .step(TransformStep::named("length")),
        )]);

    let cache = Arc::new(TransformCache::default());
    let outputs = outputs_in(&tree, &cache, "a.txt", "hello").await;
    assert_eq!(outputs.len(), 3);
    let contents = join_all(outputs.iter().map(|output| output.content())).await;
    let contents: Vec<String> = contents
        .iter()
        .map(|result| text(result.as_ref().expect("content")))
        .collect();
    assert_eq!(contents, vec!["hello", "HELLO", "5"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 3);
    assert_eq!(outputs[2].destination(), Some(Path::new("/out/a.txt.len")));
}

#[tokio::test]
async fn forks_are_not_visited_when_the_parent_does_not_match() {
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&probes);
    let probe = predicate_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    });
    let tree = tree(vec![HandlerDefinition::new()
        .when(ConditionSpec::Literal(false))
        .fork(HandlerDefinition::new().when(ConditionSpec::Predicate(probe)))]);

    let cache = Arc::new(TransformCache::default());
    let outputs = outputs_in(&tree, &cache, "a.txt", "hello").await;
    assert!(outputs.is_empty());
    assert_eq!(probes.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn falsy_destinations_still_feed_forks() {
    let tree = tree(vec![HandlerDefinition::new()
        .destination(DestinationSpec::Never)
        .step(TransformStep::named("uppercase"))
        .fork(HandlerDefinition::new().output("copies"))]);

    let outputs = outputs(&tree, "docs/a.txt", "quiet").await;
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].target(), &OutputTarget::Discard);
    assert_eq!(
        outputs[1].target(),
        &OutputTarget::File(PathBuf::from("/out/copies/docs/a.txt"))
    );
    let fork = outputs[1].content().await.expect("fork content");
    assert_eq!(text(&fork), "QUIET");
}

#[tokio::test]
async fn parent_failures_reach_every_dependent_output() {
    let tree = tree(vec![HandlerDefinition::new()
        .named("broken")
        .step(TransformStep::direct(Arc::new(FailingLoader)))
        .fork(HandlerDefinition::new().step(TransformStep::named("length")))]);

    let outputs = outputs(&tree, "a.txt", "x").await;
    assert_eq!(outputs.len(), 2);
    for output in &outputs {
        let err = output.content().await.expect_err("parent failed");
        assert_eq!(err.code, "CB-OUT-002");
        assert_eq!(err.root_code(), "TEST-FAIL");
    }
    assert_eq!(tree.label(tree.roots()[0]), "handlers[0](broken)");
}

#[tokio::test]
async fn siblings_share_nothing_but_the_source() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counting: Arc<dyn Loader> = Arc::new(CountingLoader {
        calls: Arc::clone(&calls),
    });
    let tree = tree(vec![
        HandlerDefinition::new()
            .destination(DestinationSpec::Template("{default}.one".into()))
            .step(TransformStep::direct(Arc::clone(&counting))),
        HandlerDefinition::new()
            .destination(DestinationSpec::Template("{default}.two".into()))
            .step(TransformStep::direct(counting)),
    ]);

    let outputs = outputs(&tree, "a.txt", "x").await;
    for output in &outputs {
        output.content().await.expect("content");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
