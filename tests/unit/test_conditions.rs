use chainbuild::core::pipeline::{
    predicate_fn, Condition, ConditionSpec, ExpressionEngine, HandlerContext, SourceFile,
};
use chainbuild::core::ErrorCategory;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn context(relative: &str) -> HandlerContext {
    let source = Arc::new(SourceFile::with_content("/project/src", relative, ""));
    HandlerContext::new(source, PathBuf::from("/project/dist"), "handlers[0]")
}

fn build(spec: ConditionSpec) -> Arc<Condition> {
    let engine = Arc::new(ExpressionEngine::default());
    Condition::build(spec, &engine).ok().expect("condition builds")
}

#[tokio::test]
async fn relative_prefixes_are_anchored_at_the_root() {
    let spec = ConditionSpec::from_value(&json!("src/pages"), Path::new("/project"))
        .expect("spec");
    let condition = build(spec);

    let inside = context("pages/index.md");
    assert!(condition
        .evaluate(inside.source.path(), &inside)
        .await
        .expect("evaluate"));

    let outside = context("posts/index.md");
    assert!(!condition
        .evaluate(outside.source.path(), &outside)
        .await
        .expect("evaluate"));
}

#[tokio::test]
async fn expressions_see_handler_data_and_query() {
    let condition = build(ConditionSpec::Expr(
        "data.kind == \"page\" && query == \"raw\" && relative.ends_with(\".md\")".into(),
    ));
    let ctx = context("index.md")
        .with_data(json!({"kind": "page"}))
        .with_query(Some("raw".into()));
    assert!(condition
        .evaluate(ctx.source.path(), &ctx)
        .await
        .expect("evaluate"));

    let other = context("index.md").with_data(json!({"kind": "post"}));
    assert!(!condition
        .evaluate(other.source.path(), &other)
        .await
        .expect("evaluate"));
}

#[tokio::test]
async fn expression_runtime_failures_are_evaluation_errors() {
    let condition = build(ConditionSpec::Expr("missing_variable == 1".into()));
    let ctx = context("a.md");
    let err = condition
        .evaluate(ctx.source.path(), &ctx)
        .await
        .expect_err("unknown variable");
    assert_eq!(err.code, "CB-COND-002");
    assert_eq!(err.category, ErrorCategory::EvaluationError);
}

#[test]
fn expression_syntax_errors_surface_at_build_time() {
    let engine = Arc::new(ExpressionEngine::default());
    let err = Condition::build(ConditionSpec::Expr("(((".into()), &engine)
        .err()
        .expect("syntax error");
    assert_eq!(err.code, "CB-EXPR-001");
}

#[tokio::test]
async fn predicates_receive_the_absolute_path_and_context() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let predicate = predicate_fn(move |path, ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(path.is_absolute() && ctx.relative_path() == Path::new("nested/a.txt"))
    });
    let condition = build(ConditionSpec::Predicate(predicate));
    let ctx = context("nested/a.txt");
    assert!(condition
        .evaluate(ctx.source.path(), &ctx)
        .await
        .expect("evaluate"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exclude_short_circuits_before_later_entries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let probe = predicate_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    });
    let condition = build(ConditionSpec::Object(
        chainbuild::core::pipeline::ConditionObject {
            test: None,
            include: vec![ConditionSpec::Literal(false)],
            exclude: vec![ConditionSpec::Predicate(probe)],
        },
    ));
    let ctx = context("a.txt");
    assert!(!condition
        .evaluate(ctx.source.path(), &ctx)
        .await
        .expect("evaluate"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn strict_can_be_disabled_but_must_be_boolean() {
    assert!(
        ConditionSpec::from_value(&json!({"strict": false, "note": "x"}), Path::new("/")).is_ok()
    );
    let err = ConditionSpec::from_value(&json!({"strict": "no"}), Path::new("/"))
        .expect_err("non-boolean strict");
    assert_eq!(err.code, "CB-COND-001");
}
