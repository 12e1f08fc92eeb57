use async_trait::async_trait;
use chainbuild::core::pipeline::{
    self, ConditionSpec, Configuration, DestinationSpec, FsSink, FsWalker, HandlerDefinition,
    SourceWalker, TransformStep,
};
use chainbuild::core::{AppError, RunStatus};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Lists one file that is not on disk, so reading it fails.
struct VanishedFile;

#[async_trait]
impl SourceWalker for VanishedFile {
    async fn walk(&self, _root: &Path) -> Result<Vec<PathBuf>, AppError> {
        Ok(vec![PathBuf::from("gone.yaml")])
    }
}

fn project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("src")).expect("mkdir");
    fs::write(dir.path().join("src/a.yaml"), "k: v\n").expect("write");
    dir
}

fn yaml_handler() -> HandlerDefinition {
    HandlerDefinition::new()
        .when(ConditionSpec::Pattern(r"\.yaml$".into()))
        .step(TransformStep::named("yaml-to-json"))
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).expect("output exists")
}

#[tokio::test]
async fn yaml_is_converted_in_place() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(yaml_handler())
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert_eq!(report.status, RunStatus::Succeeded, "{:?}", report.errors);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.sources, 1);
    assert_eq!(read(dir.path(), "dist/a.yaml"), r#"{"k":"v"}"#);
}

#[tokio::test]
async fn renamed_output_and_fork_measure_the_json() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(
            yaml_handler()
                .destination(DestinationSpec::Template("{default}.json".into()))
                .fork(
                    HandlerDefinition::new()
                        .destination(DestinationSpec::Template("{default}.len".into()))
                        .step(TransformStep::named("length")),
                ),
        )
        .handler(HandlerDefinition::new().when(ConditionSpec::Pattern(r"\.yaml$".into())))
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.outputs.len(), 3);
    assert_eq!(read(dir.path(), "dist/a.yaml.json"), r#"{"k":"v"}"#);
    assert_eq!(read(dir.path(), "dist/a.yaml.len"), "9");
    assert_eq!(read(dir.path(), "dist/a.yaml"), "k: v\n");
}

#[tokio::test]
async fn colliding_handlers_write_nothing() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(yaml_handler())
        .handler(yaml_handler().named("again"))
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert_eq!(report.status, RunStatus::Collided);
    assert_ne!(report.exit_code(), 0);
    assert_eq!(report.collisions.len(), 1);
    assert!(report.collisions[0].destination.ends_with("dist/a.yaml"));
    assert_eq!(report.errors[0].code, "CB-COLL-001");
    assert!(report.errors[0].message.contains("a.yaml"));
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn a_failing_transform_does_not_stop_other_outputs() {
    let dir = project();
    fs::write(dir.path().join("src/b.yaml"), "k: [unclosed\n").expect("write");
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(yaml_handler())
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].root_code(), "CB-STEP-006");
    assert_eq!(read(dir.path(), "dist/a.yaml"), r#"{"k":"v"}"#);
    assert!(!dir.path().join("dist/b.yaml").exists());
}

#[tokio::test]
async fn discarded_outputs_are_counted_not_written() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(
            yaml_handler()
                .destination(DestinationSpec::Never)
                .fork(HandlerDefinition::new().output("json")),
        )
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.discarded, 1);
    assert_eq!(read(dir.path(), "dist/json/a.yaml"), r#"{"k":"v"}"#);
    assert!(!dir.path().join("dist/a.yaml").exists());
}

#[tokio::test]
async fn plan_runs_transforms_without_writing() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(yaml_handler())
        .build()
        .expect("configuration");

    let report = pipeline::plan(&config, &FsWalker::new()).await;
    assert!(report.is_success());
    assert_eq!(report.outputs.len(), 1);
    assert_eq!(report.outputs[0].bytes, 9);
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn dotted_destinations_still_collide() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(yaml_handler())
        .handler(
            HandlerDefinition::new()
                .destination(DestinationSpec::Template("sub/../{relative}".into()))
                .step(TransformStep::named("length")),
        )
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert_eq!(report.status, RunStatus::Collided);
    assert_eq!(report.collisions.len(), 1);
    assert_eq!(report.collisions[0].destination, dir.path().join("dist/a.yaml"));
    assert_eq!(report.collisions[0].origins.len(), 2);
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn a_failing_condition_skips_only_its_source() {
    let dir = project();
    fs::write(dir.path().join("src/ok.yaml"), "k: w\n").expect("write");
    // 1 / 0 for the six-character "a.yaml" only.
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(
            HandlerDefinition::new()
                .when(ConditionSpec::Expr("1 / (relative.len() - 6) > 0".into()))
                .step(TransformStep::named("yaml-to-json")),
        )
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &FsWalker::new(), &FsSink).await;
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.sources, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "CB-COND-002");
    assert!(report.errors[0].context["source"].ends_with("a.yaml"));
    assert_eq!(read(dir.path(), "dist/ok.yaml"), r#"{"k":"w"}"#);
    assert!(!dir.path().join("dist/a.yaml").exists());
}

#[tokio::test]
async fn an_unreadable_source_is_reported_once() {
    let dir = project();
    let config = Configuration::builder(dir.path())
        .source_dir("src")
        .output("dist")
        .handler(
            HandlerDefinition::new()
                .fork(HandlerDefinition::new().output("copy"))
                .fork(HandlerDefinition::new().output("len").step(TransformStep::named("length"))),
        )
        .build()
        .expect("configuration");

    let report = pipeline::run(&config, &VanishedFile, &FsSink).await;
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.outputs.is_empty());
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].root_code(), "CB-SRC-001");
    assert_eq!(report.errors[0].context["affected_outputs"], "3");
}
