use chainbuild::core::pipeline::{
    load_document, Configuration, DocumentFormat, ExpressionEngine, LoaderRegistry,
    PipelineDocument, StepSpec,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const FULL_DOCUMENT: &str = r#"
sourceDirs: [content, assets]
context: loaders
output:
  path: public
  handlers:
    - name: data
      test: { $regex: "\\.ya?ml$" }
      exclude: [content/drafts]
      destination: "{dir}/{stem}.json"
      use: [yaml-to-json]
      fork:
        - output: meta
          destination: { $expr: "default + \".len\"" }
          use: [length]
    - name: text
      include: content
      query: raw
      data: { banner: "// generated" }
      use:
        - { loader: prepend, options: { text: "// generated\n" } }
        - { expr: "content + \"\\n\"", ident: newline }
"#;

fn configuration(doc: &PipelineDocument) -> Configuration {
    Configuration::from_document(
        doc,
        Path::new("/site"),
        Arc::new(LoaderRegistry::with_builtins()),
    )
    .expect("configuration")
}

#[test]
fn full_document_builds_a_handler_tree() {
    let doc = PipelineDocument::parse(FULL_DOCUMENT, DocumentFormat::Yaml).expect("parse");
    assert_eq!(doc.source_dirs.len(), 2);
    assert_eq!(doc.output.handlers[0].fork.len(), 1);
    assert!(matches!(
        &doc.output.handlers[1].steps[1],
        StepSpec::Expr(spec) if spec.ident.as_deref() == Some("newline")
    ));

    let config = configuration(&doc);
    assert_eq!(config.context_dir(), Path::new("/site/loaders"));
    let tree = config.tree();
    assert_eq!(tree.len(), 3);
    let data = tree.roots()[0];
    assert_eq!(tree.label(data), "handlers[0](data)");
    assert_eq!(tree.steps(data), vec!["yaml-to-json"]);
    let fork = tree.forks(data)[0];
    assert_eq!(tree.label(fork), "handlers[0].fork[0]");
    assert_eq!(tree.steps(tree.roots()[1]), vec!["prepend", "newline"]);
}

#[test]
fn json_documents_load_from_disk() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("pipeline.json");
    fs::write(
        &path,
        r#"{"source_dirs": ["src"], "output": {"path": "dist", "handlers": [{"use": ["length"]}]}}"#,
    )
    .expect("write");
    let doc = load_document(&path).expect("load");
    assert_eq!(doc.output.handlers[0].steps.len(), 1);

    let config = Configuration::load(&path, None, Arc::new(LoaderRegistry::with_builtins()))
        .expect("configuration");
    assert_eq!(config.root(), dir.path());
    assert_eq!(config.source_dirs(), &[dir.path().join("src")]);
}

#[test]
fn missing_documents_name_the_path() {
    let err = load_document(Path::new("/definitely/not/here.yaml")).expect_err("missing");
    assert_eq!(err.code, "CB-CFG-001");
    assert!(err.message.contains("/definitely/not/here.yaml"));
}

#[test]
fn unknown_fields_are_parse_errors() {
    let err = PipelineDocument::parse(
        "source_dirs: [src]\noutput:\n  path: dist\n  handlers:\n    - use: [length]\n      destinaton: x\n",
        DocumentFormat::Yaml,
    )
    .expect_err("typo");
    assert_eq!(err.code, "CB-CFG-002");
}

#[test]
fn blank_steps_name_their_position() {
    let err = PipelineDocument::parse(
        "source_dirs: [src]\noutput:\n  path: dist\n  handlers:\n    - fork:\n        - use: [\" \"]\n",
        DocumentFormat::Yaml,
    )
    .expect_err("blank step");
    assert_eq!(err.code, "CB-CFG-003");
    assert!(err.message.contains("handlers[0].fork[0].use[0]"));
}

#[test]
fn bad_destinations_are_reported_with_the_handler() {
    let doc = PipelineDocument::parse(
        "source_dirs: [src]\noutput:\n  path: dist\n  handlers:\n    - use: [length]\n    - destination: 42\n",
        DocumentFormat::Yaml,
    )
    .expect("parse");
    let engine = Arc::new(ExpressionEngine::default());
    let err = doc
        .handler_definitions(Path::new("/site"), &engine)
        .err()
        .expect("bad destination");
    assert_eq!(err.code, "CB-CFG-004");
    assert_eq!(
        err.context.get("handler").map(String::as_str),
        Some("handlers[1]")
    );
}

#[test]
fn unknown_placeholders_fail_configuration() {
    let doc = PipelineDocument::parse(
        "source_dirs: [src]\noutput:\n  path: dist\n  handlers:\n    - destination: \"{basename}.json\"\n",
        DocumentFormat::Yaml,
    )
    .expect("parse");
    let err = Configuration::from_document(
        &doc,
        Path::new("/site"),
        Arc::new(LoaderRegistry::with_builtins()),
    )
    .expect_err("placeholder");
    assert_eq!(err.code, "CB-CFG-004");
}

#[test]
fn unknown_loaders_surface_when_the_chain_runs_not_at_load() {
    let doc = PipelineDocument::parse(
        "source_dirs: [src]\noutput:\n  path: dist\n  handlers:\n    - use: [no-such-loader]\n",
        DocumentFormat::Yaml,
    )
    .expect("parse");
    let config = configuration(&doc);
    assert_eq!(config.tree().steps(config.tree().roots()[0]), vec!["no-such-loader"]);
}
