use crate::{
    cli::args::{BuildArgs, PlanArgs, ProjectArgs},
    core::{
        pipeline::{
            self, Configuration, FsSink, FsWalker, LoaderRegistry, RunReport, DEFAULT_DOCUMENT,
        },
        DefaultErrorReporter, ErrorReporter,
    },
    logging, Result,
};
use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Absolute locations of the pipeline document and the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub document: PathBuf,
    pub root: PathBuf,
}

/// Resolve `--config` and `--root` against the current directory.
///
/// Without `--config` the document is `chainbuild.yaml` inside the root; without
/// `--root` the root is the document's directory.
pub fn resolve_project(args: &ProjectArgs) -> Result<ProjectPaths> {
    let cwd = env::current_dir().context("failed to read the current directory")?;
    Ok(resolve_project_from(args, &cwd))
}

fn resolve_project_from(args: &ProjectArgs, cwd: &Path) -> ProjectPaths {
    let absolute = |path: &Path| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        }
    };
    let root = args.root.as_deref().map(absolute);
    let document = match &args.config {
        Some(config) => absolute(config),
        None => root.as_deref().unwrap_or(cwd).join(DEFAULT_DOCUMENT),
    };
    let root = root
        .or_else(|| document.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| cwd.to_path_buf());
    ProjectPaths { document, root }
}

fn load_configuration(args: &ProjectArgs) -> Result<(ProjectPaths, Configuration)> {
    let paths = resolve_project(args)?;
    tracing::debug!(
        document = %paths.document.display(),
        root = %paths.root.display(),
        "loading pipeline"
    );
    let config = Configuration::load(
        &paths.document,
        Some(&paths.root),
        Arc::new(LoaderRegistry::with_builtins()),
    )?;
    Ok((paths, config))
}

/// Source walker that never reads the project's own state or logs.
fn walker(paths: &ProjectPaths) -> FsWalker {
    logging::state_dirs(&paths.root)
        .into_iter()
        .fold(FsWalker::new(), FsWalker::exclude)
}

/// `chainbuild build`: run the pipeline and write every output.
pub async fn build(args: BuildArgs) -> Result<u8> {
    let (paths, config) = load_configuration(&args.project)?;
    let report = pipeline::run(&config, &walker(&paths), &FsSink).await;
    for output in &report.outputs {
        println!("wrote {}", display_relative(&output.destination, &paths.root));
    }
    report_errors(&report, args.project.verbose);
    println!("{}", report.summary());
    Ok(report.exit_code())
}

/// `chainbuild plan`: everything `build` does except writing.
pub async fn plan(args: PlanArgs) -> Result<u8> {
    let (paths, config) = load_configuration(&args.project)?;
    let report = pipeline::plan(&config, &walker(&paths)).await;
    if args.json {
        let rendered = serde_json::to_string_pretty(&report.to_json())
            .context("failed to render plan as JSON")?;
        println!("{}", rendered);
        return Ok(report.exit_code());
    }
    for output in &report.outputs {
        println!(
            "{}  ({} bytes, {})",
            display_relative(&output.destination, &paths.root),
            output.bytes,
            output.origin
        );
    }
    report_errors(&report, args.project.verbose);
    println!("{}", report.summary());
    Ok(report.exit_code())
}

/// `chainbuild loaders`: list the loaders a document can name.
pub fn loaders() -> Result<u8> {
    for name in LoaderRegistry::with_builtins().names() {
        println!("{}", name);
    }
    Ok(0)
}

fn report_errors(report: &RunReport, verbose: bool) {
    let reporter = DefaultErrorReporter::new(verbose);
    for error in &report.errors {
        reporter.report_error(error);
    }
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
