use chainbuild::cli::{self, commands, Args};
use chainbuild::core::{AppError, DefaultErrorReporter, ErrorReporter};
use chainbuild::logging;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let verbose = args
        .command
        .project()
        .map(|project| project.verbose)
        .unwrap_or(false);
    let root = args
        .command
        .project()
        .and_then(|project| commands::resolve_project(project).ok())
        .map(|paths| paths.root);
    let _logging = match logging::init(&args.command, root.as_deref()) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("[WARNING] logging disabled: {:#}", err);
            None
        }
    };

    match cli::run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            let reporter = DefaultErrorReporter::new(verbose);
            match err.downcast_ref::<AppError>() {
                Some(app_error) => reporter.report_error(app_error),
                None => eprintln!("[ERROR] {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}
