use clap::Args;
use std::path::PathBuf;

/// Options shared by every command that loads a pipeline document.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Pipeline document to load (default: chainbuild.yaml in the root)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory that relative paths resolve against (default: the document's directory)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Print the full cause chain of every error
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Emit the plan as JSON on stdout
    #[arg(long)]
    pub json: bool,
}
