pub mod args;
pub mod commands;

pub use args::{BuildArgs, PlanArgs, ProjectArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
PIPELINE COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "chainbuild")]
#[command(version = crate::VERSION)]
#[command(about = "Declarative file-to-file build pipeline driven by loader chains")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: plan to check destinations and collisions, then build to write outputs."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Run the pipeline and write every output",
        long_about = "Build walks every source directory, matches handlers, checks that no two outputs share a destination, then runs the loader chains and writes the results.",
        after_help = "Example:\n    chainbuild build --config chainbuild.yaml"
    )]
    Build(BuildArgs),
    #[command(
        about = "Show what a build would write",
        long_about = "Plan performs matching, collision detection and transforms exactly like build but writes nothing.",
        after_help = "Example:\n    chainbuild plan --json"
    )]
    Plan(PlanArgs),
    #[command(
        about = "List the built-in loaders",
        after_help = "Example:\n    chainbuild loaders"
    )]
    Loaders,
}

impl Command {
    /// Project arguments, for commands that load a pipeline document.
    pub fn project(&self) -> Option<&ProjectArgs> {
        match self {
            Command::Build(args) => Some(&args.project),
            Command::Plan(args) => Some(&args.project),
            Command::Loaders => None,
        }
    }
}

/// Dispatch a parsed command; the returned value is the process exit code.
pub async fn run(args: Args) -> crate::Result<u8> {
    match args.command {
        Command::Build(build_args) => commands::build(build_args).await,
        Command::Plan(plan_args) => commands::plan(plan_args).await,
        Command::Loaders => commands::loaders(),
    }
}
