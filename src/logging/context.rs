use crate::cli::Command;
use crate::logging::layers::console::ConsoleStyle;
use std::env;

/// Whether a command may write log lines to the terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleMode {
    Interactive,
    /// stdout is consumed by another program, or `CHAINBUILD_QUIET=1` is set.
    Quiet,
}

impl ConsoleMode {
    /// Console style after applying the mode to the configured one.
    pub fn style(self, configured: ConsoleStyle) -> ConsoleStyle {
        match self {
            ConsoleMode::Interactive => configured,
            ConsoleMode::Quiet => ConsoleStyle::Off,
        }
    }
}

pub fn console_mode(command: &Command) -> ConsoleMode {
    let machine_output = matches!(command, Command::Plan(args) if args.json);
    if machine_output || quiet_requested() {
        ConsoleMode::Quiet
    } else {
        ConsoleMode::Interactive
    }
}

fn quiet_requested() -> bool {
    env::var("CHAINBUILD_QUIET")
        .map(|value| value.trim() == "1")
        .unwrap_or(false)
}
