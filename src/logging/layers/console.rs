use crate::logging::layers::BoxedLayer;
use serde::Deserialize;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::Layer;

/// Console rendering. Logs always go to stderr; stdout carries command output.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStyle {
    /// Level and message only.
    #[default]
    Compact,
    /// Timestamps, levels, targets and span fields.
    Full,
    Off,
}

pub fn console_layer(style: ConsoleStyle, writer: BoxMakeWriter) -> Option<BoxedLayer> {
    match style {
        ConsoleStyle::Off => None,
        ConsoleStyle::Compact => Some(
            fmt::layer()
                .compact()
                .without_time()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        ),
        ConsoleStyle::Full => Some(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn off_builds_no_layer() {
        assert!(console_layer(ConsoleStyle::Off, BoxMakeWriter::new(io::sink)).is_none());
        assert!(console_layer(ConsoleStyle::Compact, BoxMakeWriter::new(io::sink)).is_some());
    }

    #[test]
    fn styles_parse_from_lowercase_names() {
        #[derive(Deserialize)]
        struct Probe {
            console: ConsoleStyle,
        }
        let probe: Probe = toml::from_str("console = \"full\"").expect("parse");
        assert_eq!(probe.console, ConsoleStyle::Full);
        assert!(toml::from_str::<Probe>("console = \"stdout\"").is_err());
    }
}
