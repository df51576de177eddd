use crate::layers::BoxedLayer;
use clap::ValueEnum;
use std::fmt;
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Represents the logging format of a layer.
#[derive(Debug, Copy, Clone, ValueEnum, Eq, PartialEq)]
pub enum LogFormat {
    /// One JSON object per record, for log shippers.
    Json,
    /// `key=value` records.
    #[value(name = "logfmt")]
    LogFmt,
    /// Human readable output.
    Terminal,
}

impl LogFormat {
    /// Builds a layer in this format, filtered by `filter`.
    ///
    /// Records go to stdout unless a `file_writer` is given. `color` is only honoured for
    /// stdout layers and can be overridden with `RUST_LOG_STYLE=never`.
    pub fn apply(
        &self,
        filter: EnvFilter,
        color: Option<String>,
        file_writer: Option<NonBlocking>,
    ) -> BoxedLayer<Registry> {
        let ansi = file_writer.is_none() && use_ansi(color.as_deref());
        let target = show_target(&filter);

        match (self, file_writer) {
            (Self::LogFmt, _) => tracing_logfmt::layer().with_filter(filter).boxed(),
            (Self::Json, Some(writer)) => tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(target)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            (Self::Json, None) => tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(ansi)
                .with_target(target)
                .with_filter(filter)
                .boxed(),
            (Self::Terminal, Some(writer)) => tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(target)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            (Self::Terminal, None) => tracing_subscriber::fmt::layer()
                .with_ansi(ansi)
                .with_target(target)
                .with_filter(filter)
                .boxed(),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "json",
            Self::LogFmt => "logfmt",
            Self::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

fn use_ansi(color: Option<&str>) -> bool {
    let Some(color) = color else { return false };
    std::env::var("RUST_LOG_STYLE").map(|val| val != "never").unwrap_or(color != "never")
}

/// `RUST_LOG_TARGET` wins; otherwise targets are shown once DEBUG or TRACE is enabled.
fn show_target(filter: &EnvFilter) -> bool {
    std::env::var("RUST_LOG_TARGET").map(|val| val != "0").unwrap_or_else(|_| {
        filter.max_level_hint().map_or(true, |max_level| max_level > tracing::Level::INFO)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_value_names() {
        for format in LogFormat::value_variants() {
            let parsed = LogFormat::from_str(&format.to_string(), true).unwrap();
            assert_eq!(&parsed, format);
        }
    }

    #[test]
    fn no_color_without_setting() {
        assert!(!use_ansi(None));
    }
}
