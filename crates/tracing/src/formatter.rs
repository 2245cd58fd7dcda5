use std::{fmt, fmt::Display, str::FromStr};
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// A boxed tracing [Layer].
pub(crate) type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Output format of a log destination.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human readable lines.
    Terminal,
}

impl LogFormat {
    /// Builds a fmt layer in this format, writing to `file_writer` or stdout.
    ///
    /// `RUST_LOG_STYLE=never` disables colors. Targets are shown when `RUST_LOG_TARGET` is set
    /// to anything but `0`, or by default when the filter enables `DEBUG` or `TRACE`.
    pub(crate) fn apply(
        &self,
        filter: EnvFilter,
        color: Option<String>,
        file_writer: Option<NonBlocking>,
    ) -> BoxedLayer<Registry> {
        let ansi = if let Some(color) = color {
            std::env::var("RUST_LOG_STYLE").map(|val| val != "never").unwrap_or(color != "never")
        } else {
            false
        };
        let target = std::env::var("RUST_LOG_TARGET")
            .map(|val| val != "0")
            .unwrap_or_else(|_| {
                filter.max_level_hint().map_or(true, |max_level| max_level > tracing::Level::INFO)
            });

        match self {
            Self::Json => {
                let layer =
                    tracing_subscriber::fmt::layer().json().with_ansi(ansi).with_target(target);

                if let Some(writer) = file_writer {
                    layer.with_writer(writer).with_filter(filter).boxed()
                } else {
                    layer.with_filter(filter).boxed()
                }
            }
            Self::Terminal => {
                let layer = tracing_subscriber::fmt::layer().with_ansi(ansi).with_target(target);

                if let Some(writer) = file_writer {
                    layer.with_writer(writer).with_filter(filter).boxed()
                } else {
                    layer.with_filter(filter).boxed()
                }
            }
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "terminal" => Ok(Self::Terminal),
            other => Err(eyre::eyre!("unknown log format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_format() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Terminal".parse::<LogFormat>().unwrap(), LogFormat::Terminal);
        assert!("logfmt".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
