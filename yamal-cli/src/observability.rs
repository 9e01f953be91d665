//! Tracing subscriber setup with format selection.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use anyhow::{Context, Result};
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON, one object per line.
    Json,
    /// Multi-line human-readable format.
    Pretty,
    /// Single-line format.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        })
    }
}

/// Logging settings derived from the command line.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive, e.g. `warn` or `yamal_core=debug`.
    pub filter: String,
}

impl LoggingConfig {
    /// Map `-v` repetitions to a default filter. `RUST_LOG` wins when set.
    pub fn from_verbosity(verbosity: u8, format: LogFormat) -> Self {
        let level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            format,
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        }
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_thread_names(true),
            )
            .try_init(),
    }
    .context("Failed to initialize tracing subscriber")
}
