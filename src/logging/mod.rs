//! Tracing setup for hosts which do not install a subscriber themselves.
//!
//! The logger only emits `tracing` events. Call [`setup_tracing`] once at startup to print them:
//!
//! ```rust,ignore
//! fn main() -> anyhow::Result<()> {
//!     index_logger::logging::setup_tracing()?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RUST_LOG` | Console log filter (e.g. `info`, `index_logger=debug`) | `info` |
//! | `LOG_FORMAT` | `json` for JSON lines, anything else for plain text | plain |
//!
//! # Output Modes
//!
//! Plain text, suitable for log aggregation:
//! ```text
//! WARN  [log_at{method=GET path=/test}] index_logger::logger: Failed to write log document ...
//! ```
//!
//! JSON lines carry the same information as structured fields.

use anyhow::Context;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

mod production;

const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Console output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

impl LogFormat {
    /// Determines the format from the `LOG_FORMAT` environment variable.
    pub fn from_env() -> Self {
        Self::parse(&env::var(ENV_LOG_FORMAT).unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Plain
        }
    }
}

/// Installs a console subscriber using the format given by `LOG_FORMAT`.
///
/// Fails if a global subscriber has already been installed.
pub fn setup_tracing() -> anyhow::Result<()> {
    setup_tracing_with(LogFormat::from_env())
}

/// Installs a console subscriber using the given format.
pub fn setup_tracing_with(format: LogFormat) -> anyhow::Result<()> {
    Registry::default()
        .with(console_layer(format))
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!(?format, "Tracing initialized successfully");
    Ok(())
}

fn console_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync + 'static> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Plain => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .event_format(production::PlainLogFormat)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_filter(filter)
            .boxed(),
    }
}
