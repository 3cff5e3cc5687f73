//! Log output for the jamfarm binaries.
//!
//! Everything goes to stderr; stdout is reserved for rendered status so it
//! can be piped into status bars or web pages. `RUST_LOG` overrides the
//! configured level unless an explicit directive is set.
//!
//! ```ignore
//! use jamfarm_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli()).expect("failed to initialize tracing");
//! ```

use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    prelude::*,
    registry::LookupSpan,
    util::TryInitError,
};

/// Crates whose events are shown at the configured level.
const CRATES: [&str; 4] = ["jamfarm", "jamfarm_client", "jamfarm_protocol", "jamfarm_core"];

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),

    /// The filter directive does not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// Line format of log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, human-oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// How logging is set up.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for jamfarm crates when no directive or `RUST_LOG` is given.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Show file and line.
    pub location: bool,
    /// Show the module path.
    pub target: bool,
    pub timestamp: bool,
    /// Log span open/close.
    pub span_events: bool,
    /// Explicit filter directive; wins over `RUST_LOG`.
    pub directive: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::cli()
    }
}

impl TracingConfig {
    /// Warnings only, terse.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            level: Level::WARN,
            format: TracingOutputFormat::Compact,
            location: false,
            target: false,
            timestamp: false,
            span_events: false,
            directive: None,
        }
    }

    /// Debug level with locations, for `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            location: true,
            target: true,
            ..Self::cli()
        }
    }

    /// Structured JSON lines.
    #[must_use]
    pub fn json() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Json,
            location: true,
            target: true,
            timestamp: true,
            span_events: true,
            directive: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Directive used when neither `directive` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match self.directive {
            Some(ref directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    fn layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_file(self.location)
            .with_line_number(self.location)
            .with_target(self.target)
            .with_span_events(spans);

        match (self.format, self.timestamp) {
            (TracingOutputFormat::Pretty, _) => base.pretty().boxed(),
            (TracingOutputFormat::Json, _) => base.json().boxed(),
            (TracingOutputFormat::Compact, true) => base.compact().boxed(),
            (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
        }
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the directive is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    tracing_subscriber::registry()
        .with(filter)
        .with(config.layer())
        .try_init()?;
    Ok(())
}
