//! Structured tracing helpers.
//!
//! The filter is taken from `RUST_LOG` when set, otherwise from the directive
//! the caller passes (for example `"info"` or `"agent_kernel=debug,info"`).
//! Events are written to stderr so that program output on stdout stays clean.

use tracing_subscriber::EnvFilter;

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The fallback directive could not be parsed.
    #[error("invalid log directive `{directive}`: {reason}")]
    InvalidDirective {
        /// Directive as supplied.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already initialised: {reason}")]
    AlreadyInitialized {
        /// Message from `tracing-subscriber`.
        reason: String,
    },
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// Compact output without span context.
    Compact,
}

/// Installs the global subscriber with [`LogFormat::Pretty`].
///
/// # Errors
///
/// See [`init_with`].
pub fn init(default_directive: &str) -> TelemetryResult<()> {
    init_with(default_directive, LogFormat::Pretty)
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidDirective`] when `RUST_LOG` is unset and
/// `default_directive` does not parse, and
/// [`TelemetryError::AlreadyInitialized`] when called twice.
pub fn init_with(default_directive: &str, format: LogFormat) -> TelemetryResult<()> {
    let filter = build_filter(default_directive)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|err| TelemetryError::AlreadyInitialized {
        reason: err.to_string(),
    })
}

fn build_filter(default_directive: &str) -> TelemetryResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    parse_directive(default_directive)
}

fn parse_directive(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidDirective {
        directive: directive.to_owned(),
        reason: err.to_string(),
    })
}
