//! Logging initialization.
//!
//! Structured logging via `tracing`; the filter comes from `RUST_LOG` with a
//! sensible default, and output can switch to JSON for log shippers.

use tracing_subscriber::EnvFilter;

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// JSON lines.
    Json,
}

impl LogFormat {
    /// Parses a format token, defaulting to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Initializes the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `polystore=info`. `verbose` lowers
/// the crate default to debug. Calling twice is a no-op (the second
/// `try_init` fails quietly), which keeps tests safe.
pub fn init(format: LogFormat, verbose: bool) {
    let default_filter = if verbose {
        "polystore=debug"
    } else {
        "polystore=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Text);
    }
}
