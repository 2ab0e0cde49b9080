//! Process-wide tracing setup
//!
//! `LOG_FORMAT=json` switches to one JSON object per line with the span list
//! flattened in; anything else prints compact text. `RUST_LOG` filters as
//! usual and defaults to `info`, e.g. `RUST_LOG=px_strategy=debug`.
//!
//! Pool handoffs made through an instrumented pool keep the submitter's span,
//! so fields recorded on a span around `Pipeline::process` show up in every
//! log line emitted while that event is dispatched.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }
}

/// Install the global subscriber for `service`.
///
/// Returns false when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_logging(service: &str) -> bool {
    let format = LogFormat::from_env();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok(),
        LogFormat::Text => registry
            .with(fmt::layer().compact().with_thread_names(true).with_target(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(service = service, format = ?format, "Logging initialized");
    }
    installed
}
