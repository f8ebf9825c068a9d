//! Structured logging.
//!
//! One JSON object per line on stdout. `RUST_LOG` wins over the
//! debug flag when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "rest_api_server=debug,tower_http=debug,info"
    } else {
        "rest_api_server=info,tower_http=info,warn"
    }
}

/// Install the global JSON subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(debug: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stdout),
        )
        .try_init()
}
