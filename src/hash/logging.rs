// Tracing setup for the scanner binary
// The library only emits events; installing a subscriber is the caller's choice

use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Map a `-v` count to a default filter directive
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(verbosity)))
}

/// Install a human-readable subscriber writing to stderr
///
/// `RUST_LOG` overrides the verbosity. Later calls are ignored.
pub fn init_tracing(verbosity: u8) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        tracing_subscriber::registry()
            .with(env_filter(verbosity))
            .with(fmt_layer)
            .init();
    });
}

/// Install a JSON subscriber writing to stderr
pub fn init_tracing_json(verbosity: u8) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true);

        tracing_subscriber::registry()
            .with(env_filter(verbosity))
            .with(fmt_layer)
            .init();
    });
}
