//! Shared tracing/logging initialization.
//!
//! The relay is silent in normal operation (default filter `warn`); the
//! `--verbose` switch lowers the default to `debug`, which enables the
//! registry/channel state dumps around each dispatch batch. `RUST_LOG`
//! always wins when set.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `verbose` -- default the filter to `debug` instead of `warn`.
/// * `log_json` -- when `true`, emit structured JSON log lines instead of
///   the human-readable format.
pub fn init_tracing(verbose: bool, log_json: bool) {
    let default_filter = if verbose {
        "fdrelay=debug,fdrelay_core=debug"
    } else {
        "fdrelay=warn,fdrelay_core=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
