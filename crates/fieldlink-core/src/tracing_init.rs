//! Shared tracing/logging initialization.
//!
//! The edge daemon and the central server both log through `tracing` with an
//! env-filter and optional JSON output for log shipping from field nodes.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the default filter directive for a binary, e.g.
/// `fieldlink_daemon=info,fieldlink_core=info,tower_http=info`.
pub fn default_filter(crate_name: &str, level: &str) -> String {
    format!("{crate_name}={level},fieldlink_core={level},tower_http={level}")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- used when `RUST_LOG` is not set.
/// * `log_json` -- emit structured JSON lines instead of the human format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}
