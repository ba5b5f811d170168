//! Telemetry initialization: tracing and structured logging
//!
//! The crate emits `tracing` events and `metrics` counters throughout; this
//! module gives embedding binaries a one-call subscriber setup. Installing a
//! metrics recorder/exporter is left to the host application.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to info-level output for this crate. Pass
/// `json = true` for one-line-per-event JSON logs (container deployments).
pub fn init(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "certhub_mailer=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let fmt_layer = tracing_subscriber::fmt::layer().json().flatten_event(true);
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        registry.with(fmt_layer).init();
    }
}
