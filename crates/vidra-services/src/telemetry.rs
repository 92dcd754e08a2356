//! Tracing initialization for embedding binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber. Production environments log JSON lines
/// for ingestion; everything else gets a compact console format. `RUST_LOG`
/// overrides the default filter.
pub fn init_telemetry(environment: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "vidra=debug".into());

    if environment == "production" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false),
            )
            .init();
    }
}
