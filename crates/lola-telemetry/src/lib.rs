//! Structured logging bootstrap for the LoLa binding.
//!
//! A skeleton/proxy process links `lola-core` directly (no sidecar, no
//! network span exporter) so the only ambient concern here is getting
//! `tracing` wired up consistently across binaries that embed the binding.

pub mod logging;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with default configuration (INFO, JSON).
pub fn init() {
    init_with_level(Level::INFO);
}

/// Initialize logging with a specific level, honouring `RUST_LOG` if set.
pub fn init_with_level(level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!("lola telemetry initialized");
}
