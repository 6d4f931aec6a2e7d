//! Tracing subscriber setup for the CLI binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Sets up the [`tracing_subscriber`] registry, honouring `RUST_LOG` when
/// set and falling back to `filter` otherwise.
pub fn initialize(filter: impl Into<EnvFilter>) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
