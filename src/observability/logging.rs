//! # Structured Logging
//!
//! Tracing bootstrap for binaries and tests embedding the synthesizer. The
//! library itself only emits `tracing` events; installing a subscriber is the
//! embedder's choice.

use tracing_subscriber::EnvFilter;

use crate::errors::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, falling back to
/// `default_directive`. Fails if a subscriber is already installed.
pub fn init_tracing(default_directive: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| Error::internal(format!("failed to initialize tracing: {err}")))
}
