//! Observability utilities for embedders of the synthesizer.

pub mod logging;

pub use logging::{init_tracing, LogFormat};
