//! # Meshplane
//!
//! Meshplane is the listener configuration synthesizer of a service-mesh
//! control plane: given a proxy's identity and scope, a registry snapshot,
//! mesh-wide policy, virtual-service rules and quota bindings, it computes
//! the exact set of Envoy listeners (bind address, port, filter chains) the
//! proxy's data plane must install.
//!
//! ## Architecture
//!
//! Data flows one direction through the `xds` module:
//!
//! ```text
//! registry snapshot + scope -> per-port candidate sets -> chain construction
//!     -> conflict resolution / merge -> finished listener set
//! ```
//!
//! No component mutates its inputs; each step returns new structures. The
//! computation is pure and single-threaded — parallelism, if any, lives in
//! the caller across independent proxies.
//!
//! ## Example Usage
//!
//! ```rust
//! use meshplane::config::MeshConfig;
//! use meshplane::model::{Proxy, Registry};
//! use meshplane::ListenerBuilder;
//!
//! let proxy: Proxy = serde_json::from_str(
//!     r#"{"id": "sidecar~1.1.1.1", "ip_addresses": ["1.1.1.1"]}"#,
//! )
//! .unwrap();
//! let registry = Registry::default();
//! let mesh = MeshConfig::default();
//!
//! let synthesis = ListenerBuilder::new(&proxy, &registry, &mesh).build();
//! assert!(!synthesis.listeners.is_empty());
//! ```

pub mod config;
pub mod errors;
pub mod model;
pub mod observability;
pub mod xds;

// Re-export commonly used types and traits
pub use config::MeshConfig;
pub use errors::{Error, Result};
pub use xds::builder::{ListenerBuilder, Synthesis};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
