//! # Mesh Policy Configuration
//!
//! Mesh-wide policy consumed by the listener synthesizer. A [`MeshConfig`] is
//! an immutable snapshot: callers load or watch it elsewhere and pass one
//! consistent reference per computation. The synthesizer never caches derived
//! state between pushes, so a policy change (e.g. a new access-log format) is
//! reflected on the next computation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default port of the virtual catch-all outbound listener.
pub const DEFAULT_VIRTUAL_OUTBOUND_PORT: u16 = 15001;

/// Default timeout for protocol-detection listener filters.
pub const DEFAULT_PROTOCOL_DETECTION_TIMEOUT_MS: u64 = 5_000;

/// What to do with outbound traffic that matches no known service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutboundTrafficPolicy {
    /// Forward unmatched traffic to the pass-through cluster.
    #[default]
    AllowAny,
    /// Send unmatched traffic to the black-hole cluster.
    RegistryOnly,
}

/// Mesh-wide policy snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Access log sink path; empty disables access logging.
    #[serde(default)]
    pub access_log_file: String,

    /// Optional text format for access log entries. `None` defers to the
    /// data-plane default format.
    #[serde(default)]
    pub access_log_format: Option<String>,

    /// Whether HTTP connection managers carry a tracing configuration.
    #[serde(default)]
    pub enable_tracing: bool,

    /// Tracing defaults applied to every HTTP chain when tracing is enabled.
    #[serde(default)]
    pub tracing: TracingDefaults,

    /// Default treatment of traffic to unknown destinations.
    #[serde(default)]
    pub outbound_traffic_policy: OutboundTrafficPolicy,

    /// Trust the downstream remote address on outbound HTTP chains.
    #[serde(default)]
    pub use_remote_address: bool,

    /// Enable protocol sniffing for outbound listeners whose port protocol is
    /// unset or unrecognized.
    #[serde(default = "default_true")]
    pub protocol_sniffing_outbound: bool,

    /// Enable protocol sniffing for inbound listeners.
    #[serde(default = "default_true")]
    pub protocol_sniffing_inbound: bool,

    /// Timeout for inspector listener filters when sniffing is active.
    #[serde(default = "default_detection_timeout")]
    pub protocol_detection_timeout_ms: u64,

    /// Port of the explicit HTTP proxy listener; `None` disables it.
    #[serde(default)]
    pub proxy_http_port: Option<u16>,

    /// Port of the virtual catch-all outbound listener.
    #[serde(default = "default_virtual_outbound_port")]
    pub virtual_outbound_port: u16,

    /// Cluster name of the RPC rate-limit service. When unset, no rate-limit
    /// filter is attached even if a quota binding resolves.
    #[serde(default)]
    pub rpc_rate_limit_service: Option<String>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            access_log_file: String::new(),
            access_log_format: None,
            enable_tracing: false,
            tracing: TracingDefaults::default(),
            outbound_traffic_policy: OutboundTrafficPolicy::AllowAny,
            use_remote_address: false,
            protocol_sniffing_outbound: true,
            protocol_sniffing_inbound: true,
            protocol_detection_timeout_ms: DEFAULT_PROTOCOL_DETECTION_TIMEOUT_MS,
            proxy_http_port: None,
            virtual_outbound_port: DEFAULT_VIRTUAL_OUTBOUND_PORT,
            rpc_rate_limit_service: None,
        }
    }
}

/// Tracing defaults for HTTP connection managers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingDefaults {
    /// Explicit random-sampling override in percent; `0.0` means unset.
    #[serde(default)]
    pub sampling: f64,

    /// Fallback random-sampling percentage used when no explicit override is
    /// configured.
    #[serde(default = "default_sampling")]
    pub default_sampling: f64,

    /// Client sampling percentage; defaults to 100 when unset.
    #[serde(default)]
    pub client_sampling: Option<f64>,

    /// Overall sampling percentage; defaults to 100 when unset.
    #[serde(default)]
    pub overall_sampling: Option<f64>,

    /// Custom span tags, keyed by tag name. Emitted sorted by name so the
    /// generated config is independent of map iteration order.
    #[serde(default)]
    pub custom_tags: HashMap<String, CustomTagSpec>,

    /// Maximum length of the request-path tag. `None` defers to the
    /// data-plane default.
    #[serde(default)]
    pub max_path_tag_length: Option<u32>,
}

impl Default for TracingDefaults {
    fn default() -> Self {
        Self {
            sampling: 0.0,
            default_sampling: default_sampling(),
            client_sampling: None,
            overall_sampling: None,
            custom_tags: HashMap::new(),
            max_path_tag_length: None,
        }
    }
}

impl TracingDefaults {
    /// Effective random-sampling percentage, clamped to `[0, 100]`.
    pub fn random_sampling(&self) -> f64 {
        let value = if self.sampling != 0.0 { self.sampling } else { self.default_sampling };
        value.clamp(0.0, 100.0)
    }
}

/// One custom trace tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomTagSpec {
    /// Fixed literal value.
    Literal { value: String },
    /// Value read from an environment variable on the data plane.
    Environment { name: String, default_value: String },
    /// Value read from a request header.
    RequestHeader { name: String, default_value: String },
}

fn default_true() -> bool {
    true
}

fn default_sampling() -> f64 {
    100.0
}

fn default_detection_timeout() -> u64 {
    DEFAULT_PROTOCOL_DETECTION_TIMEOUT_MS
}

fn default_virtual_outbound_port() -> u16 {
    DEFAULT_VIRTUAL_OUTBOUND_PORT
}
