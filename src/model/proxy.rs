//! Proxy identity and address-family discovery.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::scope::Scope;
use super::service::ServiceInstance;

/// IPv4 wildcard / loopback bind addresses.
pub const WILDCARD_ADDRESS: &str = "0.0.0.0";
pub const LOCALHOST_ADDRESS: &str = "127.0.0.1";

/// IPv6 wildcard / loopback bind addresses.
pub const WILDCARD_IPV6_ADDRESS: &str = "::";
pub const LOCALHOST_IPV6_ADDRESS: &str = "::1";

/// Free-form proxy metadata relevant to listener generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyMetadata {
    /// The workload still speaks HTTP/1.0; inbound connection managers accept it.
    #[serde(default)]
    pub supports_http10: bool,
}

/// The identity of one sidecar proxy, captured per configuration push.
///
/// Constructed fresh for every computation; the synthesizer never mutates a
/// proxy, and callers must not share a mutable instance across computations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub id: String,
    #[serde(default)]
    pub namespace: String,
    /// Addresses of the workload, IPv4 and/or IPv6.
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub metadata: ProxyMetadata,
    /// Visibility and override rules for this proxy's listeners.
    #[serde(default)]
    pub scope: Scope,
    /// Service instances hosted by this workload (inbound surface).
    #[serde(default)]
    pub service_instances: Vec<ServiceInstance>,
}

impl Proxy {
    /// The primary workload address, used as the default inbound bind.
    pub fn primary_address(&self) -> &str {
        self.ip_addresses.first().map(String::as_str).unwrap_or(LOCALHOST_ADDRESS)
    }

    /// Whether any of the proxy's addresses parse as IPv4.
    fn supports_ipv4(&self) -> bool {
        self.ip_addresses
            .iter()
            .any(|a| matches!(a.parse::<IpAddr>(), Ok(IpAddr::V4(_))))
    }

    /// Wildcard and localhost bind addresses for this proxy's address family.
    /// IPv4 wins for dual-stack workloads.
    pub fn wildcard_and_localhost(&self) -> (&'static str, &'static str) {
        if self.supports_ipv4() || self.ip_addresses.is_empty() {
            (WILDCARD_ADDRESS, LOCALHOST_ADDRESS)
        } else {
            (WILDCARD_IPV6_ADDRESS, LOCALHOST_IPV6_ADDRESS)
        }
    }

    /// Whether `address` is one of the proxy's own addresses.
    pub fn owns_address(&self, address: &str) -> bool {
        self.ip_addresses.iter().any(|a| a == address)
    }
}
