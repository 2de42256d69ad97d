//! L4 virtual-service rules consumed during outbound TCP chain construction.
//!
//! Only the match dimensions the synthesizer acts on are modeled: destination
//! CIDR and port, mapping to weighted destinations. Route-table (virtual host)
//! generation lives elsewhere and is referenced by name only.

use serde::{Deserialize, Serialize};

/// L4 match attributes of one TCP route rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct L4Match {
    /// Destination CIDR literals, e.g. `10.10.0.0/24`.
    #[serde(default)]
    pub destination_subnets: Vec<String>,
    /// Service port the rule applies to; `None` matches any port.
    #[serde(default)]
    pub port: Option<u16>,
}

/// One weighted destination of a TCP route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedDestination {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub weight: u32,
}

/// A TCP route: match attributes plus destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpRoute {
    #[serde(default)]
    pub matches: Vec<L4Match>,
    pub destinations: Vec<WeightedDestination>,
}

/// A virtual service restricted to its L4 surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualService {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub tcp_routes: Vec<TcpRoute>,
}
