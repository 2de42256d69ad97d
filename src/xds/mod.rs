//! Listener synthesis: the xDS-facing core.
//!
//! Modules follow the data flow: protocol resolution ([`shape`]), match
//! predicates ([`chain_match`]), filter construction ([`filters`], [`chain`]),
//! per-direction assembly ([`inbound`], [`outbound`]) and the orchestrating
//! [`builder`]. Output resources are `envoy-types` protobufs, handed to the
//! transport layer as-is.

pub mod builder;
pub mod chain;
pub mod chain_match;
pub mod filters;
pub mod inbound;
pub mod outbound;
pub mod plugin;
pub mod shape;

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address::PortSpecifier, Address, SocketAddress,
};

/// Cluster receiving unmatched outbound traffic under `ALLOW_ANY`.
pub const PASSTHROUGH_CLUSTER: &str = "PassthroughCluster";

/// Cluster swallowing unmatched outbound traffic under `REGISTRY_ONLY`.
pub const BLACK_HOLE_CLUSTER: &str = "BlackHoleCluster";

/// Name of the virtual catch-all outbound listener.
pub const VIRTUAL_OUTBOUND_LISTENER_NAME: &str = "virtual_outbound";

/// Route configuration name of the explicit HTTP proxy listener.
pub const HTTP_PROXY_ROUTE_NAME: &str = "http_proxy";

/// Direction of traffic a listener or chain handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Prefix used for HTTP connection manager stat names.
    pub fn stat_prefix(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Listener name for a bind address and port, `"{bind}_{port}"`.
pub fn listener_name(bind: &str, port: u16) -> String {
    format!("{}_{}", bind, port)
}

/// Cluster name for a resolved destination, `"{direction}|{port}||{hostname}"`.
pub fn cluster_name(direction: Direction, port: u16, hostname: &str) -> String {
    format!("{}|{}||{}", direction.stat_prefix(), port, hostname)
}

/// Socket address for a listener bind.
pub fn socket_address(bind: &str, port: u16) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            address: bind.to_string(),
            port_specifier: Some(PortSpecifier::PortValue(u32::from(port))),
            ..Default::default()
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming() {
        assert_eq!(listener_name("0.0.0.0", 8080), "0.0.0.0_8080");
        assert_eq!(cluster_name(Direction::Outbound, 8080, "test.com"), "outbound|8080||test.com");
        assert_eq!(cluster_name(Direction::Inbound, 80, "a.svc"), "inbound|80||a.svc");
    }

    #[test]
    fn socket_address_carries_port() {
        let addr = socket_address("127.0.0.1", 15001);
        match addr.address {
            Some(AddressType::SocketAddress(sa)) => {
                assert_eq!(sa.address, "127.0.0.1");
                assert_eq!(sa.port_specifier, Some(PortSpecifier::PortValue(15001)));
            }
            other => panic!("unexpected address {:?}", other),
        }
    }
}
