//! Protocol resolution: mapping declared port protocols to listener shapes.

use crate::config::MeshConfig;
use crate::model::AppProtocol;

use super::Direction;

/// The shape of the filter chains a port requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerShape {
    /// HTTP connection manager chain.
    Http,
    /// Plain TCP proxy chain (also used for TLS passthrough protocols).
    Tcp,
    /// TCP proxy fronted by the MySQL inspection filter.
    Mysql,
    /// Thrift proxy chain, optionally rate limited.
    Thrift,
    /// Protocol unknown; requires inspector listener filters to sniff, and
    /// both HTTP and TCP chains with discriminating matches.
    Auto,
}

impl ListenerShape {
    /// Resolve a declared protocol to a listener shape.
    ///
    /// Unknown protocols degrade to [`ListenerShape::Auto`] when sniffing is
    /// enabled for the direction, and to TCP otherwise. This never fails.
    pub fn resolve(protocol: AppProtocol, direction: Direction, mesh: &MeshConfig) -> Self {
        if protocol.is_http() {
            return Self::Http;
        }
        match protocol {
            AppProtocol::Mysql => Self::Mysql,
            AppProtocol::Thrift => Self::Thrift,
            AppProtocol::Tcp | AppProtocol::Mongo => Self::Tcp,
            p if p.is_tls() => Self::Tcp,
            _ => {
                let sniff = match direction {
                    Direction::Inbound => mesh.protocol_sniffing_inbound,
                    Direction::Outbound => mesh.protocol_sniffing_outbound,
                };
                if sniff {
                    Self::Auto
                } else {
                    Self::Tcp
                }
            }
        }
    }

    /// Whether this shape needs inspector listener filters.
    pub fn needs_inspectors(self) -> bool {
        matches!(self, Self::Auto)
    }
}
