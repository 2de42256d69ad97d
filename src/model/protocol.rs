//! Application protocol names declared on service ports.

use serde::{Deserialize, Serialize};

/// Parsed form of a port's declared protocol string.
///
/// Declarations come from the registry and are free-form; parsing is
/// case-insensitive and anything unrecognized degrades to [`AppProtocol::Unknown`]
/// rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppProtocol {
    Http,
    Http2,
    Grpc,
    GrpcWeb,
    Https,
    Tls,
    Tcp,
    Mongo,
    Mysql,
    Thrift,
    /// Explicit forward-proxy port declared in a sidecar egress spec.
    HttpProxy,
    Unknown,
}

impl AppProtocol {
    /// Parse a declared protocol string. Empty or unrecognized values map to
    /// [`AppProtocol::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "http" => Self::Http,
            "http2" => Self::Http2,
            "grpc" => Self::Grpc,
            "grpc-web" => Self::GrpcWeb,
            "https" => Self::Https,
            "tls" => Self::Tls,
            "tcp" => Self::Tcp,
            "mongo" => Self::Mongo,
            "mysql" => Self::Mysql,
            "thrift" => Self::Thrift,
            "http_proxy" => Self::HttpProxy,
            _ => Self::Unknown,
        }
    }

    /// True for protocols served by an HTTP connection manager.
    pub fn is_http(self) -> bool {
        matches!(self, Self::Http | Self::Http2 | Self::Grpc | Self::GrpcWeb | Self::HttpProxy)
    }

    /// True for gRPC variants, which get the gRPC stats filter.
    pub fn is_grpc(self) -> bool {
        matches!(self, Self::Grpc | Self::GrpcWeb)
    }

    /// True when the port carries TLS negotiated by the application.
    pub fn is_tls(self) -> bool {
        matches!(self, Self::Https | Self::Tls)
    }

    /// True when the declaration gives no usable protocol.
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}
