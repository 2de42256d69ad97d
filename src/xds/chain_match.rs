//! Filter chain match predicates.
//!
//! [`ChainMatch`] is the domain form of Envoy's `FilterChainMatch`. All chain
//! producers build matches through this type so that equality, catch-all
//! detection and ordering share one definition. Within one listener no two
//! chains may carry an equal match; the merge logic in the outbound assembler
//! relies on [`matches_equal`] for that invariant.

use std::net::IpAddr;

use envoy_types::pb::envoy::config::core::v3::CidrRange;
use envoy_types::pb::envoy::config::listener::v3::filter_chain_match::ConnectionSourceType;
use envoy_types::pb::envoy::config::listener::v3::FilterChainMatch;
use envoy_types::pb::google::protobuf::UInt32Value;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Transport protocol value of chains that terminate or inspect TLS.
pub const TRANSPORT_TLS: &str = "tls";

/// ALPN values of plaintext HTTP traffic, as produced by the HTTP inspector.
pub static PLAINTEXT_HTTP_ALPNS: Lazy<Vec<String>> =
    Lazy::new(|| vec!["http/1.0".into(), "http/1.1".into(), "h2c".into()]);

/// ALPN values negotiated by mesh mTLS for HTTP traffic.
pub static MTLS_HTTP_ALPNS: Lazy<Vec<String>> =
    Lazy::new(|| vec!["mesh-http/1.0".into(), "mesh-http/1.1".into(), "mesh-h2".into()]);

/// ALPN values negotiated by mesh mTLS for opaque TCP traffic.
pub static MTLS_TCP_ALPNS: Lazy<Vec<String>> =
    Lazy::new(|| vec!["mesh-peer-exchange".into(), "mesh".into()]);

/// A validated CIDR literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidrSpec {
    pub address_prefix: String,
    pub prefix_len: u32,
}

impl CidrSpec {
    /// Parse `addr/len` or a bare IP (which gets the full prefix length).
    /// Malformed input is a configuration error; callers skip the affected
    /// listener and continue.
    pub fn parse(literal: &str) -> Result<Self> {
        let (addr, len) = match literal.split_once('/') {
            Some((addr, len)) => {
                let len: u32 = len
                    .parse()
                    .map_err(|_| Error::config(format!("invalid CIDR prefix length: {literal}")))?;
                (addr, Some(len))
            }
            None => (literal, None),
        };
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| Error::config(format!("invalid CIDR address: {literal}")))?;
        let max_len = if ip.is_ipv4() { 32 } else { 128 };
        let len = len.unwrap_or(max_len);
        if len > max_len {
            return Err(Error::config(format!("CIDR prefix length out of range: {literal}")));
        }
        Ok(Self { address_prefix: addr.to_string(), prefix_len: len })
    }

    fn to_envoy(&self) -> CidrRange {
        CidrRange {
            address_prefix: self.address_prefix.clone(),
            prefix_len: Some(UInt32Value { value: self.prefix_len }),
        }
    }
}

/// Downstream source classification, mirroring Envoy's connection source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Any,
    SameIpOrLoopback,
    External,
}

impl SourceType {
    fn to_envoy(self) -> i32 {
        match self {
            SourceType::Any => ConnectionSourceType::Any as i32,
            SourceType::SameIpOrLoopback => ConnectionSourceType::SameIpOrLoopback as i32,
            SourceType::External => ConnectionSourceType::External as i32,
        }
    }
}

/// Match predicate selecting a filter chain for a new connection.
///
/// Equality is implemented by exhaustive destructuring of every field: adding
/// a field to this struct without extending the comparison is a compile
/// error, so merge/dedup correctness cannot silently rot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainMatch {
    pub destination_port: Option<u32>,
    pub prefix_ranges: Vec<CidrSpec>,
    pub address_suffix: String,
    pub suffix_len: Option<u32>,
    pub direct_source_prefix_ranges: Vec<CidrSpec>,
    pub source_type: SourceType,
    pub source_prefix_ranges: Vec<CidrSpec>,
    pub source_ports: Vec<u32>,
    pub server_names: Vec<String>,
    pub transport_protocol: String,
    pub application_protocols: Vec<String>,
}

impl PartialEq for ChainMatch {
    fn eq(&self, other: &Self) -> bool {
        let Self {
            destination_port,
            prefix_ranges,
            address_suffix,
            suffix_len,
            direct_source_prefix_ranges,
            source_type,
            source_prefix_ranges,
            source_ports,
            server_names,
            transport_protocol,
            application_protocols,
        } = self;
        destination_port == &other.destination_port
            && prefix_ranges == &other.prefix_ranges
            && address_suffix == &other.address_suffix
            && suffix_len == &other.suffix_len
            && direct_source_prefix_ranges == &other.direct_source_prefix_ranges
            && source_type == &other.source_type
            && source_prefix_ranges == &other.source_prefix_ranges
            && source_ports == &other.source_ports
            && server_names == &other.server_names
            && transport_protocol == &other.transport_protocol
            && application_protocols == &other.application_protocols
    }
}

impl Eq for ChainMatch {}

impl ChainMatch {
    /// Match for a plaintext HTTP chain discriminated by sniffed ALPN.
    pub fn http_plaintext() -> Self {
        Self { application_protocols: PLAINTEXT_HTTP_ALPNS.clone(), ..Default::default() }
    }

    /// Match for the mTLS HTTP chain of an inbound listener.
    pub fn http_mtls() -> Self {
        Self {
            transport_protocol: TRANSPORT_TLS.to_string(),
            application_protocols: MTLS_HTTP_ALPNS.clone(),
            ..Default::default()
        }
    }

    /// Match for the mTLS TCP chain of an inbound listener.
    pub fn tcp_mtls() -> Self {
        Self {
            transport_protocol: TRANSPORT_TLS.to_string(),
            application_protocols: MTLS_TCP_ALPNS.clone(),
            ..Default::default()
        }
    }

    /// Match for a TLS passthrough TCP chain (TLS seen, no mesh ALPN).
    pub fn tls_passthrough() -> Self {
        Self { transport_protocol: TRANSPORT_TLS.to_string(), ..Default::default() }
    }

    /// Match discriminating by destination CIDR.
    pub fn for_cidrs(ranges: Vec<CidrSpec>) -> Self {
        Self { prefix_ranges: ranges, ..Default::default() }
    }

    /// Match discriminating by SNI server names.
    pub fn for_server_names(names: Vec<String>) -> Self {
        Self { server_names: names, ..Default::default() }
    }

    /// True iff the match has no populated discriminating field, i.e. it
    /// accepts every connection.
    pub fn is_catch_all(&self) -> bool {
        let Self {
            destination_port,
            prefix_ranges,
            address_suffix,
            suffix_len,
            direct_source_prefix_ranges,
            source_type,
            source_prefix_ranges,
            source_ports,
            server_names,
            transport_protocol,
            application_protocols,
        } = self;
        destination_port.is_none()
            && prefix_ranges.is_empty()
            && address_suffix.is_empty()
            && suffix_len.is_none()
            && direct_source_prefix_ranges.is_empty()
            && *source_type == SourceType::Any
            && source_prefix_ranges.is_empty()
            && source_ports.is_empty()
            && server_names.is_empty()
            && transport_protocol.is_empty()
            && application_protocols.is_empty()
    }

    /// Convert to the Envoy protobuf form.
    pub fn to_envoy(&self) -> FilterChainMatch {
        FilterChainMatch {
            destination_port: self.destination_port.map(|value| UInt32Value { value }),
            prefix_ranges: self.prefix_ranges.iter().map(CidrSpec::to_envoy).collect(),
            address_suffix: self.address_suffix.clone(),
            suffix_len: self.suffix_len.map(|value| UInt32Value { value }),
            direct_source_prefix_ranges: self
                .direct_source_prefix_ranges
                .iter()
                .map(CidrSpec::to_envoy)
                .collect(),
            source_type: self.source_type.to_envoy(),
            source_prefix_ranges: self.source_prefix_ranges.iter().map(CidrSpec::to_envoy).collect(),
            source_ports: self.source_ports.clone(),
            server_names: self.server_names.clone(),
            transport_protocol: self.transport_protocol.clone(),
            application_protocols: self.application_protocols.clone(),
            ..Default::default()
        }
    }
}

/// Structural equality over optional matches. An absent match is only equal
/// to another absent match; absent and empty are distinct.
pub fn matches_equal(a: Option<&ChainMatch>, b: Option<&ChainMatch>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether an optional match accepts everything. Unlike [`matches_equal`],
/// absent and empty are both catch-all.
pub fn is_catch_all(m: Option<&ChainMatch>) -> bool {
    m.map_or(true, ChainMatch::is_catch_all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_parse_accepts_v4_v6_and_bare_ips() {
        let v4 = CidrSpec::parse("10.10.0.0/24").unwrap();
        assert_eq!(v4.address_prefix, "10.10.0.0");
        assert_eq!(v4.prefix_len, 24);

        let bare = CidrSpec::parse("10.0.0.18").unwrap();
        assert_eq!(bare.prefix_len, 32);

        let v6 = CidrSpec::parse("fe80::1c97:c3ff:fed7:5940").unwrap();
        assert_eq!(v6.prefix_len, 128);
    }

    #[test]
    fn cidr_parse_rejects_malformed_input() {
        assert!(CidrSpec::parse("not-an-ip/24").is_err());
        assert!(CidrSpec::parse("10.0.0.0/99").is_err());
        assert!(CidrSpec::parse("10.0.0.0/abc").is_err());
    }

    #[test]
    fn absent_and_empty_matches_are_distinct_in_equality() {
        let empty = ChainMatch::default();
        assert!(matches_equal(None, None));
        assert!(!matches_equal(None, Some(&empty)));
        assert!(matches_equal(Some(&empty), Some(&empty)));
    }

    #[test]
    fn both_absent_and_empty_are_catch_all() {
        assert!(is_catch_all(None));
        assert!(is_catch_all(Some(&ChainMatch::default())));
        assert!(!is_catch_all(Some(&ChainMatch::http_plaintext())));
    }

    #[test]
    fn equality_covers_every_field() {
        let full = ChainMatch {
            destination_port: Some(1999),
            prefix_ranges: vec![CidrSpec::parse("10.244.0.18/32").unwrap()],
            address_suffix: "suffix".into(),
            suffix_len: Some(3),
            direct_source_prefix_ranges: vec![CidrSpec::parse("10.0.0.0/8").unwrap()],
            source_type: SourceType::Any,
            source_prefix_ranges: vec![CidrSpec::parse("fe80::1c97:c3ff:fed7:5940/128").unwrap()],
            source_ports: vec![2000],
            server_names: vec!["foo".into()],
            transport_protocol: TRANSPORT_TLS.into(),
            application_protocols: MTLS_HTTP_ALPNS.clone(),
        };
        assert_eq!(full, full.clone());

        let mut other = full.clone();
        other.application_protocols = PLAINTEXT_HTTP_ALPNS.clone();
        assert_ne!(full, other);

        let mut other = full.clone();
        other.source_ports = vec![2001];
        assert_ne!(full, other);
    }

    #[test]
    fn envoy_conversion_preserves_discriminators() {
        let m = ChainMatch::http_mtls();
        let envoy = m.to_envoy();
        assert_eq!(envoy.transport_protocol, TRANSPORT_TLS);
        assert_eq!(envoy.application_protocols, *MTLS_HTTP_ALPNS);

        let cidr = ChainMatch::for_cidrs(vec![CidrSpec::parse("10.10.0.0/24").unwrap()]);
        let envoy = cidr.to_envoy();
        assert_eq!(envoy.prefix_ranges[0].address_prefix, "10.10.0.0");
        assert_eq!(envoy.prefix_ranges[0].prefix_len, Some(UInt32Value { value: 24 }));
    }
}
