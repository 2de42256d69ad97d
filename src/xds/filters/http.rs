//! HTTP filter pipeline builders.
//!
//! The pipeline order is fixed: CORS, fault injection, plugin-contributed
//! filters, gRPC stats (gRPC ports only), the outbound ALPN override marker,
//! and the router last. Chain builders assemble the head, let plugins append,
//! then call [`finalize_http_filters`].

use envoy_types::pb::envoy::extensions::filters::http::cors::v3::Cors;
use envoy_types::pb::envoy::extensions::filters::http::fault::v3::HttpFault;
use envoy_types::pb::envoy::extensions::filters::http::grpc_stats::v3::FilterConfig as GrpcStatsConfig;
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_filter::ConfigType as HttpFilterConfigType, HttpFilter,
};
use envoy_types::pb::google::protobuf::{
    value::Kind as ValueKind, ListValue, Struct as ProtoStruct, Value as ProtoValue,
};

use super::any_from_message;
use crate::xds::chain_match::MTLS_HTTP_ALPNS;
use crate::xds::Direction;

/// Envoy's canonical router filter name.
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";
pub const CORS_FILTER_NAME: &str = "envoy.filters.http.cors";
pub const FAULT_FILTER_NAME: &str = "envoy.filters.http.fault";
pub const GRPC_STATS_FILTER_NAME: &str = "envoy.filters.http.grpc_stats";
/// Marker filter rewriting the upstream ALPN for mesh-internal traffic.
pub const ALPN_OVERRIDE_FILTER_NAME: &str = "meshplane.filters.http.alpn_override";

const ROUTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const CORS_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.cors.v3.Cors";
const FAULT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.fault.v3.HTTPFault";
const GRPC_STATS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.grpc_stats.v3.FilterConfig";
const STRUCT_TYPE_URL: &str = "type.googleapis.com/google.protobuf.Struct";

/// CORS policy enforcement point; per-route policies are configured in the
/// route table, the chain only installs the filter.
pub fn cors_filter() -> HttpFilter {
    HttpFilter {
        name: CORS_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            CORS_TYPE_URL,
            &Cors::default(),
        ))),
        ..Default::default()
    }
}

/// Fault injection, enabled per route; the listener installs the empty base
/// config.
pub fn fault_filter() -> HttpFilter {
    HttpFilter {
        name: FAULT_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            FAULT_TYPE_URL,
            &HttpFault::default(),
        ))),
        ..Default::default()
    }
}

/// Per-method gRPC stats for gRPC ports.
pub fn grpc_stats_filter() -> HttpFilter {
    HttpFilter {
        name: GRPC_STATS_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            GRPC_STATS_TYPE_URL,
            &GrpcStatsConfig { emit_filter_state: true, ..Default::default() },
        ))),
        ..Default::default()
    }
}

/// ALPN override marker carried by outbound HTTP chains so mesh-internal
/// upstream connections negotiate the mesh ALPN set.
pub fn alpn_override_filter() -> HttpFilter {
    let alpns = ListValue {
        values: MTLS_HTTP_ALPNS
            .iter()
            .map(|alpn| ProtoValue { kind: Some(ValueKind::StringValue(alpn.clone())) })
            .collect(),
    };
    let config = ProtoStruct {
        fields: [(
            "alpn_override".to_string(),
            ProtoValue { kind: Some(ValueKind::ListValue(alpns)) },
        )]
        .into_iter()
        .collect(),
    };
    HttpFilter {
        name: ALPN_OVERRIDE_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            STRUCT_TYPE_URL,
            &config,
        ))),
        ..Default::default()
    }
}

/// Terminal router filter.
pub fn router_filter() -> HttpFilter {
    HttpFilter {
        name: ROUTER_FILTER_NAME.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            ROUTER_TYPE_URL,
            &Router::default(),
        ))),
        ..Default::default()
    }
}

/// Head of every HTTP pipeline, before plugin contributions.
pub fn base_http_filters() -> Vec<HttpFilter> {
    vec![cors_filter(), fault_filter()]
}

/// Append the tail of the pipeline after plugins ran: gRPC stats for gRPC
/// ports, the ALPN override marker on outbound chains only, and the router.
pub fn finalize_http_filters(filters: &mut Vec<HttpFilter>, direction: Direction, grpc: bool) {
    if grpc {
        filters.push(grpc_stats_filter());
    }
    if direction == Direction::Outbound {
        filters.push(alpn_override_filter());
    }
    filters.push(router_filter());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_pipeline_order() {
        let mut filters = base_http_filters();
        finalize_http_filters(&mut filters, Direction::Outbound, false);
        let names: Vec<&str> = filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![CORS_FILTER_NAME, FAULT_FILTER_NAME, ALPN_OVERRIDE_FILTER_NAME, ROUTER_FILTER_NAME]
        );
    }

    #[test]
    fn inbound_pipeline_has_no_alpn_override() {
        let mut filters = base_http_filters();
        finalize_http_filters(&mut filters, Direction::Inbound, false);
        assert!(filters.iter().all(|f| f.name != ALPN_OVERRIDE_FILTER_NAME));
        assert_eq!(filters.last().unwrap().name, ROUTER_FILTER_NAME);
    }

    #[test]
    fn grpc_ports_get_stats_before_router() {
        let mut filters = base_http_filters();
        finalize_http_filters(&mut filters, Direction::Inbound, true);
        let names: Vec<&str> = filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![CORS_FILTER_NAME, FAULT_FILTER_NAME, GRPC_STATS_FILTER_NAME, ROUTER_FILTER_NAME]
        );
    }
}
