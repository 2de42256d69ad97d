//! Network filter builders: TCP proxy and the protocol-specific front
//! filters (MySQL inspection, Thrift proxying with optional rate limiting).

use envoy_types::pb::envoy::config::accesslog::v3::AccessLog;
use envoy_types::pb::envoy::config::core::v3::{
    grpc_service::{EnvoyGrpc, TargetSpecifier},
    ApiVersion, GrpcService,
};
use envoy_types::pb::envoy::config::listener::v3::{filter::ConfigType as FilterConfigType, Filter};
use envoy_types::pb::envoy::config::ratelimit::v3::RateLimitServiceConfig;
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::{
    tcp_proxy::ClusterSpecifier, TcpProxy,
};
use envoy_types::pb::google::protobuf::Duration;

use super::any_from_message;

pub const TCP_PROXY_FILTER_NAME: &str = "envoy.filters.network.tcp_proxy";
pub const MYSQL_PROXY_FILTER_NAME: &str = "envoy.filters.network.mysql_proxy";
pub const THRIFT_PROXY_FILTER_NAME: &str = "envoy.filters.network.thrift_proxy";
pub const THRIFT_RATE_LIMIT_FILTER_NAME: &str = "envoy.filters.thrift.rate_limit";

const TCP_PROXY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.tcp_proxy.v3.TcpProxy";
const MYSQL_PROXY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.mysql_proxy.v3.MySQLProxy";
const THRIFT_PROXY_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.thrift_proxy.v3.ThriftProxy";
const THRIFT_RATE_LIMIT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.thrift_proxy.filters.ratelimit.v3.RateLimit";

const THRIFT_RATE_LIMIT_TIMEOUT_MS: i64 = 50;

/// Terminal TCP proxy filter. Stat prefix equals the cluster name, which is
/// either a resolved destination or a mesh fallthrough cluster.
pub fn tcp_proxy_filter(cluster: &str, access_log: Option<AccessLog>) -> Filter {
    let tcp_proxy = TcpProxy {
        stat_prefix: cluster.to_string(),
        cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.to_string())),
        access_log: access_log.into_iter().collect(),
        ..Default::default()
    };
    Filter {
        name: TCP_PROXY_FILTER_NAME.to_string(),
        config_type: Some(FilterConfigType::TypedConfig(any_from_message(
            TCP_PROXY_TYPE_URL,
            &tcp_proxy,
        ))),
    }
}

/// MySQL inspection filter placed in front of the TCP proxy on MySQL ports.
pub fn mysql_proxy_filter(stat_prefix: &str) -> Filter {
    let mysql = contrib::MySqlProxy { stat_prefix: stat_prefix.to_string(), access_log: String::new() };
    Filter {
        name: MYSQL_PROXY_FILTER_NAME.to_string(),
        config_type: Some(FilterConfigType::TypedConfig(any_from_message(
            MYSQL_PROXY_TYPE_URL,
            &mysql,
        ))),
    }
}

/// Parameters of the Thrift rate-limit filter, resolved from quota bindings.
#[derive(Debug, Clone)]
pub struct ThriftRateLimitSpec {
    /// Rate-limit domain; the destination service FQDN.
    pub domain: String,
    /// Cluster of the external rate-limit service.
    pub service_cluster: String,
}

/// Terminal Thrift proxy filter. The proxy carries its own route to the
/// destination cluster; when a quota binding resolved for the destination,
/// the rate-limit filter is inserted ahead of the implicit router.
pub fn thrift_proxy_filter(cluster: &str, rate_limit: Option<ThriftRateLimitSpec>) -> Filter {
    let thrift_filters = rate_limit
        .map(|spec| {
            let config = contrib::RateLimit {
                domain: spec.domain,
                stage: 0,
                timeout: Some(Duration { seconds: 0, nanos: (THRIFT_RATE_LIMIT_TIMEOUT_MS * 1_000_000) as i32 }),
                failure_mode_deny: false,
                rate_limit_service: Some(RateLimitServiceConfig {
                    grpc_service: Some(GrpcService {
                        target_specifier: Some(TargetSpecifier::EnvoyGrpc(EnvoyGrpc {
                            cluster_name: spec.service_cluster,
                            ..Default::default()
                        })),
                        ..Default::default()
                    }),
                    transport_api_version: ApiVersion::V3 as i32,
                    ..Default::default()
                }),
            };
            vec![contrib::ThriftFilter {
                name: THRIFT_RATE_LIMIT_FILTER_NAME.to_string(),
                config_type: Some(contrib::thrift_filter::ConfigType::TypedConfig(
                    any_from_message(THRIFT_RATE_LIMIT_TYPE_URL, &config),
                )),
            }]
        })
        .unwrap_or_default();

    let thrift = contrib::ThriftProxy {
        stat_prefix: cluster.to_string(),
        route_config: Some(contrib::RouteConfiguration {
            name: cluster.to_string(),
            routes: vec![contrib::Route {
                r#match: Some(contrib::RouteMatch {
                    invert: false,
                    match_specifier: Some(contrib::route_match::MatchSpecifier::MethodName(
                        String::new(),
                    )),
                }),
                route: Some(contrib::RouteAction {
                    cluster_specifier: Some(contrib::route_action::ClusterSpecifier::Cluster(
                        cluster.to_string(),
                    )),
                }),
            }],
        }),
        thrift_filters,
    };

    Filter {
        name: THRIFT_PROXY_FILTER_NAME.to_string(),
        config_type: Some(FilterConfigType::TypedConfig(any_from_message(
            THRIFT_PROXY_TYPE_URL,
            &thrift,
        ))),
    }
}

/// Minimal mirrors of the contrib filter protos (MySQL, Thrift), which are
/// not part of the generated `envoy-types` bindings. Field tags match the
/// upstream schema so the encoded `Any` payloads decode on the data plane.
pub mod contrib {
    use envoy_types::pb::envoy::config::ratelimit::v3::RateLimitServiceConfig;
    use envoy_types::pb::google::protobuf::{Any, Duration};

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MySqlProxy {
        #[prost(string, tag = "1")]
        pub stat_prefix: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub access_log: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ThriftProxy {
        #[prost(string, tag = "1")]
        pub stat_prefix: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "4")]
        pub route_config: ::core::option::Option<RouteConfiguration>,
        #[prost(message, repeated, tag = "5")]
        pub thrift_filters: ::prost::alloc::vec::Vec<ThriftFilter>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RouteConfiguration {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "2")]
        pub routes: ::prost::alloc::vec::Vec<Route>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Route {
        #[prost(message, optional, tag = "1")]
        pub r#match: ::core::option::Option<RouteMatch>,
        #[prost(message, optional, tag = "2")]
        pub route: ::core::option::Option<RouteAction>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RouteMatch {
        #[prost(bool, tag = "3")]
        pub invert: bool,
        #[prost(oneof = "route_match::MatchSpecifier", tags = "1, 2")]
        pub match_specifier: ::core::option::Option<route_match::MatchSpecifier>,
    }

    pub mod route_match {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum MatchSpecifier {
            #[prost(string, tag = "1")]
            MethodName(::prost::alloc::string::String),
            #[prost(string, tag = "2")]
            ServiceName(::prost::alloc::string::String),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RouteAction {
        #[prost(oneof = "route_action::ClusterSpecifier", tags = "1")]
        pub cluster_specifier: ::core::option::Option<route_action::ClusterSpecifier>,
    }

    pub mod route_action {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum ClusterSpecifier {
            #[prost(string, tag = "1")]
            Cluster(::prost::alloc::string::String),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ThriftFilter {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(oneof = "thrift_filter::ConfigType", tags = "3")]
        pub config_type: ::core::option::Option<thrift_filter::ConfigType>,
    }

    pub mod thrift_filter {
        use super::Any;

        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum ConfigType {
            #[prost(message, tag = "3")]
            TypedConfig(Any),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RateLimit {
        #[prost(string, tag = "1")]
        pub domain: ::prost::alloc::string::String,
        #[prost(uint32, tag = "2")]
        pub stage: u32,
        #[prost(message, optional, tag = "3")]
        pub timeout: ::core::option::Option<Duration>,
        #[prost(bool, tag = "4")]
        pub failure_mode_deny: bool,
        #[prost(message, optional, tag = "5")]
        pub rate_limit_service: ::core::option::Option<RateLimitServiceConfig>,
    }
}
