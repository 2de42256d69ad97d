//! Filter chain construction.
//!
//! [`ChainBuilder`] turns a resolved destination and a listener shape into a
//! [`BuiltChain`]: the ordered network filters, the optional TLS context and
//! the match predicate. Chains stay in domain form until listener assembly so
//! that merge and ordering can compare matches structurally.

use envoy_types::pb::envoy::config::core::v3::{
    config_source::ConfigSourceSpecifier, transport_socket::ConfigType as TransportSocketConfigType,
    AggregatedConfigSource, ConfigSource, Http1ProtocolOptions, TransportSocket,
};
use envoy_types::pb::envoy::config::listener::v3::{Filter, FilterChain};
use envoy_types::pb::envoy::config::route::v3::{
    route::Action as RouteActionKind, route_action::ClusterSpecifier,
    route_match::PathSpecifier, Route, RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{
        CodecType, ForwardClientCertDetails, RouteSpecifier, SetCurrentClientCertDetails,
        Tracing as HcmTracing,
    },
    HttpConnectionManager, HttpFilter,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, DownstreamTlsContext,
};
use envoy_types::pb::envoy::r#type::tracing::v3::{custom_tag, CustomTag};
use envoy_types::pb::envoy::r#type::v3::Percent;
use envoy_types::pb::google::protobuf::{BoolValue, UInt32Value};
use tracing::warn;

use crate::config::{CustomTagSpec, MeshConfig};
use crate::errors::Result;
use crate::model::{Proxy, QuotaSet};

use super::chain_match::{self, ChainMatch};
use super::filters::http::{base_http_filters, finalize_http_filters};
use super::filters::network::{
    mysql_proxy_filter, tcp_proxy_filter, thrift_proxy_filter, ThriftRateLimitSpec,
};
use super::filters::{access_log, any_from_message};
use super::plugin::{ChainContext, ChainHandle, Plugin};
use super::Direction;

pub const HTTP_CONNECTION_MANAGER_FILTER_NAME: &str =
    "envoy.filters.network.http_connection_manager";
const HCM_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const DOWNSTREAM_TLS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";
const TLS_TRANSPORT_SOCKET_NAME: &str = "envoy.transport_sockets.tls";

/// Server name advertised by inbound connection managers.
pub const INBOUND_SERVER_NAME: &str = "meshplane-envoy";

/// A filter chain in domain form, before listener assembly.
#[derive(Debug, Clone)]
pub struct BuiltChain {
    /// Match predicate; `None` means no `filter_chain_match` is emitted.
    pub chain_match: Option<ChainMatch>,
    /// Downstream TLS context for chains that terminate (m)TLS.
    pub tls: Option<DownstreamTlsContext>,
    /// Ordered network filters, terminal proxy filter last.
    pub filters: Vec<Filter>,
}

impl BuiltChain {
    pub fn is_catch_all(&self) -> bool {
        chain_match::is_catch_all(self.chain_match.as_ref())
    }

    /// Convert into the Envoy protobuf form.
    pub fn into_envoy(self) -> FilterChain {
        FilterChain {
            filter_chain_match: self.chain_match.map(|m| m.to_envoy()),
            filters: self.filters,
            transport_socket: self.tls.map(|tls| TransportSocket {
                name: TLS_TRANSPORT_SOCKET_NAME.to_string(),
                config_type: Some(TransportSocketConfigType::TypedConfig(any_from_message(
                    DOWNSTREAM_TLS_TYPE_URL,
                    &tls,
                ))),
            }),
            ..Default::default()
        }
    }
}

/// Stable-sort chains so that a catch-all chain (if any) lands last. All
/// chain producers run this before finalizing a listener.
pub fn sort_catch_all_last(chains: &mut [BuiltChain]) {
    chains.sort_by_key(BuiltChain::is_catch_all);
}

/// Merge `incoming` chains into previously computed chains for the same
/// bind:port. An incoming chain whose match equals an existing chain's match
/// replaces it in place; the catch-all slot is only ever replaced by the most
/// recently supplied catch-all and keeps its final position. Everything else
/// inserts before the catch-all.
pub fn merge_chains(existing: &mut Vec<BuiltChain>, incoming: Vec<BuiltChain>) {
    for chain in incoming {
        if chain.is_catch_all() {
            match existing.iter().position(BuiltChain::is_catch_all) {
                Some(idx) => existing[idx] = chain,
                None => existing.push(chain),
            }
            continue;
        }
        if let Some(idx) = existing.iter().position(|c| {
            chain_match::matches_equal(c.chain_match.as_ref(), chain.chain_match.as_ref())
        }) {
            existing[idx] = chain;
        } else {
            match existing.iter().position(BuiltChain::is_catch_all) {
                Some(catch_all) => existing.insert(catch_all, chain),
                None => existing.push(chain),
            }
        }
    }
}

/// Downstream TLS context of a mesh mTLS chain. Certificate material is
/// provisioned out of band; the synthesizer only pins the handshake
/// requirements.
pub fn mtls_tls_context(alpns: &[String]) -> DownstreamTlsContext {
    DownstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            alpn_protocols: alpns.to_vec(),
            ..Default::default()
        }),
        require_client_certificate: Some(BoolValue { value: true }),
        ..Default::default()
    }
}

/// Route reference of an HTTP chain.
#[derive(Debug, Clone)]
pub enum RouteSpec {
    /// Named route configuration delivered by the route-table generator.
    Rds(String),
    /// Inline single-destination route (inbound default endpoint).
    Inline { name: String, cluster: String },
}

/// Parameters of one HTTP chain.
#[derive(Debug, Clone)]
pub struct HttpChainOpts {
    pub route: RouteSpec,
    pub bind: String,
    pub port: u16,
    /// Port protocol is gRPC; adds the gRPC stats filter.
    pub grpc: bool,
    /// Chain terminates mesh mTLS.
    pub tls: Option<DownstreamTlsContext>,
    pub chain_match: Option<ChainMatch>,
}

/// Builds individual filter chains for both directions.
pub struct ChainBuilder<'a> {
    pub mesh: &'a MeshConfig,
    pub proxy: &'a Proxy,
    pub plugins: &'a [Box<dyn Plugin>],
    pub quotas: Option<&'a QuotaSet>,
}

impl<'a> ChainBuilder<'a> {
    /// HTTP chain: plugin-extended filter pipeline inside a connection
    /// manager, terminal in the chain.
    pub fn http_chain(&self, ctx: &ChainContext<'_>, opts: HttpChainOpts) -> Result<BuiltChain> {
        let mut http_filters = base_http_filters();
        let mut network_filters = Vec::new();
        self.apply_plugins(ctx, &mut http_filters, &mut network_filters)?;
        finalize_http_filters(&mut http_filters, ctx.direction, opts.grpc);

        let hcm = self.hcm_filter(ctx, &opts, http_filters);
        network_filters.push(hcm);

        Ok(BuiltChain { chain_match: opts.chain_match, tls: opts.tls, filters: network_filters })
    }

    /// Plain TCP chain to a resolved cluster or fallthrough cluster.
    pub fn tcp_chain(
        &self,
        ctx: &ChainContext<'_>,
        cluster: &str,
        chain_match: Option<ChainMatch>,
        tls: Option<DownstreamTlsContext>,
    ) -> Result<BuiltChain> {
        let mut http_filters = Vec::new();
        let mut network_filters = Vec::new();
        self.apply_plugins(ctx, &mut http_filters, &mut network_filters)?;
        network_filters.push(tcp_proxy_filter(cluster, access_log(self.mesh)));
        Ok(BuiltChain { chain_match, tls, filters: network_filters })
    }

    /// MySQL chain: inspection front filter ahead of the TCP proxy.
    pub fn mysql_chain(&self, ctx: &ChainContext<'_>, cluster: &str) -> Result<BuiltChain> {
        let mut http_filters = Vec::new();
        let mut network_filters = Vec::new();
        self.apply_plugins(ctx, &mut http_filters, &mut network_filters)?;
        network_filters.push(mysql_proxy_filter(cluster));
        network_filters.push(tcp_proxy_filter(cluster, access_log(self.mesh)));
        Ok(BuiltChain { chain_match: None, tls: None, filters: network_filters })
    }

    /// Thrift chain: terminal thrift proxy, rate limited iff a quota binding
    /// resolves for the destination FQDN and the mesh names a rate-limit
    /// service. A missing binding simply omits the filter.
    pub fn thrift_chain(
        &self,
        ctx: &ChainContext<'_>,
        cluster: &str,
        destination_fqdn: &str,
    ) -> Result<BuiltChain> {
        let rate_limit = match (&self.mesh.rpc_rate_limit_service, self.quotas) {
            (Some(service_cluster), Some(quotas)) => {
                quotas.resolve(destination_fqdn).map(|_| ThriftRateLimitSpec {
                    domain: destination_fqdn.to_string(),
                    service_cluster: service_cluster.clone(),
                })
            }
            _ => None,
        };

        let mut http_filters = Vec::new();
        let mut network_filters = Vec::new();
        self.apply_plugins(ctx, &mut http_filters, &mut network_filters)?;
        network_filters.push(thrift_proxy_filter(cluster, rate_limit));
        Ok(BuiltChain { chain_match: None, tls: None, filters: network_filters })
    }

    /// Run registered plugins in order. Outbound errors propagate (the
    /// assembler skips the listener); inbound errors roll back all plugin
    /// contributions and keep the listener.
    fn apply_plugins(
        &self,
        ctx: &ChainContext<'_>,
        http: &mut Vec<HttpFilter>,
        network: &mut Vec<Filter>,
    ) -> Result<()> {
        let http_mark = http.len();
        let network_mark = network.len();
        for plugin in self.plugins {
            let mut handle = ChainHandle { http: &mut *http, network: &mut *network };
            let result = match ctx.direction {
                Direction::Outbound => plugin.on_outbound_chain(ctx, &mut handle),
                Direction::Inbound => plugin.on_inbound_chain(ctx, &mut handle),
            };
            if let Err(err) = result {
                match ctx.direction {
                    Direction::Outbound => return Err(err),
                    Direction::Inbound => {
                        warn!(port = ctx.port, error = %err,
                            "inbound plugin failed; continuing without plugin contribution");
                        http.truncate(http_mark);
                        network.truncate(network_mark);
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn hcm_filter(
        &self,
        ctx: &ChainContext<'_>,
        opts: &HttpChainOpts,
        http_filters: Vec<HttpFilter>,
    ) -> Filter {
        let route_specifier = match &opts.route {
            RouteSpec::Rds(name) => RouteSpecifier::Rds(
                envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::Rds {
                    route_config_name: name.clone(),
                    config_source: Some(ConfigSource {
                        config_source_specifier: Some(ConfigSourceSpecifier::Ads(
                            AggregatedConfigSource::default(),
                        )),
                        ..Default::default()
                    }),
                },
            ),
            RouteSpec::Inline { name, cluster } => {
                RouteSpecifier::RouteConfig(inline_route(name, cluster))
            }
        };

        let mut hcm = HttpConnectionManager {
            stat_prefix: format!("{}_{}_{}", ctx.direction.stat_prefix(), opts.bind, opts.port),
            codec_type: CodecType::Auto as i32,
            route_specifier: Some(route_specifier),
            http_filters,
            access_log: access_log(self.mesh).into_iter().collect(),
            tracing: self.tracing(),
            ..Default::default()
        };

        match ctx.direction {
            Direction::Inbound => {
                hcm.server_name = INBOUND_SERVER_NAME.to_string();
                hcm.normalize_path = Some(BoolValue { value: true });
                if opts.tls.is_some() {
                    hcm.forward_client_cert_details =
                        ForwardClientCertDetails::AppendForward as i32;
                    hcm.set_current_client_cert_details = Some(SetCurrentClientCertDetails {
                        subject: Some(BoolValue { value: true }),
                        dns: true,
                        uri: true,
                        ..Default::default()
                    });
                }
                if self.proxy.metadata.supports_http10 {
                    hcm.http_protocol_options =
                        Some(Http1ProtocolOptions { accept_http_10: true, ..Default::default() });
                }
            }
            Direction::Outbound => {
                if self.mesh.use_remote_address {
                    hcm.use_remote_address = Some(BoolValue { value: true });
                }
            }
        }

        Filter {
            name: HTTP_CONNECTION_MANAGER_FILTER_NAME.to_string(),
            config_type: Some(
                envoy_types::pb::envoy::config::listener::v3::filter::ConfigType::TypedConfig(
                    any_from_message(HCM_TYPE_URL, &hcm),
                ),
            ),
        }
    }

    /// Tracing configuration when the mesh enables it. Custom tags are
    /// emitted sorted by tag name so output is independent of map iteration
    /// order; `max_path_tag_length` is only set when explicitly configured.
    fn tracing(&self) -> Option<HcmTracing> {
        if !self.mesh.enable_tracing {
            return None;
        }
        let defaults = &self.mesh.tracing;

        let mut tags: Vec<(&String, &CustomTagSpec)> = defaults.custom_tags.iter().collect();
        tags.sort_by(|a, b| a.0.cmp(b.0));

        Some(HcmTracing {
            client_sampling: Some(Percent {
                value: defaults.client_sampling.unwrap_or(100.0).clamp(0.0, 100.0),
            }),
            random_sampling: Some(Percent { value: defaults.random_sampling() }),
            overall_sampling: Some(Percent {
                value: defaults.overall_sampling.unwrap_or(100.0).clamp(0.0, 100.0),
            }),
            max_path_tag_length: defaults.max_path_tag_length.map(|value| UInt32Value { value }),
            custom_tags: tags.into_iter().map(|(name, spec)| build_custom_tag(name, spec)).collect(),
            ..Default::default()
        })
    }
}

fn build_custom_tag(name: &str, spec: &CustomTagSpec) -> CustomTag {
    let kind = match spec {
        CustomTagSpec::Literal { value } => {
            custom_tag::Type::Literal(custom_tag::Literal { value: value.clone() })
        }
        CustomTagSpec::Environment { name, default_value } => {
            custom_tag::Type::Environment(custom_tag::Environment {
                name: name.clone(),
                default_value: default_value.clone(),
            })
        }
        CustomTagSpec::RequestHeader { name, default_value } => {
            custom_tag::Type::RequestHeader(custom_tag::Header {
                name: name.clone(),
                default_value: default_value.clone(),
            })
        }
    };
    CustomTag { tag: name.to_string(), r#type: Some(kind) }
}

fn inline_route(name: &str, cluster: &str) -> RouteConfiguration {
    RouteConfiguration {
        name: name.to_string(),
        virtual_hosts: vec![VirtualHost {
            name: name.to_string(),
            domains: vec!["*".to_string()],
            routes: vec![Route {
                r#match: Some(RouteMatch {
                    path_specifier: Some(PathSpecifier::Prefix("/".to_string())),
                    ..Default::default()
                }),
                action: Some(RouteActionKind::Route(RouteAction {
                    cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.to_string())),
                    ..Default::default()
                })),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::model::{Proxy, ProxyMetadata, Scope};
    use crate::xds::chain_match::{MTLS_HTTP_ALPNS, PLAINTEXT_HTTP_ALPNS};
    use crate::xds::filters::http::{
        ALPN_OVERRIDE_FILTER_NAME, CORS_FILTER_NAME, ROUTER_FILTER_NAME,
    };
    use crate::xds::shape::ListenerShape;
    use prost::Message;

    fn proxy() -> Proxy {
        Proxy {
            id: "sidecar~1.1.1.1".into(),
            namespace: "default".into(),
            ip_addresses: vec!["1.1.1.1".into()],
            metadata: ProxyMetadata::default(),
            scope: Scope::default(),
            service_instances: Vec::new(),
        }
    }

    fn decode_hcm(chain: &BuiltChain) -> HttpConnectionManager {
        let filter = chain.filters.last().expect("terminal filter");
        assert_eq!(filter.name, HTTP_CONNECTION_MANAGER_FILTER_NAME);
        let any = match filter.config_type.clone().unwrap() {
            envoy_types::pb::envoy::config::listener::v3::filter::ConfigType::TypedConfig(any) => {
                any
            }
            other => panic!("unsupported config type in test: {:?}", other),
        };
        HttpConnectionManager::decode(any.value.as_slice()).unwrap()
    }

    fn ctx(direction: Direction) -> ChainContext<'static> {
        ChainContext { direction, shape: ListenerShape::Http, port: 8080, service_hostname: None }
    }

    fn http_opts(_direction: Direction) -> HttpChainOpts {
        HttpChainOpts {
            route: RouteSpec::Rds("8080".into()),
            bind: "0.0.0.0".into(),
            port: 8080,
            grpc: false,
            tls: None,
            chain_match: Some(ChainMatch::http_plaintext()),
        }
    }

    #[test]
    fn outbound_http_chain_carries_alpn_override_and_router_last() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let chain =
            builder.http_chain(&ctx(Direction::Outbound), http_opts(Direction::Outbound)).unwrap();
        let hcm = decode_hcm(&chain);
        assert!(hcm.stat_prefix.starts_with("outbound_"));
        let names: Vec<&str> = hcm.http_filters.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names.first(), Some(&CORS_FILTER_NAME));
        assert!(names.contains(&ALPN_OVERRIDE_FILTER_NAME));
        assert_eq!(names.last(), Some(&ROUTER_FILTER_NAME));
    }

    #[test]
    fn inbound_http_chain_sets_server_name_and_normalize_path() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let mut opts = http_opts(Direction::Inbound);
        opts.route = RouteSpec::Inline { name: "inbound|8080".into(), cluster: "inbound|8080||test.com".into() };
        let chain = builder.http_chain(&ctx(Direction::Inbound), opts).unwrap();
        let hcm = decode_hcm(&chain);
        assert_eq!(hcm.server_name, INBOUND_SERVER_NAME);
        assert!(hcm.stat_prefix.starts_with("inbound_"));
        assert_eq!(hcm.normalize_path, Some(BoolValue { value: true }));
        // Plaintext chain: no mTLS termination, so no client cert forwarding.
        assert_eq!(hcm.forward_client_cert_details, 0);
        assert!(hcm.http_filters.iter().all(|f| f.name != ALPN_OVERRIDE_FILTER_NAME));
    }

    #[test]
    fn inbound_mtls_chain_forwards_client_cert_details() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let mut opts = http_opts(Direction::Inbound);
        opts.tls = Some(mtls_tls_context(&MTLS_HTTP_ALPNS));
        opts.chain_match = Some(ChainMatch::http_mtls());
        let chain = builder.http_chain(&ctx(Direction::Inbound), opts).unwrap();
        let hcm = decode_hcm(&chain);
        assert_eq!(
            hcm.forward_client_cert_details,
            ForwardClientCertDetails::AppendForward as i32
        );
        let details = hcm.set_current_client_cert_details.unwrap();
        assert_eq!(details.subject, Some(BoolValue { value: true }));
        assert!(details.dns);
        assert!(details.uri);
        assert!(chain.tls.is_some());
    }

    #[test]
    fn use_remote_address_applies_to_outbound_only() {
        let mesh = MeshConfig { use_remote_address: true, ..Default::default() };
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };

        let outbound =
            builder.http_chain(&ctx(Direction::Outbound), http_opts(Direction::Outbound)).unwrap();
        assert_eq!(decode_hcm(&outbound).use_remote_address, Some(BoolValue { value: true }));

        let inbound =
            builder.http_chain(&ctx(Direction::Inbound), http_opts(Direction::Inbound)).unwrap();
        assert_eq!(decode_hcm(&inbound).use_remote_address, None);
    }

    #[test]
    fn http10_acceptance_follows_proxy_metadata() {
        let mesh = MeshConfig::default();
        let mut p = proxy();
        p.metadata.supports_http10 = true;
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let chain =
            builder.http_chain(&ctx(Direction::Inbound), http_opts(Direction::Inbound)).unwrap();
        let hcm = decode_hcm(&chain);
        assert!(hcm.http_protocol_options.unwrap().accept_http_10);
    }

    #[test]
    fn tracing_tags_sorted_and_sampling_clamped() {
        let mut mesh = MeshConfig { enable_tracing: true, ..Default::default() };
        mesh.tracing.sampling = 300.0;
        mesh.tracing.custom_tags.insert(
            "zz_tag".into(),
            CustomTagSpec::Literal { value: "z".into() },
        );
        mesh.tracing.custom_tags.insert(
            "aa_tag".into(),
            CustomTagSpec::RequestHeader { name: "x-req".into(), default_value: "d".into() },
        );
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let chain =
            builder.http_chain(&ctx(Direction::Outbound), http_opts(Direction::Outbound)).unwrap();
        let tracing = decode_hcm(&chain).tracing.unwrap();
        assert_eq!(tracing.random_sampling, Some(Percent { value: 100.0 }));
        assert_eq!(tracing.client_sampling, Some(Percent { value: 100.0 }));
        assert_eq!(tracing.max_path_tag_length, None);
        let tag_names: Vec<&str> = tracing.custom_tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tag_names, vec!["aa_tag", "zz_tag"]);
    }

    #[test]
    fn sort_and_merge_keep_catch_all_last() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let tcp_ctx = ChainContext {
            direction: Direction::Outbound,
            shape: ListenerShape::Tcp,
            port: 443,
            service_hostname: Some("foo.com"),
        };

        let catch_all = builder.tcp_chain(&tcp_ctx, "outbound|443||foo.com", None, None).unwrap();
        let sni = builder
            .tcp_chain(
                &tcp_ctx,
                "outbound|443||foo.com",
                Some(ChainMatch::for_server_names(vec!["foo.com".into()])),
                None,
            )
            .unwrap();
        let mut chains = vec![catch_all, sni];
        sort_catch_all_last(&mut chains);
        assert!(!chains[0].is_catch_all());
        assert!(chains[1].is_catch_all());

        // A newer catch-all replaces the old one, in place and last.
        let replacement = builder.tcp_chain(&tcp_ctx, "outbound|443||bar.com", None, None).unwrap();
        merge_chains(&mut chains, vec![replacement]);
        assert_eq!(chains.len(), 2);
        assert!(chains[1].is_catch_all());
        let tcp = match chains[1].filters[0].config_type.clone().unwrap() {
            envoy_types::pb::envoy::config::listener::v3::filter::ConfigType::TypedConfig(any) => {
                envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::TcpProxy::decode(
                    any.value.as_slice(),
                )
                .unwrap()
            }
            other => panic!("unsupported config type in test: {:?}", other),
        };
        assert_eq!(tcp.stat_prefix, "outbound|443||bar.com");
    }

    #[test]
    fn merge_inserts_discriminated_chains_before_catch_all() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &[], quotas: None };
        let tcp_ctx = ChainContext {
            direction: Direction::Outbound,
            shape: ListenerShape::Tcp,
            port: 443,
            service_hostname: None,
        };

        let mut chains =
            vec![builder.tcp_chain(&tcp_ctx, "outbound|443||foo.com", None, None).unwrap()];
        let sni = builder
            .tcp_chain(
                &tcp_ctx,
                "outbound|443||bar.com",
                Some(ChainMatch::for_server_names(vec!["bar.com".into()])),
                None,
            )
            .unwrap();
        merge_chains(&mut chains, vec![sni]);
        assert_eq!(chains.len(), 2);
        assert!(!chains[0].is_catch_all());
        assert!(chains[1].is_catch_all());
    }

    struct FailingPlugin;
    impl Plugin for FailingPlugin {
        fn on_outbound_chain(
            &self,
            _ctx: &ChainContext<'_>,
            _chain: &mut ChainHandle<'_>,
        ) -> Result<()> {
            Err(Error::plugin("refused"))
        }

        fn on_inbound_chain(
            &self,
            _ctx: &ChainContext<'_>,
            chain: &mut ChainHandle<'_>,
        ) -> Result<()> {
            chain.push_network_filter(tcp_proxy_filter("junk", None));
            Err(Error::plugin("refused"))
        }
    }

    #[test]
    fn outbound_plugin_error_propagates() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(FailingPlugin)];
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &plugins, quotas: None };
        let err = builder
            .http_chain(&ctx(Direction::Outbound), http_opts(Direction::Outbound))
            .unwrap_err();
        assert!(matches!(err, Error::Plugin(_)));
    }

    #[test]
    fn inbound_plugin_error_rolls_back_contributions() {
        let mesh = MeshConfig::default();
        let p = proxy();
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(FailingPlugin)];
        let builder = ChainBuilder { mesh: &mesh, proxy: &p, plugins: &plugins, quotas: None };
        let chain =
            builder.http_chain(&ctx(Direction::Inbound), http_opts(Direction::Inbound)).unwrap();
        // Only the connection manager survives; the plugin's junk filter is
        // rolled back.
        assert_eq!(chain.filters.len(), 1);
        assert_eq!(chain.filters[0].name, HTTP_CONNECTION_MANAGER_FILTER_NAME);
    }

    #[test]
    fn plaintext_alpns_differ_from_mtls_alpns() {
        assert_ne!(*PLAINTEXT_HTTP_ALPNS, *MTLS_HTTP_ALPNS);
    }
}
