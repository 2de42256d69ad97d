//! Inbound listener assembly.
//!
//! One listener per proxy-exposed port: the union of service-instance
//! endpoint ports and explicit sidecar-ingress entries, ingress winning when
//! both declare the same port. Every listener discriminates mesh mTLS from
//! plaintext purely on transport protocol and ALPN; inbound matches never use
//! CIDRs.

use std::collections::BTreeMap;

use envoy_types::pb::envoy::config::core::v3::TrafficDirection;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::google::protobuf::Duration;
use tracing::warn;

use crate::config::MeshConfig;
use crate::errors::Result;
use crate::model::{AppProtocol, Proxy, QuotaSet};

use super::chain::{
    merge_chains, mtls_tls_context, sort_catch_all_last, BuiltChain, ChainBuilder, HttpChainOpts,
    RouteSpec,
};
use super::chain_match::{ChainMatch, MTLS_HTTP_ALPNS, MTLS_TCP_ALPNS};
use super::filters::inspector_listener_filters;
use super::plugin::{ChainContext, Plugin};
use super::shape::ListenerShape;
use super::{cluster_name, listener_name, socket_address, Direction};

/// One port the proxy exposes, after merging instances and ingress entries.
#[derive(Debug, Clone)]
struct InboundTarget {
    bind: String,
    protocol: AppProtocol,
    grpc: bool,
    /// FQDN of the backing service; empty for bare ingress entries.
    hostname: String,
}

pub(crate) struct InboundAssembler<'a> {
    pub proxy: &'a Proxy,
    pub mesh: &'a MeshConfig,
    pub plugins: &'a [Box<dyn Plugin>],
    pub quotas: Option<&'a QuotaSet>,
}

impl<'a> InboundAssembler<'a> {
    pub fn build(&self) -> Vec<Listener> {
        let targets = self.collect_targets();
        let mut listeners = Vec::with_capacity(targets.len());
        for (port, target) in targets {
            match self.build_listener(port, &target) {
                Ok(listener) => listeners.push(listener),
                Err(err) => {
                    warn!(port, error = %err, "skipping inbound listener");
                }
            }
        }
        listeners
    }

    /// Union of instance endpoint ports and sidecar-ingress ports, keyed by
    /// port number. Ingress entries are applied second and win on collision.
    fn collect_targets(&self) -> BTreeMap<u16, InboundTarget> {
        let mut targets = BTreeMap::new();

        for instance in &self.proxy.service_instances {
            let protocol = AppProtocol::parse(&instance.port.protocol);
            targets.insert(
                instance.endpoint.port,
                InboundTarget {
                    bind: self.proxy.primary_address().to_string(),
                    protocol,
                    grpc: protocol.is_grpc(),
                    hostname: instance.service_hostname.clone(),
                },
            );
        }

        for ingress in &self.proxy.scope.ingress {
            let protocol = AppProtocol::parse(&ingress.port.protocol);
            let hostname = self
                .proxy
                .service_instances
                .iter()
                .find(|i| i.endpoint.port == ingress.port.number)
                .map(|i| i.service_hostname.clone())
                .unwrap_or_default();
            targets.insert(
                ingress.port.number,
                InboundTarget {
                    bind: ingress
                        .bind
                        .clone()
                        .unwrap_or_else(|| self.proxy.primary_address().to_string()),
                    protocol,
                    grpc: protocol.is_grpc(),
                    hostname,
                },
            );
        }

        targets
    }

    fn build_listener(&self, port: u16, target: &InboundTarget) -> Result<Listener> {
        let shape = ListenerShape::resolve(target.protocol, Direction::Inbound, self.mesh);
        let builder = ChainBuilder {
            mesh: self.mesh,
            proxy: self.proxy,
            plugins: self.plugins,
            quotas: self.quotas,
        };
        let ctx = ChainContext {
            direction: Direction::Inbound,
            shape,
            port,
            service_hostname: (!target.hostname.is_empty()).then_some(target.hostname.as_str()),
        };
        let cluster = cluster_name(Direction::Inbound, port, &target.hostname);

        let mut chains = match shape {
            ListenerShape::Http => self.http_chains(&builder, &ctx, port, target, &cluster)?,
            ListenerShape::Auto => {
                let mut chains = self.http_chains(&builder, &ctx, port, target, &cluster)?;
                chains.extend(self.tcp_chains(&builder, &ctx, &cluster, true)?);
                chains
            }
            // Database and RPC protocols terminate at the local workload;
            // inbound they are plain TCP chains.
            ListenerShape::Tcp | ListenerShape::Mysql | ListenerShape::Thrift => {
                self.tcp_chains(&builder, &ctx, &cluster, false)?
            }
        };

        // Passthrough hook: plugins may contribute discriminated chains for
        // traffic without an explicit service chain; a contributed catch-all
        // takes the final slot.
        for plugin in self.plugins {
            match plugin.on_passthrough_chains(&ctx) {
                Ok(extra) => merge_chains(&mut chains, extra),
                Err(err) => {
                    warn!(port, error = %err, "inbound passthrough plugin failed; ignoring");
                }
            }
        }

        sort_catch_all_last(&mut chains);

        let mut listener = Listener {
            name: listener_name(&target.bind, port),
            address: Some(socket_address(&target.bind, port)),
            filter_chains: chains.into_iter().map(BuiltChain::into_envoy).collect(),
            traffic_direction: TrafficDirection::Inbound as i32,
            ..Default::default()
        };
        if shape.needs_inspectors() {
            listener.listener_filters = inspector_listener_filters();
            listener.listener_filters_timeout = Some(detection_timeout(self.mesh));
            listener.continue_on_listener_filters_timeout = true;
        }
        Ok(listener)
    }

    /// The two discriminated HTTP chains, mTLS first, then plaintext. The
    /// plaintext chain never carries the outbound-only ALPN override filter.
    fn http_chains(
        &self,
        builder: &ChainBuilder<'_>,
        ctx: &ChainContext<'_>,
        port: u16,
        target: &InboundTarget,
        cluster: &str,
    ) -> Result<Vec<BuiltChain>> {
        let route = RouteSpec::Inline {
            name: format!("inbound|{}", port),
            cluster: cluster.to_string(),
        };
        let mtls = builder.http_chain(
            ctx,
            HttpChainOpts {
                route: route.clone(),
                bind: target.bind.clone(),
                port,
                grpc: target.grpc,
                tls: Some(mtls_tls_context(&MTLS_HTTP_ALPNS)),
                chain_match: Some(ChainMatch::http_mtls()),
            },
        )?;
        let plaintext = builder.http_chain(
            ctx,
            HttpChainOpts {
                route,
                bind: target.bind.clone(),
                port,
                grpc: target.grpc,
                tls: None,
                chain_match: Some(ChainMatch::http_plaintext()),
            },
        )?;
        Ok(vec![mtls, plaintext])
    }

    /// TCP chains: mTLS first, then the plaintext catch-all. Sniffed ports
    /// additionally discriminate a TLS passthrough chain, since non-mesh TLS
    /// is only observable once the inspectors run.
    fn tcp_chains(
        &self,
        builder: &ChainBuilder<'_>,
        ctx: &ChainContext<'_>,
        cluster: &str,
        tls_passthrough: bool,
    ) -> Result<Vec<BuiltChain>> {
        let mut chains = vec![builder.tcp_chain(
            ctx,
            cluster,
            Some(ChainMatch::tcp_mtls()),
            Some(mtls_tls_context(&MTLS_TCP_ALPNS)),
        )?];
        if tls_passthrough {
            chains.push(builder.tcp_chain(ctx, cluster, Some(ChainMatch::tls_passthrough()), None)?);
        }
        chains.push(builder.tcp_chain(ctx, cluster, None, None)?);
        Ok(chains)
    }
}

pub(crate) fn detection_timeout(mesh: &MeshConfig) -> Duration {
    let ms = mesh.protocol_detection_timeout_ms;
    Duration { seconds: (ms / 1_000) as i64, nanos: ((ms % 1_000) * 1_000_000) as i32 }
}
