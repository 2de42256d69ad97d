//! Outbound listener assembly.
//!
//! The assembler walks the proxy's egress scope, groups candidate services by
//! `(bind, port)` conflict key, resolves protocol disagreements (oldest
//! service wins when sniffing is off, discriminated dual chains when it is
//! on), splits TCP chains per virtual-service CIDR and finalizes one listener
//! per key. The virtual catch-all listener and the explicit HTTP proxy
//! listener are also built here, sequenced by the orchestrator.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use envoy_types::pb::envoy::config::core::v3::TrafficDirection;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use tracing::{debug, warn};

use crate::config::{MeshConfig, OutboundTrafficPolicy};
use crate::errors::Result;
use crate::model::{
    AppProtocol, CaptureMode, EgressSpec, Proxy, QuotaSet, Registry, Resolution, Service,
    ServicePort, VirtualService,
};

use super::chain::{
    merge_chains, sort_catch_all_last, BuiltChain, ChainBuilder, HttpChainOpts, RouteSpec,
};
use super::chain_match::{ChainMatch, CidrSpec};
use super::filters::network::tcp_proxy_filter;
use super::filters::{access_log, inspector_listener_filters};
use super::inbound::detection_timeout;
use super::plugin::{ChainContext, Plugin};
use super::shape::ListenerShape;
use super::{
    cluster_name, listener_name, socket_address, Direction, BLACK_HOLE_CLUSTER,
    HTTP_PROXY_ROUTE_NAME, PASSTHROUGH_CLUSTER, VIRTUAL_OUTBOUND_LISTENER_NAME,
};

/// Fallthrough cluster selected by the mesh outbound traffic policy.
pub fn fallthrough_cluster(policy: OutboundTrafficPolicy) -> &'static str {
    match policy {
        OutboundTrafficPolicy::AllowAny => PASSTHROUGH_CLUSTER,
        OutboundTrafficPolicy::RegistryOnly => BLACK_HOLE_CLUSTER,
    }
}

/// Port-conflict key: at most one listener is produced per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BindPort {
    bind: String,
    port: u16,
}

/// One service competing for a conflict key.
#[derive(Debug, Clone)]
struct Candidate<'a> {
    service: &'a Service,
    port: ServicePort,
    /// Position in the registry input; breaks creation-time ties.
    index: usize,
}

impl Candidate<'_> {
    fn protocol(&self, declared: Option<AppProtocol>) -> AppProtocol {
        declared.unwrap_or_else(|| AppProtocol::parse(&self.port.protocol))
    }
}

#[derive(Debug, Default)]
struct Entry<'a> {
    candidates: Vec<Candidate<'a>>,
    /// Protocol declared by an explicit egress spec, overriding the services'
    /// own declarations for this key.
    declared: Option<AppProtocol>,
}

pub(crate) struct OutboundAssembler<'a> {
    pub proxy: &'a Proxy,
    pub registry: &'a Registry,
    pub mesh: &'a MeshConfig,
    pub virtual_services: &'a [VirtualService],
    pub quotas: Option<&'a QuotaSet>,
    pub plugins: &'a [Box<dyn Plugin>],
}

impl<'a> OutboundAssembler<'a> {
    pub fn build(&self) -> Vec<Listener> {
        let entries = self.collect_entries();
        let mut listeners = Vec::with_capacity(entries.len());

        for (key, entry) in entries {
            let (mut chains, inspectors) = match self.chains_for_entry(&key, &entry) {
                Ok(built) => built,
                Err(err) => {
                    warn!(bind = %key.bind, port = key.port, error = %err,
                        "skipping outbound listener");
                    continue;
                }
            };
            if chains.is_empty() {
                debug!(bind = %key.bind, port = key.port, "no chains resolved; no listener");
                continue;
            }
            sort_catch_all_last(&mut chains);

            let mut listener = Listener {
                name: listener_name(&key.bind, key.port),
                address: Some(socket_address(&key.bind, key.port)),
                filter_chains: chains.into_iter().map(BuiltChain::into_envoy).collect(),
                traffic_direction: TrafficDirection::Outbound as i32,
                ..Default::default()
            };
            if inspectors {
                listener.listener_filters = inspector_listener_filters();
                listener.listener_filters_timeout = Some(detection_timeout(self.mesh));
                listener.continue_on_listener_filters_timeout = true;
            }
            listeners.push(listener);
        }
        listeners
    }

    /// Group candidate services by conflict key, applying scope restrictions.
    fn collect_entries(&self) -> BTreeMap<BindPort, Entry<'a>> {
        let implicit = vec![EgressSpec::default()];
        let specs: &[EgressSpec] =
            if self.proxy.scope.egress.is_empty() { &implicit } else { &self.proxy.scope.egress };
        let (wildcard, localhost) = self.proxy.wildcard_and_localhost();

        let mut entries: BTreeMap<BindPort, Entry<'a>> = BTreeMap::new();
        for spec in specs {
            let default_bind = match spec.capture_mode {
                CaptureMode::None => localhost,
                CaptureMode::Default => wildcard,
            };
            let matching = self
                .registry
                .services
                .iter()
                .enumerate()
                .filter(|(_, s)| spec.selects(&s.namespace, &s.hostname));

            match &spec.port {
                Some(port_spec) => {
                    let bind = spec.bind.clone().unwrap_or_else(|| default_bind.to_string());
                    let key = BindPort { bind, port: port_spec.number };
                    let entry = entries.entry(key).or_default();
                    entry.declared = Some(AppProtocol::parse(&port_spec.protocol));
                    for (index, service) in matching {
                        let port = match service.port(port_spec.number) {
                            Some(port) => port.clone(),
                            None => continue,
                        };
                        push_candidate(entry, Candidate { service, port, index });
                    }
                }
                None => {
                    for (index, service) in matching {
                        for port in &service.ports {
                            self.add_service_port(
                                &mut entries,
                                spec,
                                default_bind,
                                service,
                                port,
                                index,
                            );
                        }
                    }
                }
            }
        }
        entries
    }

    fn add_service_port(
        &self,
        entries: &mut BTreeMap<BindPort, Entry<'a>>,
        spec: &EgressSpec,
        default_bind: &str,
        service: &'a Service,
        port: &ServicePort,
        index: usize,
    ) {
        // Pass-through services with known instances get one listener per
        // backing endpoint, excluding the proxy itself.
        let mut instance_addresses: Vec<&str> = Vec::new();
        if service.resolution == Resolution::Passthrough {
            instance_addresses = self
                .registry
                .instances_of(&service.hostname, port.number)
                .map(|i| i.endpoint.address.as_str())
                .filter(|addr| !self.proxy.owns_address(addr))
                .collect();
        }

        if !instance_addresses.is_empty() {
            for address in instance_addresses {
                let key = BindPort { bind: address.to_string(), port: port.number };
                let entry = entries.entry(key).or_default();
                push_candidate(entry, Candidate { service, port: port.clone(), index });
            }
            return;
        }

        let bind = spec.bind.clone().unwrap_or_else(|| {
            if service.address.parse::<IpAddr>().is_ok() && !service.is_wildcard() {
                service.address.clone()
            } else {
                default_bind.to_string()
            }
        });
        let key = BindPort { bind, port: port.number };
        let entry = entries.entry(key).or_default();
        push_candidate(entry, Candidate { service, port: port.clone(), index });
    }

    /// Resolve the chains for one conflict key. Returns the chains plus
    /// whether inspector listener filters are required.
    fn chains_for_entry(
        &self,
        key: &BindPort,
        entry: &Entry<'a>,
    ) -> Result<(Vec<BuiltChain>, bool)> {
        let mut candidates = entry.candidates.clone();
        // Stable sort by creation time; input order breaks ties, so the
        // oldest service is deterministic even for equal timestamps.
        candidates.sort_by(|a, b| {
            (a.service.creation_time, a.index).cmp(&(b.service.creation_time, b.index))
        });

        let builder = ChainBuilder {
            mesh: self.mesh,
            proxy: self.proxy,
            plugins: self.plugins,
            quotas: self.quotas,
        };

        // A forward-proxy port routes by port name alone; it needs no
        // resolved destination and never sniffs.
        if entry.declared == Some(AppProtocol::HttpProxy) {
            let ctx = ChainContext {
                direction: Direction::Outbound,
                shape: ListenerShape::Http,
                port: key.port,
                service_hostname: None,
            };
            let chain = builder.http_chain(
                &ctx,
                HttpChainOpts {
                    route: RouteSpec::Rds(key.port.to_string()),
                    bind: key.bind.clone(),
                    port: key.port,
                    grpc: false,
                    tls: None,
                    chain_match: None,
                },
            )?;
            return Ok((vec![chain], false));
        }

        // An explicit egress port with no matching service has no
        // destination to route to and produces no listener.
        if candidates.is_empty() {
            return Ok((Vec::new(), false));
        }

        let sniffing = self.mesh.protocol_sniffing_outbound;
        let shapes: Vec<ListenerShape> = candidates
            .iter()
            .map(|c| {
                ListenerShape::resolve(c.protocol(entry.declared), Direction::Outbound, self.mesh)
            })
            .collect();
        let oldest = &candidates[0];
        let oldest_shape = shapes[0];

        let unanimous = shapes.iter().all(|s| *s == oldest_shape);
        if !sniffing || (unanimous && oldest_shape != ListenerShape::Auto) {
            if !sniffing && !unanimous {
                debug!(bind = %key.bind, port = key.port, winner = %oldest.service.hostname,
                    "protocol conflict resolved by oldest service");
            }
            return self.single_shape_chains(
                key,
                &builder,
                oldest_shape,
                entry.declared,
                oldest,
                &candidates,
            );
        }

        // Candidates disagree (or the protocol is unknown) and sniffing is
        // on: discriminated HTTP chain plus TCP chains, fronted by the TLS
        // and HTTP inspectors.
        let ctx = ChainContext {
            direction: Direction::Outbound,
            shape: ListenerShape::Auto,
            port: key.port,
            service_hostname: Some(oldest.service.hostname.as_str()),
        };
        let mut chains = self.tcp_chains(key, &builder, &ctx, &candidates)?;
        let http = builder.http_chain(
            &ctx,
            HttpChainOpts {
                route: RouteSpec::Rds(self.rds_name(key, oldest)),
                bind: key.bind.clone(),
                port: key.port,
                grpc: false,
                tls: None,
                chain_match: Some(ChainMatch::http_plaintext()),
            },
        )?;
        merge_chains(&mut chains, vec![http]);
        Ok((chains, true))
    }

    fn single_shape_chains(
        &self,
        key: &BindPort,
        builder: &ChainBuilder<'_>,
        shape: ListenerShape,
        declared: Option<AppProtocol>,
        oldest: &Candidate<'a>,
        candidates: &[Candidate<'a>],
    ) -> Result<(Vec<BuiltChain>, bool)> {
        let ctx = ChainContext {
            direction: Direction::Outbound,
            shape,
            port: key.port,
            service_hostname: Some(oldest.service.hostname.as_str()),
        };
        let cluster = cluster_name(Direction::Outbound, key.port, &oldest.service.hostname);

        let chains = match shape {
            ListenerShape::Http => {
                let grpc = oldest.protocol(declared).is_grpc();
                vec![builder.http_chain(
                    &ctx,
                    HttpChainOpts {
                        route: RouteSpec::Rds(self.rds_name(key, oldest)),
                        bind: key.bind.clone(),
                        port: key.port,
                        grpc,
                        tls: None,
                        chain_match: None,
                    },
                )?]
            }
            ListenerShape::Tcp | ListenerShape::Auto => {
                self.tcp_chains(key, builder, &ctx, candidates)?
            }
            ListenerShape::Mysql => vec![builder.mysql_chain(&ctx, &cluster)?],
            ListenerShape::Thrift => {
                vec![builder.thrift_chain(&ctx, &cluster, &oldest.service.hostname)?]
            }
        };
        Ok((chains, false))
    }

    /// TCP chains for one key: virtual-service CIDR chains first, then
    /// per-candidate CIDR chains, deduplicated by CIDR literal (first seen
    /// wins), and finally a catch-all to the oldest directly-bound
    /// destination when one exists.
    fn tcp_chains(
        &self,
        key: &BindPort,
        builder: &ChainBuilder<'_>,
        ctx: &ChainContext<'_>,
        candidates: &[Candidate<'a>],
    ) -> Result<Vec<BuiltChain>> {
        let mut chains = Vec::new();
        let mut seen = BTreeSet::new();
        let wildcard_bind = is_wildcard_bind(&key.bind);

        for vs in self.virtual_services {
            for route in &vs.tcp_routes {
                let destination = match route.destinations.first() {
                    Some(d) => d,
                    None => continue,
                };
                let cluster =
                    cluster_name(Direction::Outbound, destination.port, &destination.host);
                for rule in &route.matches {
                    if rule.port.map_or(false, |p| p != key.port) {
                        continue;
                    }
                    for subnet in &rule.destination_subnets {
                        let cidr = CidrSpec::parse(subnet)?;
                        if seen.insert(format!("{}/{}", cidr.address_prefix, cidr.prefix_len)) {
                            chains.push(builder.tcp_chain(
                                ctx,
                                &cluster,
                                Some(ChainMatch::for_cidrs(vec![cidr])),
                                None,
                            )?);
                        }
                    }
                }
            }
        }

        let mut default_destination: Option<&Candidate<'a>> = None;
        for candidate in candidates {
            if wildcard_bind && !candidate.service.is_wildcard() {
                let cidr = CidrSpec::parse(&candidate.service.address)?;
                let cluster = cluster_name(
                    Direction::Outbound,
                    key.port,
                    &candidate.service.hostname,
                );
                if seen.insert(format!("{}/{}", cidr.address_prefix, cidr.prefix_len)) {
                    chains.push(builder.tcp_chain(
                        ctx,
                        &cluster,
                        Some(ChainMatch::for_cidrs(vec![cidr])),
                        None,
                    )?);
                }
            } else if default_destination.is_none() {
                // Candidates are sorted, so the first direct destination is
                // the oldest.
                default_destination = Some(candidate);
            }
        }

        if let Some(candidate) = default_destination {
            let cluster =
                cluster_name(Direction::Outbound, key.port, &candidate.service.hostname);
            chains.push(builder.tcp_chain(ctx, &cluster, None, None)?);
        }
        Ok(chains)
    }

    fn rds_name(&self, key: &BindPort, oldest: &Candidate<'a>) -> String {
        if key.bind == oldest.service.address {
            format!("{}:{}", oldest.service.hostname, key.port)
        } else {
            key.port.to_string()
        }
    }

    /// The explicit HTTP proxy listener, when the mesh designates a port.
    pub fn http_proxy_listener(&self) -> Option<Listener> {
        let port = self.mesh.proxy_http_port?;
        let (_, localhost) = self.proxy.wildcard_and_localhost();
        let builder = ChainBuilder {
            mesh: self.mesh,
            proxy: self.proxy,
            plugins: self.plugins,
            quotas: self.quotas,
        };
        let ctx = ChainContext {
            direction: Direction::Outbound,
            shape: ListenerShape::Http,
            port,
            service_hostname: None,
        };
        let chain = match builder.http_chain(
            &ctx,
            HttpChainOpts {
                route: RouteSpec::Rds(HTTP_PROXY_ROUTE_NAME.to_string()),
                bind: localhost.to_string(),
                port,
                grpc: false,
                tls: None,
                chain_match: None,
            },
        ) {
            Ok(chain) => chain,
            Err(err) => {
                warn!(port, error = %err, "skipping HTTP proxy listener");
                return None;
            }
        };
        Some(Listener {
            name: listener_name(localhost, port),
            address: Some(socket_address(localhost, port)),
            filter_chains: vec![chain.into_envoy()],
            traffic_direction: TrafficDirection::Outbound as i32,
            ..Default::default()
        })
    }

    /// The fixed virtual catch-all outbound listener. Its single TCP chain
    /// forwards to the policy fallthrough cluster and carries the mesh
    /// access-log configuration, rebuilt from the snapshot on every push.
    pub fn virtual_outbound_listener(&self) -> Listener {
        let (wildcard, _) = self.proxy.wildcard_and_localhost();
        let cluster = fallthrough_cluster(self.mesh.outbound_traffic_policy);
        let chain = BuiltChain {
            chain_match: None,
            tls: None,
            filters: vec![tcp_proxy_filter(cluster, access_log(self.mesh))],
        };
        Listener {
            name: VIRTUAL_OUTBOUND_LISTENER_NAME.to_string(),
            address: Some(socket_address(wildcard, self.mesh.virtual_outbound_port)),
            filter_chains: vec![chain.into_envoy()],
            traffic_direction: TrafficDirection::Outbound as i32,
            ..Default::default()
        }
    }
}

fn push_candidate<'a>(entry: &mut Entry<'a>, candidate: Candidate<'a>) {
    let duplicate = entry.candidates.iter().any(|c| {
        c.service.hostname == candidate.service.hostname && c.port.number == candidate.port.number
    });
    if !duplicate {
        entry.candidates.push(candidate);
    }
}

fn is_wildcard_bind(bind: &str) -> bool {
    bind == "0.0.0.0" || bind == "::"
}
