//! Top-level orchestration of one listener computation.
//!
//! [`ListenerBuilder`] sequences the stages of a configuration push for one
//! proxy: inbound listeners, scope-filtered outbound listeners, the explicit
//! HTTP proxy listener when the mesh designates a port, and the virtual
//! catch-all outbound listener. Listener names must be unique within a
//! proxy's configuration; a newly produced listener whose name collides with
//! an earlier one is dropped and recorded, never silently overwritten.

use std::collections::BTreeSet;

use envoy_types::pb::envoy::config::listener::v3::Listener;
use tracing::{debug, warn};

use crate::config::MeshConfig;
use crate::model::{Proxy, QuotaSet, Registry, VirtualService};

use super::inbound::InboundAssembler;
use super::outbound::OutboundAssembler;
use super::plugin::Plugin;

/// Result of one listener computation.
#[derive(Debug, Default)]
pub struct Synthesis {
    /// The finished listener set, in generation order.
    pub listeners: Vec<Listener>,
    /// Names of listeners dropped due to name collisions. Non-fatal; the
    /// push continues without them.
    pub dropped: Vec<String>,
}

/// Pure, single-threaded listener computation over immutable snapshots.
///
/// Every input is borrowed for the duration of one [`build`](Self::build)
/// call and never mutated. Callers running many proxies in parallel give
/// each worker its own builder; no shared state exists between computations.
pub struct ListenerBuilder<'a> {
    proxy: &'a Proxy,
    registry: &'a Registry,
    mesh: &'a MeshConfig,
    virtual_services: &'a [VirtualService],
    quotas: Option<&'a QuotaSet>,
    plugins: &'a [Box<dyn Plugin>],
}

impl<'a> ListenerBuilder<'a> {
    pub fn new(proxy: &'a Proxy, registry: &'a Registry, mesh: &'a MeshConfig) -> Self {
        Self { proxy, registry, mesh, virtual_services: &[], quotas: None, plugins: &[] }
    }

    pub fn with_virtual_services(mut self, virtual_services: &'a [VirtualService]) -> Self {
        self.virtual_services = virtual_services;
        self
    }

    pub fn with_quotas(mut self, quotas: &'a QuotaSet) -> Self {
        self.quotas = Some(quotas);
        self
    }

    pub fn with_plugins(mut self, plugins: &'a [Box<dyn Plugin>]) -> Self {
        self.plugins = plugins;
        self
    }

    /// Compute the full listener set for this proxy.
    pub fn build(&self) -> Synthesis {
        let inbound = InboundAssembler {
            proxy: self.proxy,
            mesh: self.mesh,
            plugins: self.plugins,
            quotas: self.quotas,
        };
        let outbound = OutboundAssembler {
            proxy: self.proxy,
            registry: self.registry,
            mesh: self.mesh,
            virtual_services: self.virtual_services,
            quotas: self.quotas,
            plugins: self.plugins,
        };

        let mut synthesis = Synthesis::default();
        let mut names = BTreeSet::new();

        for listener in inbound.build() {
            accumulate(&mut synthesis, &mut names, listener);
        }
        for listener in outbound.build() {
            accumulate(&mut synthesis, &mut names, listener);
        }
        if let Some(listener) = outbound.http_proxy_listener() {
            accumulate(&mut synthesis, &mut names, listener);
        }
        accumulate(&mut synthesis, &mut names, outbound.virtual_outbound_listener());

        debug!(
            proxy = %self.proxy.id,
            listeners = synthesis.listeners.len(),
            dropped = synthesis.dropped.len(),
            "listener computation complete"
        );
        synthesis
    }
}

fn accumulate(synthesis: &mut Synthesis, names: &mut BTreeSet<String>, listener: Listener) {
    if names.insert(listener.name.clone()) {
        synthesis.listeners.push(listener);
    } else {
        warn!(name = %listener.name, "listener name collision; dropping listener");
        synthesis.dropped.push(listener.name);
    }
}
