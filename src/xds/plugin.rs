//! Extension plugin contract.
//!
//! Plugins are a fixed, ordered list of capability objects supplied by the
//! embedding control plane. For every chain under construction they are
//! invoked in registration order with an append-only [`ChainHandle`]: a
//! plugin may add network or HTTP filters but cannot reorder them or touch
//! the chain's match predicate. Failures are isolated per listener: an
//! outbound plugin error aborts that single listener, an inbound error drops
//! the plugin contribution and keeps the listener.

use envoy_types::pb::envoy::config::listener::v3::Filter;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::HttpFilter;

use crate::errors::Result;

use super::chain::BuiltChain;
use super::shape::ListenerShape;
use super::Direction;

/// Immutable description of the chain a plugin is being offered.
#[derive(Debug, Clone, Copy)]
pub struct ChainContext<'a> {
    pub direction: Direction,
    pub shape: ListenerShape,
    pub port: u16,
    /// FQDN of the resolved destination service, when one resolved.
    pub service_hostname: Option<&'a str>,
}

/// Append-only view of a chain under construction.
///
/// HTTP appends only take effect on HTTP-shaped chains; on TCP chains the
/// HTTP pipeline does not exist and such appends are discarded.
pub struct ChainHandle<'a> {
    pub(crate) http: &'a mut Vec<HttpFilter>,
    pub(crate) network: &'a mut Vec<Filter>,
}

impl ChainHandle<'_> {
    /// Append an HTTP filter after the built-in pipeline head.
    pub fn push_http_filter(&mut self, filter: HttpFilter) {
        self.http.push(filter);
    }

    /// Append a network filter ahead of the terminal proxy filter.
    pub fn push_network_filter(&mut self, filter: Filter) {
        self.network.push(filter);
    }
}

/// One registered extension.
///
/// All hooks default to no-ops so implementations only override the paths
/// they care about.
pub trait Plugin {
    /// Offered every outbound chain before finalization. An error aborts the
    /// listener being built, not the whole push.
    fn on_outbound_chain(&self, _ctx: &ChainContext<'_>, _chain: &mut ChainHandle<'_>) -> Result<()> {
        Ok(())
    }

    /// Offered every inbound chain before finalization. An error is logged
    /// and the listener is built without plugin contributions.
    fn on_inbound_chain(&self, _ctx: &ChainContext<'_>, _chain: &mut ChainHandle<'_>) -> Result<()> {
        Ok(())
    }

    /// Extra discriminated chains for inbound traffic that matches no
    /// explicit service chain (e.g. a dedicated TLS chain with its own match
    /// and TLS context). Contributed chains are merged after the built-in
    /// ones; a contributed catch-all replaces the built-in catch-all.
    fn on_passthrough_chains(&self, _ctx: &ChainContext<'_>) -> Result<Vec<BuiltChain>> {
        Ok(Vec::new())
    }
}
