//! Registry snapshot: services, ports and endpoint instances.
//!
//! These types are read-only inputs to the synthesizer. The registry is
//! captured once per configuration push; nothing here is mutated by
//! chain-building code. Input order of `services` is meaningful: it breaks
//! creation-time ties during port-conflict resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wildcard IPv4 address used by services without a virtual IP.
pub const WILDCARD_ADDRESS: &str = "0.0.0.0";

/// How the data plane reaches a service's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The proxy load-balances across endpoints itself.
    #[default]
    ClientSideLb,
    /// Connections are passed through to the original destination (headless
    /// services); listeners are generated per backing instance.
    Passthrough,
}

/// One declared port of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub number: u16,
    /// Declared protocol string; may be empty or unrecognized.
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub name: String,
}

/// An entry in the service registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub hostname: String,
    #[serde(default)]
    pub namespace: String,
    /// Virtual IP, a CIDR block, or [`WILDCARD_ADDRESS`] for services without
    /// a VIP.
    pub address: String,
    pub creation_time: DateTime<Utc>,
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub resolution: Resolution,
}

impl Service {
    /// Whether the service has no concrete virtual IP.
    pub fn is_wildcard(&self) -> bool {
        self.address.is_empty() || self.address == WILDCARD_ADDRESS || self.address == "::"
    }

    /// The declared port with the given number, if any.
    pub fn port(&self, number: u16) -> Option<&ServicePort> {
        self.ports.iter().find(|p| p.number == number)
    }
}

/// A concrete endpoint backing a service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// One service instance known to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// FQDN of the owning service.
    pub service_hostname: String,
    /// The service port this instance serves.
    pub port: ServicePort,
    pub endpoint: Endpoint,
}

/// Immutable registry snapshot handed to the synthesizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub services: Vec<Service>,
    pub instances: Vec<ServiceInstance>,
}

impl Registry {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services, instances: Vec::new() }
    }

    /// Instances backing a specific service port.
    pub fn instances_of<'a>(
        &'a self,
        hostname: &'a str,
        port: u16,
    ) -> impl Iterator<Item = &'a ServiceInstance> + 'a {
        self.instances
            .iter()
            .filter(move |i| i.service_hostname == hostname && i.port.number == port)
    }

    pub fn service(&self, hostname: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.hostname == hostname)
    }
}
