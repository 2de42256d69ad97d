//! Quota specs and bindings driving RPC rate-limit filter attachment.
//!
//! Rate-limit *decisions* are made by an external service; the synthesizer
//! only decides whether a chain carries the rate-limit filter at all, by
//! resolving a binding for the destination FQDN. A missing binding is not an
//! error, it simply means no filter.

use serde::{Deserialize, Serialize};

/// A named quota specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSpec {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Binds quota specs to services by FQDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaBinding {
    /// Service FQDNs the bound specs apply to.
    pub services: Vec<String>,
    /// Names of bound [`QuotaSpec`]s.
    pub quota_specs: Vec<String>,
}

/// The full quota configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaSet {
    #[serde(default)]
    pub specs: Vec<QuotaSpec>,
    #[serde(default)]
    pub bindings: Vec<QuotaBinding>,
}

impl QuotaSet {
    /// Resolve the quota spec bound to a service FQDN, if any. Requires both
    /// a binding naming the service and a spec matching the binding.
    pub fn resolve(&self, fqdn: &str) -> Option<&QuotaSpec> {
        self.bindings
            .iter()
            .filter(|b| b.services.iter().any(|s| s == fqdn))
            .flat_map(|b| b.quota_specs.iter())
            .find_map(|name| self.specs.iter().find(|s| &s.name == name))
    }
}
