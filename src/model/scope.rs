//! Per-proxy listener scope: sidecar ingress/egress specifications.

use serde::{Deserialize, Serialize};

/// Traffic interception mode of an egress listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Traffic is redirected to the proxy by the mesh's interception layer.
    #[default]
    Default,
    /// No interception; the listener binds where the application dials it,
    /// defaulting to localhost when no bind override is given.
    None,
}

/// Port declaration inside a scope listener spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub number: u16,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub name: String,
}

/// Selector of visible services, in `namespace/hostname` form. `*` wildcards
/// either side; a bare `hostname` means "any namespace".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSelector(pub String);

impl HostSelector {
    pub fn matches(&self, namespace: &str, hostname: &str) -> bool {
        let (ns_pat, host_pat) = match self.0.split_once('/') {
            Some((ns, host)) => (ns, host),
            None => ("*", self.0.as_str()),
        };
        let ns_ok = ns_pat == "*" || ns_pat == namespace;
        let host_ok = host_pat == "*"
            || host_pat == hostname
            || (host_pat.starts_with("*.") && hostname.ends_with(&host_pat[1..]));
        ns_ok && host_ok
    }
}

/// One egress listener spec restricting outbound visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressSpec {
    /// Explicit listener port; when absent the spec exposes every matching
    /// service on its declared ports.
    #[serde(default)]
    pub port: Option<PortSpec>,
    /// Bind address override.
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub capture_mode: CaptureMode,
    /// Services visible through this spec.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostSelector>,
}

impl EgressSpec {
    pub fn selects(&self, namespace: &str, hostname: &str) -> bool {
        self.hosts.iter().any(|h| h.matches(namespace, hostname))
    }
}

impl Default for EgressSpec {
    fn default() -> Self {
        Self { port: None, bind: None, capture_mode: CaptureMode::Default, hosts: default_hosts() }
    }
}

/// One ingress listener spec exposing a workload port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressSpec {
    pub port: PortSpec,
    /// Bind address override; defaults to the proxy's primary address.
    #[serde(default)]
    pub bind: Option<String>,
    /// Loopback endpoint the workload actually listens on. Consumed by the
    /// cluster generator; listeners only carry the port's cluster name.
    #[serde(default)]
    pub default_endpoint: Option<String>,
}

/// The proxy's listener scope. An empty egress list means "everything in the
/// registry is visible".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub ingress: Vec<IngressSpec>,
    #[serde(default)]
    pub egress: Vec<EgressSpec>,
}

fn default_hosts() -> Vec<HostSelector> {
    vec![HostSelector("*/*".into())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_selector_wildcards() {
        assert!(HostSelector("*/*".into()).matches("default", "a.default.svc"));
        assert!(HostSelector("default/*".into()).matches("default", "a.default.svc"));
        assert!(!HostSelector("default/*".into()).matches("prod", "a.prod.svc"));
        assert!(HostSelector("default/a.default.svc".into()).matches("default", "a.default.svc"));
        assert!(HostSelector("*/*.default.svc".into()).matches("default", "a.default.svc"));
        assert!(!HostSelector("*/*.prod.svc".into()).matches("default", "a.default.svc"));
    }

    #[test]
    fn egress_spec_defaults_to_all_hosts() {
        let spec = EgressSpec::default();
        assert!(spec.selects("anywhere", "anything"));
    }
}
