//! Input snapshot model for the listener synthesizer.
//!
//! Every type here is an immutable snapshot captured per configuration push:
//! the proxy identity and scope, the service registry, L4 virtual-service
//! rules and quota bindings. The synthesizer is a pure function over these.

pub mod protocol;
pub mod proxy;
pub mod quota;
pub mod scope;
pub mod service;
pub mod virtual_service;

pub use protocol::AppProtocol;
pub use proxy::{Proxy, ProxyMetadata};
pub use quota::{QuotaBinding, QuotaSet, QuotaSpec};
pub use scope::{CaptureMode, EgressSpec, HostSelector, IngressSpec, PortSpec, Scope};
pub use service::{Endpoint, Registry, Resolution, Service, ServiceInstance, ServicePort};
pub use virtual_service::{L4Match, TcpRoute, VirtualService, WeightedDestination};
