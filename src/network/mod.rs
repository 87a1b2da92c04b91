//! Network routing module
//!
//! Hostname generation for applications and the Traefik proxy that serves
//! them on the shared network.

pub mod proxy;
pub mod routing;

pub use proxy::{proxy_container_name, proxy_spec, PROXY_IMAGE};
pub use routing::{routes_for, traefik_labels, DomainConfig, RouteTable, RoutingRule, Scheme};
