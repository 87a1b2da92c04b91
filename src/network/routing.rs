//! Hostname routing
//!
//! Every application port gets a hostname under the domain suffix. The first
//! declared port owns `<app>.<suffix>`, every further port gets
//! `<app>-<port>.<suffix>`. Rules come out in manifest port order so repeated
//! runs label containers identically.

use crate::config::NETWORK_NAME;
use crate::error::{Result, VulnPkgError};
use crate::manifest::{AppSpec, Manifest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};

/// Wildcard DNS service that resolves `<anything>.<ip>.sslip.io` to `<ip>`
pub const SSLIP_DOMAIN: &str = "sslip.io";

/// Hostname label reserved for the proxy dashboard
pub const DASHBOARD_HOST: &str = "traefik";

/// URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Traefik entrypoint serving this scheme
    pub fn entrypoint(&self) -> &'static str {
        match self {
            Scheme::Http => "web",
            Scheme::Https => "websecure",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// Global hostname configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Address the generated hostnames should resolve to
    pub resolve_address: IpAddr,
    /// Custom suffix; `None` means `<resolve_address>.sslip.io`
    pub domain_suffix: Option<String>,
    pub use_https: bool,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            resolve_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            domain_suffix: None,
            use_https: false,
        }
    }
}

impl DomainConfig {
    /// Effective domain suffix
    pub fn suffix(&self) -> String {
        match &self.domain_suffix {
            Some(suffix) => suffix.trim_matches('.').to_string(),
            None => format!("{}.{}", self.resolve_address, SSLIP_DOMAIN),
        }
    }

    pub fn scheme(&self) -> Scheme {
        if self.use_https {
            Scheme::Https
        } else {
            Scheme::Http
        }
    }

    /// Hostname of the proxy dashboard
    pub fn dashboard_host(&self) -> String {
        format!("{}.{}", DASHBOARD_HOST, self.suffix())
    }
}

/// Mapping from a hostname to one application port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub hostname: String,
    pub target_port: u16,
    pub scheme: Scheme,
}

impl RoutingRule {
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.hostname)
    }
}

/// Routes for one application, in declared port order
pub fn routes_for(app: &AppSpec, domain: &DomainConfig) -> Vec<RoutingRule> {
    let suffix = domain.suffix();
    let scheme = domain.scheme();

    app.ports
        .iter()
        .enumerate()
        .map(|(index, &port)| {
            let hostname = if index == 0 {
                format!("{}.{}", app.name, suffix)
            } else {
                format!("{}-{}.{}", app.name, port, suffix)
            };
            RoutingRule {
                hostname,
                target_port: port,
                scheme,
            }
        })
        .collect()
}

/// Traefik docker-provider labels for an application's routes
pub fn traefik_labels(app: &AppSpec, routes: &[RoutingRule]) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert("traefik.docker.network".to_string(), NETWORK_NAME.to_string());

    for rule in routes {
        let router = format!("{}-{}", app.name, rule.target_port);
        let prefix = format!("traefik.http.routers.{}", router);

        labels.insert(format!("{}.rule", prefix), format!("Host(`{}`)", rule.hostname));
        labels.insert(
            format!("{}.entrypoints", prefix),
            rule.scheme.entrypoint().to_string(),
        );
        labels.insert(format!("{}.service", prefix), router.clone());
        if rule.scheme == Scheme::Https {
            labels.insert(format!("{}.tls", prefix), "true".to_string());
        }
        labels.insert(
            format!("traefik.http.services.{}.loadbalancer.server.port", router),
            rule.target_port.to_string(),
        );
    }

    labels
}

/// Routes for a whole manifest, checked for hostname collisions
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, Vec<RoutingRule>)>,
}

impl RouteTable {
    /// Compute every route, failing if two ports would share a hostname
    pub fn build(manifest: &Manifest, domain: &DomainConfig) -> Result<Self> {
        let mut owners: HashMap<String, String> = HashMap::new();
        owners.insert(domain.dashboard_host(), "the proxy dashboard".to_string());

        let mut routes = Vec::with_capacity(manifest.apps.len());
        for app in &manifest.apps {
            let rules = routes_for(app, domain);
            for rule in &rules {
                let owner = format!("{}:{}", app.name, rule.target_port);
                if let Some(existing) = owners.insert(rule.hostname.clone(), owner.clone()) {
                    return Err(VulnPkgError::PortConflict(format!(
                        "hostname {} is claimed by both {} and {}",
                        rule.hostname, existing, owner
                    )));
                }
            }
            routes.push((app.name.clone(), rules));
        }

        Ok(Self { routes })
    }

    pub fn get(&self, app: &str) -> Option<&[RoutingRule]> {
        self.routes
            .iter()
            .find(|(name, _)| name == app)
            .map(|(_, rules)| rules.as_slice())
    }
}
