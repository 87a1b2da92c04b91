//! Traefik reverse proxy container

use super::routing::{DomainConfig, Scheme};
use crate::config::{container_name, APP_LABEL, MANAGED_LABEL, NETWORK_NAME};
use crate::container::ContainerSpec;

/// Proxy image
pub const PROXY_IMAGE: &str = "traefik:v2.11";

/// Name the proxy is registered under, before the managed prefix
pub const PROXY_APP: &str = "traefik";

/// Docker socket Traefik watches for labelled containers
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Proxy container name
pub fn proxy_container_name() -> String {
    container_name(PROXY_APP)
}

/// Container spec for the proxy
///
/// The dashboard is routed on the same entrypoint as the applications.
pub fn proxy_spec(domain: &DomainConfig) -> ContainerSpec {
    let args = vec![
        "--providers.docker=true".to_string(),
        "--providers.docker.exposedbydefault=false".to_string(),
        format!("--providers.docker.network={}", NETWORK_NAME),
        "--entrypoints.web.address=:80".to_string(),
        "--entrypoints.websecure.address=:443".to_string(),
        "--api.dashboard=true".to_string(),
    ];

    let router = "traefik.http.routers.dashboard";
    let mut labels = vec![
        (MANAGED_LABEL.to_string(), "true".to_string()),
        (APP_LABEL.to_string(), PROXY_APP.to_string()),
        ("traefik.enable".to_string(), "true".to_string()),
        (
            format!("{}.rule", router),
            format!("Host(`{}`)", domain.dashboard_host()),
        ),
        (
            format!("{}.entrypoints", router),
            domain.scheme().entrypoint().to_string(),
        ),
        (format!("{}.service", router), "api@internal".to_string()),
    ];
    if domain.scheme() == Scheme::Https {
        labels.push((format!("{}.tls", router), "true".to_string()));
    }

    ContainerSpec::new(&proxy_container_name(), PROXY_IMAGE)
        .cmd(args)
        .network(NETWORK_NAME)
        .port(80, 80)
        .port(443, 443)
        .volume(DOCKER_SOCKET, DOCKER_SOCKET, true)
        .labels(labels)
        .restart("unless-stopped")
}
