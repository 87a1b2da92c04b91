//! Status aggregation across the manifest and the engine

use super::orchestrator::ApplicationRuntimeState;
use crate::config::{container_name, CONTAINER_PREFIX};
use crate::container::{ContainerEngine, ContainerRecord};
use crate::error::Result;
use crate::image::image_ref;
use crate::manifest::Manifest;
use crate::network::{proxy_container_name, routes_for, DomainConfig, RoutingRule};
use std::collections::HashMap;

/// Status of one manifest application
#[derive(Debug)]
pub struct AppStatus {
    pub name: String,
    /// Engine errors are kept per application
    pub state: Result<ApplicationRuntimeState>,
    pub routes: Vec<RoutingRule>,
}

/// Status of a whole lab
#[derive(Debug)]
pub struct StatusReport {
    /// One entry per manifest application, in manifest order
    pub apps: Vec<AppStatus>,
    /// Managed containers with no manifest entry
    pub orphans: Vec<ContainerRecord>,
    /// The proxy container, if it exists
    pub proxy: Option<ContainerRecord>,
}

/// Cross-reference managed containers against the manifest
pub async fn status<E: ContainerEngine>(
    engine: &E,
    manifest: &Manifest,
    domain: &DomainConfig,
) -> Result<StatusReport> {
    let mut containers: HashMap<String, ContainerRecord> = engine
        .list(CONTAINER_PREFIX)
        .await?
        .into_iter()
        .map(|record| (record.name.clone(), record))
        .collect();
    let proxy = containers.remove(&proxy_container_name());

    let mut apps = Vec::with_capacity(manifest.apps.len());
    for app in &manifest.apps {
        let state = match containers.remove(&container_name(&app.name)) {
            Some(record) => Ok(ApplicationRuntimeState::derive(Some(&record), true)),
            None => engine
                .image_exists(&image_ref(app))
                .await
                .map(|present| ApplicationRuntimeState::derive(None, present)),
        };
        if let Err(e) = &state {
            tracing::warn!("Cannot determine state of {}: {}", app.name, e);
        }

        apps.push(AppStatus {
            name: app.name.clone(),
            state,
            routes: routes_for(app, domain),
        });
    }

    let mut orphans: Vec<ContainerRecord> = containers.into_values().collect();
    orphans.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(StatusReport {
        apps,
        orphans,
        proxy,
    })
}
