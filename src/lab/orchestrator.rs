//! Lab orchestrator
//!
//! Drives each manifest application through its lifecycle against the
//! container engine. Every transition is re-derived from what the engine
//! reports, so repeated or concurrent invocations converge on the same state.

use super::status::{self, StatusReport};
use crate::config::{container_name, Settings, APP_LABEL, MANAGED_LABEL, NETWORK_NAME};
use crate::container::{ContainerEngine, ContainerRecord, ContainerSpec, CreateOutcome};
use crate::error::{Result, VulnPkgError};
use crate::image::{image_ref, ImageBuilder};
use crate::manifest::{AppSpec, Fetcher, Manifest, PackageSource};
use crate::network::{
    proxy_container_name, proxy_spec, traefik_labels, RouteTable, RoutingRule, PROXY_IMAGE,
};

/// Lifecycle state of a manifest application
///
/// A removed application reads as `NotInstalled`; a later install starts
/// from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationRuntimeState {
    /// No image and no container
    NotInstalled,
    /// Image present, no container
    Installed,
    /// Container running
    Running,
    /// Container exists but is not running
    Stopped,
}

impl ApplicationRuntimeState {
    /// State from an inspected container and whether the image exists
    pub fn derive(container: Option<&ContainerRecord>, image_present: bool) -> Self {
        match container {
            Some(record) if record.status.is_running() => ApplicationRuntimeState::Running,
            Some(_) => ApplicationRuntimeState::Stopped,
            None if image_present => ApplicationRuntimeState::Installed,
            None => ApplicationRuntimeState::NotInstalled,
        }
    }
}

impl std::fmt::Display for ApplicationRuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationRuntimeState::NotInstalled => write!(f, "not installed"),
            ApplicationRuntimeState::Installed => write!(f, "installed"),
            ApplicationRuntimeState::Running => write!(f, "running"),
            ApplicationRuntimeState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Fail with `UnsupportedOperation` unless the application is built locally
pub fn rebuildable(app: &AppSpec) -> Result<()> {
    match &app.source {
        PackageSource::Prebuilt { image } => Err(VulnPkgError::UnsupportedOperation(format!(
            "{} uses the prebuilt image {}; use remove --purge and install to re-pull",
            app.name, image
        ))),
        PackageSource::Dockerfile(_) | PackageSource::Git { .. } => Ok(()),
    }
}

/// Lab orchestrator
pub struct Orchestrator<E: ContainerEngine> {
    engine: E,
    fetcher: Fetcher,
    settings: Settings,
}

impl<E: ContainerEngine> Orchestrator<E> {
    /// Create a new orchestrator
    pub fn new(engine: E, fetcher: Fetcher, settings: Settings) -> Self {
        Self {
            engine,
            fetcher,
            settings,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current state of one application
    pub async fn state_of(&self, app: &AppSpec) -> Result<ApplicationRuntimeState> {
        let container = self.engine.inspect(&container_name(&app.name)).await?;
        if container.is_some() {
            return Ok(ApplicationRuntimeState::derive(container.as_ref(), true));
        }
        let image_present = self.engine.image_exists(&image_ref(app)).await?;
        Ok(ApplicationRuntimeState::derive(None, image_present))
    }

    /// Make sure the application's image exists, returning its reference
    ///
    /// Nothing is pulled or built when the image is already present.
    pub async fn install(&self, app: &AppSpec) -> Result<String> {
        let image = image_ref(app);
        if self.engine.image_exists(&image).await? {
            tracing::debug!("{} already installed as {}", app.name, image);
            return Ok(image);
        }

        tracing::info!("Installing {} ({})", app.name, app.kind());
        match &app.source {
            PackageSource::Prebuilt { image } => {
                self.engine.pull(image).await?;
                Ok(image.clone())
            }
            PackageSource::Dockerfile(_) | PackageSource::Git { .. } => {
                self.builder().materialize(app).await
            }
        }
    }

    /// Start an application, installing it first if needed
    ///
    /// Returns the routes the application is reachable under.
    pub async fn run(&self, manifest: &Manifest, name: &str) -> Result<Vec<RoutingRule>> {
        let app = manifest.find(name)?;
        let routes = self.routes(manifest, name)?;

        let container = container_name(&app.name);
        let existing = self.engine.inspect(&container).await?;
        if existing.as_ref().is_some_and(|c| c.status.is_running()) {
            tracing::info!("{} is already running", app.name);
            return Ok(routes);
        }

        self.ensure_network().await?;
        self.ensure_proxy().await?;
        self.install(app).await?;

        if existing.is_some() {
            tracing::info!("Starting existing container {}", container);
        } else {
            self.create_container(app, &routes).await?;
        }
        self.engine.start(&container).await?;

        tracing::info!("{} is running", app.name);
        Ok(routes)
    }

    /// Stop a running application, keeping its container
    pub async fn stop(&self, app: &AppSpec) -> Result<()> {
        let container = container_name(&app.name);
        match self.engine.inspect(&container).await? {
            Some(record) if record.status.is_running() => {
                self.engine.stop(&container).await?;
                tracing::info!("Stopped {}", app.name);
            }
            _ => tracing::debug!("{} is not running", app.name),
        }
        Ok(())
    }

    /// Remove an application's container, and its image when `purge` is set
    pub async fn remove(&self, app: &AppSpec, purge: bool) -> Result<()> {
        let container = container_name(&app.name);
        if let Some(record) = self.engine.inspect(&container).await? {
            if record.status.is_running() {
                self.engine.stop(&container).await?;
            }
            self.engine.remove(&container).await?;
            tracing::info!("Removed container {}", container);
        }

        if purge {
            let image = image_ref(app);
            self.engine.remove_image(&image).await?;
            tracing::info!("Removed image {}", image);
        }
        Ok(())
    }

    /// Rebuild a Dockerfile or git application
    ///
    /// A running application is recreated on the new image and started again.
    /// A stopped container is removed so the next run picks up the new image.
    pub async fn rebuild(&self, manifest: &Manifest, name: &str) -> Result<String> {
        let app = manifest.find(name)?;
        rebuildable(app)?;
        let routes = self.routes(manifest, name)?;

        let container = container_name(&app.name);
        let previous = self.engine.inspect(&container).await?;
        let image = self.builder().materialize(app).await?;

        match previous {
            Some(record) if record.status.is_running() => {
                self.engine.stop(&container).await?;
                self.engine.remove(&container).await?;
                self.create_container(app, &routes).await?;
                self.engine.start(&container).await?;
                tracing::info!("Restarted {} on {}", app.name, image);
            }
            Some(_) => {
                self.engine.remove(&container).await?;
                tracing::info!("Removed stale container {}", container);
            }
            None => {}
        }
        Ok(image)
    }

    /// Status of every manifest application
    pub async fn status(&self, manifest: &Manifest) -> Result<StatusReport> {
        status::status(&self.engine, manifest, &self.settings.domain).await
    }

    /// Routes for `name`, checked against the whole manifest
    fn routes(&self, manifest: &Manifest, name: &str) -> Result<Vec<RoutingRule>> {
        let table = RouteTable::build(manifest, &self.settings.domain)?;
        Ok(table.get(name).map(<[RoutingRule]>::to_vec).unwrap_or_default())
    }

    fn builder(&self) -> ImageBuilder<'_, E> {
        ImageBuilder::new(&self.engine, self.fetcher.clone(), self.settings.build_dir())
    }

    async fn ensure_network(&self) -> Result<()> {
        if self.engine.ensure_network(NETWORK_NAME).await? {
            tracing::info!("Created network {}", NETWORK_NAME);
        }
        Ok(())
    }

    async fn ensure_proxy(&self) -> Result<()> {
        let name = proxy_container_name();
        let spec = proxy_spec(&self.settings.domain);
        match self.engine.inspect(&name).await? {
            Some(record) if !carries_labels(&record, &spec) => {
                tracing::info!(
                    "Recreating proxy {} for {}",
                    name,
                    self.settings.domain.dashboard_host()
                );
                if record.status.is_running() {
                    self.engine.stop(&name).await?;
                }
                self.engine.remove(&name).await?;
                self.create_proxy(&spec).await?;
            }
            Some(record) if record.status.is_running() => return Ok(()),
            Some(_) => {}
            None => self.create_proxy(&spec).await?,
        }

        self.engine.start(&name).await?;
        tracing::info!(
            "Proxy running, dashboard at {}://{}",
            self.settings.domain.scheme(),
            self.settings.domain.dashboard_host()
        );
        Ok(())
    }

    async fn create_proxy(&self, spec: &ContainerSpec) -> Result<()> {
        if !self.engine.image_exists(PROXY_IMAGE).await? {
            self.engine.pull(PROXY_IMAGE).await?;
        }
        if let CreateOutcome::AlreadyExists = self.engine.create(spec).await? {
            tracing::debug!("Proxy {} created concurrently", spec.name);
        }
        Ok(())
    }

    async fn create_container(&self, app: &AppSpec, routes: &[RoutingRule]) -> Result<()> {
        let name = container_name(&app.name);
        let ownership = [
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (APP_LABEL.to_string(), app.name.clone()),
        ];

        let mut spec = ContainerSpec::new(&name, &image_ref(app))
            .network(NETWORK_NAME)
            .labels(traefik_labels(app, routes))
            .labels(ownership);
        for entry in &app.env {
            spec = spec.env(entry);
        }
        for &port in &app.ports {
            spec = spec.expose(port);
        }

        match self.engine.create(&spec).await? {
            CreateOutcome::Created(id) => tracing::debug!("Created {} ({})", name, id),
            CreateOutcome::AlreadyExists => tracing::debug!("{} created concurrently", name),
        }
        Ok(())
    }
}

/// Whether an existing container still has every label `spec` sets
fn carries_labels(record: &ContainerRecord, spec: &ContainerSpec) -> bool {
    spec.labels
        .iter()
        .all(|(key, value)| record.labels.get(key) == Some(value))
}
