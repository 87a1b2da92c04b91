//! In-memory container engine for tests

use super::config::{ContainerRecord, ContainerSpec, ContainerStatus};
use super::engine::{BuildRequest, ContainerEngine, CreateOutcome};
use crate::error::{BuildStage, Result, VulnPkgError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    images: BTreeSet<String>,
    networks: BTreeSet<String>,
    containers: BTreeMap<String, ContainerRecord>,
    specs: BTreeMap<String, ContainerSpec>,
    calls: Vec<String>,
    built_dockerfiles: Vec<(String, String)>,
    next_id: u32,
    fail_build: bool,
    fail_pull: bool,
}

/// Records every call and keeps images, networks and containers in memory
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn record(&self, call: String) {
        self.with(|s| s.calls.push(call));
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Calls whose name starts with `op`
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn add_image(&self, image: &str) {
        self.with(|s| s.images.insert(image.to_string()));
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.with(|s| s.images.contains(image))
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.with(|s| s.networks.contains(name))
    }

    /// Insert a container directly, bypassing create
    pub fn add_container(&self, name: &str, image: &str, status: ContainerStatus) {
        self.with(|s| {
            s.next_id += 1;
            s.containers.insert(
                name.to_string(),
                ContainerRecord {
                    id: format!("{}-{}", name, s.next_id),
                    name: name.to_string(),
                    image: image.to_string(),
                    status,
                    labels: BTreeMap::new(),
                },
            );
        });
    }

    pub fn container(&self, name: &str) -> Option<ContainerRecord> {
        self.with(|s| s.containers.get(name).cloned())
    }

    /// Spec the container was last created with
    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.with(|s| s.specs.get(name).cloned())
    }

    /// (tag, Dockerfile text) for every build
    pub fn built_dockerfiles(&self) -> Vec<(String, String)> {
        self.with(|s| s.built_dockerfiles.clone())
    }

    pub fn fail_builds(&self) {
        self.with(|s| s.fail_build = true);
    }

    pub fn fail_pulls(&self) {
        self.with(|s| s.fail_pull = true);
    }
}

impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<()> {
        self.record("ping".to_string());
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(format!("image_exists {}", image));
        Ok(self.has_image(image))
    }

    async fn pull(&self, image: &str) -> Result<()> {
        self.record(format!("pull {}", image));
        self.with(|s| {
            if s.fail_pull {
                return Err(VulnPkgError::ImagePull {
                    image: image.to_string(),
                    message: "manifest unknown".to_string(),
                });
            }
            s.images.insert(image.to_string());
            Ok(())
        })
    }

    async fn build(&self, request: &BuildRequest) -> Result<()> {
        self.record(format!("build {}", request.tag));
        let dockerfile = std::fs::read_to_string(&request.dockerfile).map_err(|e| {
            VulnPkgError::build(BuildStage::Build, format!("cannot read Dockerfile: {}", e))
        })?;
        self.with(|s| {
            if s.fail_build {
                return Err(VulnPkgError::build(BuildStage::Build, "exit status 1"));
            }
            s.built_dockerfiles.push((request.tag.clone(), dockerfile));
            s.images.insert(request.tag.clone());
            Ok(())
        })
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.record(format!("remove_image {}", image));
        self.with(|s| s.images.remove(image));
        Ok(())
    }

    async fn ensure_network(&self, name: &str) -> Result<bool> {
        self.record(format!("ensure_network {}", name));
        Ok(self.with(|s| s.networks.insert(name.to_string())))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<CreateOutcome> {
        self.record(format!("create {}", spec.name));
        self.with(|s| {
            if s.containers.contains_key(&spec.name) {
                return Ok(CreateOutcome::AlreadyExists);
            }
            if !s.images.contains(&spec.image) {
                return Err(VulnPkgError::container_op(
                    "create",
                    format!("No such image: {}", spec.image),
                ));
            }
            s.next_id += 1;
            let id = format!("{}-{}", spec.name, s.next_id);
            s.containers.insert(
                spec.name.clone(),
                ContainerRecord {
                    id: id.clone(),
                    name: spec.name.clone(),
                    image: spec.image.clone(),
                    status: ContainerStatus::Created,
                    labels: spec.labels.clone(),
                },
            );
            s.specs.insert(spec.name.clone(), spec.clone());
            Ok(CreateOutcome::Created(id))
        })
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record(format!("start {}", name));
        self.with(|s| match s.containers.get_mut(name) {
            Some(container) => {
                container.status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(VulnPkgError::container_op("start", format!("No such container: {}", name))),
        })
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.record(format!("stop {}", name));
        self.with(|s| match s.containers.get_mut(name) {
            Some(container) => {
                container.status = ContainerStatus::Exited;
                Ok(())
            }
            None => Err(VulnPkgError::container_op("stop", format!("No such container: {}", name))),
        })
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(format!("remove {}", name));
        self.with(|s| {
            if s
                .containers
                .get(name)
                .is_some_and(|c| c.status.is_running())
            {
                return Err(VulnPkgError::container_op("remove", "container is running"));
            }
            s.containers.remove(name);
            Ok(())
        })
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerRecord>> {
        self.record(format!("inspect {}", name));
        Ok(self.container(name))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ContainerRecord>> {
        self.record(format!("list {}", prefix));
        Ok(self.with(|s| {
            s.containers
                .values()
                .filter(|c| c.name.starts_with(prefix))
                .cloned()
                .collect()
        }))
    }
}
