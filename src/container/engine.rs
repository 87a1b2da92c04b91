//! Container engine interface
//!
//! Everything the orchestrator needs from the container runtime. The runtime
//! itself is external; [`crate::container::docker::DockerCli`] is the
//! production implementation.

use super::config::{ContainerRecord, ContainerSpec};
use crate::error::Result;
use std::path::PathBuf;

/// Image build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context directory
    pub context_dir: PathBuf,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// Tag for the resulting image
    pub tag: String,
}

/// Result of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Container created with this ID
    Created(String),
    /// A container with the requested name already exists
    AlreadyExists,
}

/// Operations consumed from the container runtime
#[allow(async_fn_in_trait)]
pub trait ContainerEngine {
    /// Fail with `EngineUnavailable` if the daemon cannot be reached
    async fn ping(&self) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn pull(&self, image: &str) -> Result<()>;

    async fn build(&self, request: &BuildRequest) -> Result<()>;

    /// Remove an image; a missing image is not an error
    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Create the network unless it exists; returns whether it was created
    async fn ensure_network(&self, name: &str) -> Result<bool>;

    async fn create(&self, spec: &ContainerSpec) -> Result<CreateOutcome>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    /// Remove a stopped container; a missing container is not an error
    async fn remove(&self, name: &str) -> Result<()>;

    async fn inspect(&self, name: &str) -> Result<Option<ContainerRecord>>;

    /// All containers, running or not, whose name starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<ContainerRecord>>;
}
