//! Container management module
//!
//! This module provides the interface to the external container engine,
//! the request/record types exchanged with it, and the Docker CLI backend.

pub mod config;
pub mod docker;
pub mod engine;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{ContainerRecord, ContainerSpec, ContainerStatus, PortMapping, VolumeMount};
pub use docker::DockerCli;
pub use engine::{BuildRequest, ContainerEngine, CreateOutcome};
