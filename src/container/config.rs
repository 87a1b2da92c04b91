//! Container configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Container status as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container is created but was never started
    Created,
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container is restarting
    Restarting,
    /// Container is being removed
    Removing,
    /// Container has exited
    Exited,
    /// Container is in an error state
    Dead,
}

impl ContainerStatus {
    /// Parse the engine's state string
    pub fn from_engine(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Exited,
        }
    }

    /// Whether the container is up from the operator's point of view
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ContainerStatus::Running | ContainerStatus::Paused | ContainerStatus::Restarting
        )
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Restarting => write!(f, "restarting"),
            ContainerStatus::Removing => write!(f, "removing"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::Dead => write!(f, "dead"),
        }
    }
}

/// Container creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image name/tag
    pub image: String,
    /// Command arguments passed after the image
    pub cmd: Vec<String>,
    /// Environment variables, `KEY=VALUE`
    pub env: Vec<String>,
    /// Container ports exposed to the network
    pub exposed_ports: Vec<u16>,
    /// Host port mappings
    pub published_ports: Vec<PortMapping>,
    /// Volume mounts
    pub volumes: Vec<VolumeMount>,
    /// Container labels
    pub labels: BTreeMap<String, String>,
    /// Network to attach to
    pub network: Option<String>,
    /// Restart policy
    pub restart: Option<String>,
}

impl ContainerSpec {
    /// Create a new container specification
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            cmd: Vec::new(),
            env: Vec::new(),
            exposed_ports: Vec::new(),
            published_ports: Vec::new(),
            volumes: Vec::new(),
            labels: BTreeMap::new(),
            network: None,
            restart: None,
        }
    }

    /// Set command arguments
    pub fn cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    /// Add environment variable
    pub fn env(mut self, entry: &str) -> Self {
        self.env.push(entry.to_string());
        self
    }

    /// Expose a container port
    pub fn expose(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self
    }

    /// Add port mapping
    pub fn port(mut self, host_port: u16, container_port: u16) -> Self {
        self.published_ports.push(PortMapping {
            host_port,
            container_port,
        });
        self
    }

    /// Add volume mount
    pub fn volume(mut self, host_path: &str, container_path: &str, read_only: bool) -> Self {
        self.volumes.push(VolumeMount {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
            read_only,
        });
        self
    }

    /// Add labels
    pub fn labels(mut self, labels: impl IntoIterator<Item = (String, String)>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Attach to a network
    pub fn network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    /// Set restart policy
    pub fn restart(mut self, policy: &str) -> Self {
        self.restart = Some(policy.to_string());
        self
    }
}

/// Port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

/// Volume mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// `host:container[:ro]` form
    pub fn to_bind(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host_path, self.container_path)
        } else {
            format!("{}:{}", self.host_path, self.container_path)
        }
    }
}

/// A container known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Engine container ID
    pub id: String,
    /// Container name without leading slash
    pub name: String,
    /// Image the container was created from
    pub image: String,
    /// Current status
    pub status: ContainerStatus,
    /// Container labels
    pub labels: BTreeMap<String, String>,
}
