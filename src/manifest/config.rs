//! Manifest configuration types
//!
//! Two layers live here: the wire model that mirrors the YAML document field
//! for field, and the validated model handed to the rest of the crate. Only
//! [`crate::manifest::parser::ManifestParser::validate`] turns the former into
//! the latter.

use crate::error::{Result, VulnPkgError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default Dockerfile location inside a git checkout
pub const DEFAULT_DOCKERFILE_PATH: &str = "./Dockerfile";

/// Manifest document as written in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestDocument {
    /// Authorship metadata
    #[serde(default)]
    pub meta: ManifestMeta,
    /// Application entries, in declaration order
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

/// Manifest metadata (informational only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMeta {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Application entry as written in YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<VersionField>,
    /// Package type; omitted means prebuilt
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub dockerfile_url: Option<String>,
    #[serde(default)]
    pub context_url: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub dockerfile_path: Option<String>,
    /// Ports are kept signed so out-of-range values surface as validation issues
    #[serde(default)]
    pub ports: Option<Vec<i64>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub env: Option<Vec<String>>,
}

/// Version scalar; YAML happily reads `1.0` as a float
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionField {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl std::fmt::Display for VersionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionField::Text(s) => write!(f, "{}", s),
            VersionField::Integer(n) => write!(f, "{}", n),
            VersionField::Float(n) => write!(f, "{:?}", n),
        }
    }
}

/// Which mechanism produces an application's image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Prebuilt,
    Dockerfile,
    Git,
}

impl SourceKind {
    /// Parse the wire `type` field
    pub fn from_wire(kind: Option<&str>) -> Option<Self> {
        match kind {
            None | Some("prebuilt") => Some(SourceKind::Prebuilt),
            Some("dockerfile") => Some(SourceKind::Dockerfile),
            Some("git") => Some(SourceKind::Git),
            Some(_) => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Prebuilt => write!(f, "prebuilt"),
            SourceKind::Dockerfile => write!(f, "dockerfile"),
            SourceKind::Git => write!(f, "git"),
        }
    }
}

/// Where a Dockerfile package gets its Dockerfile from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerfileSource {
    /// Dockerfile text embedded in the manifest
    Inline(String),
    /// Dockerfile and optional context archive fetched over the network
    Remote {
        dockerfile_url: String,
        context_url: Option<String>,
    },
}

/// Validated package source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Pull from a registry
    Prebuilt { image: String },
    /// Build from a Dockerfile
    Dockerfile(DockerfileSource),
    /// Clone and build
    Git {
        repo: String,
        git_ref: Option<String>,
        dockerfile_path: String,
    },
}

impl PackageSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            PackageSource::Prebuilt { .. } => SourceKind::Prebuilt,
            PackageSource::Dockerfile(_) => SourceKind::Dockerfile,
            PackageSource::Git { .. } => SourceKind::Git,
        }
    }
}

/// Validated application specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    pub name: String,
    pub version: String,
    pub source: PackageSource,
    /// Never empty
    pub ports: Vec<u16>,
    pub tags: BTreeSet<String>,
    pub description: Option<String>,
    /// `KEY=VALUE` entries in declaration order
    pub env: Vec<String>,
}

impl AppSpec {
    pub fn kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Split env entries into key/value pairs
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }

    /// Case-insensitive match against name, description and tags
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&query))
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }
}

/// Validated manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub meta: ManifestMeta,
    pub apps: Vec<AppSpec>,
}

impl Manifest {
    /// Look up an application by exact name
    pub fn find(&self, name: &str) -> Result<&AppSpec> {
        self.apps
            .iter()
            .find(|app| app.name == name)
            .ok_or_else(|| VulnPkgError::AppNotFound(name.to_string()))
    }

    /// Applications matching a search query, in manifest order
    pub fn search(&self, query: &str) -> Vec<&AppSpec> {
        self.apps.iter().filter(|app| app.matches(query)).collect()
    }

    pub fn app_names(&self) -> Vec<&str> {
        self.apps.iter().map(|app| app.name.as_str()).collect()
    }
}
