//! Error types for vuln-pkg

use crate::manifest::fetch::FetchError;
use crate::manifest::parser::ValidationIssue;
use thiserror::Error;

/// Result type for vuln-pkg operations
pub type Result<T> = std::result::Result<T, VulnPkgError>;

/// Stage of the build pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Fetching the Dockerfile, context archive, or clone contents
    Fetch,
    /// The container engine build itself
    Build,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStage::Fetch => write!(f, "source fetch"),
            BuildStage::Build => write!(f, "docker build"),
        }
    }
}

/// Broad class of a failure, used to pick the remediation hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Remote fetch, clone, or pull problem
    Network,
    /// Container engine problem
    Engine,
    /// Manifest or flag problem
    Configuration,
    /// The operator declined something
    Operator,
}

/// vuln-pkg error types
#[derive(Error, Debug)]
pub enum VulnPkgError {
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(FetchError),

    #[error("Manifest parse error: {0}")]
    ManifestParse(String),

    #[error("Manifest validation failed:\n{}", format_issues(.0))]
    ManifestValidation(Vec<ValidationIssue>),

    #[error("Manifest rejected: {0}")]
    ManifestRejected(String),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("Build failed during {stage}: {message}")]
    Build { stage: BuildStage, message: String },

    #[error("Git clone failed: {0}")]
    GitClone(String),

    #[error("Container {op} failed: {message}")]
    ContainerOperation { op: String, message: String },

    #[error("Application not found: {0}")]
    AppNotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Port configuration conflict: {0}")]
    PortConflict(String),

    #[error("Trust store error: {0}")]
    TrustStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VulnPkgError {
    /// Shorthand for a failed engine call
    pub fn container_op(op: &str, message: impl Into<String>) -> Self {
        VulnPkgError::ContainerOperation {
            op: op.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a failed build stage
    pub fn build(stage: BuildStage, message: impl Into<String>) -> Self {
        VulnPkgError::Build {
            stage,
            message: message.into(),
        }
    }

    /// Classify the error for the operator
    pub fn category(&self) -> ErrorCategory {
        match self {
            VulnPkgError::ManifestFetch(_)
            | VulnPkgError::ImagePull { .. }
            | VulnPkgError::GitClone(_)
            | VulnPkgError::Build {
                stage: BuildStage::Fetch,
                ..
            } => ErrorCategory::Network,
            VulnPkgError::EngineUnavailable(_)
            | VulnPkgError::ContainerOperation { .. }
            | VulnPkgError::Build {
                stage: BuildStage::Build,
                ..
            } => ErrorCategory::Engine,
            VulnPkgError::ManifestRejected(_) => ErrorCategory::Operator,
            VulnPkgError::ManifestParse(_)
            | VulnPkgError::ManifestValidation(_)
            | VulnPkgError::AppNotFound(_)
            | VulnPkgError::UnsupportedOperation(_)
            | VulnPkgError::PortConflict(_)
            | VulnPkgError::TrustStore(_)
            | VulnPkgError::Io(_)
            | VulnPkgError::Json(_)
            | VulnPkgError::InvalidConfig(_) => ErrorCategory::Configuration,
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}
