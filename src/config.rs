//! Process-wide settings
//!
//! Built once per invocation from command-line flags and handed to the
//! components that need them.

use crate::network::routing::DomainConfig;
use std::path::PathBuf;

/// Official manifest, trusted without prompting
pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/neutrino2211/vuln-pkg/main/manifest.yml";

/// Shared Docker network for the proxy and every application
pub const NETWORK_NAME: &str = "vuln-pkg";

/// Prefix for every container this tool creates
pub const CONTAINER_PREFIX: &str = "vuln-pkg-";

/// Repository prefix for locally built images
pub const IMAGE_PREFIX: &str = "vuln-pkg/";

/// Label marking containers created by this tool
pub const MANAGED_LABEL: &str = "vuln-pkg.managed";

/// Label carrying the manifest application name
pub const APP_LABEL: &str = "vuln-pkg.app";

/// Container name for a manifest application
pub fn container_name(app: &str) -> String {
    format!("{}{}", CONTAINER_PREFIX, app)
}

/// Image tag for a locally built application
pub fn built_image_tag(app: &str) -> String {
    format!("{}{}:latest", IMAGE_PREFIX, app)
}

/// Settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    /// Manifest source in use
    pub manifest_url: String,
    /// Directory holding the trust store and scratch space
    pub data_dir: PathBuf,
    /// Accept unknown manifests without prompting
    pub auto_accept: bool,
    /// Hostname generation
    pub domain: DomainConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            data_dir: default_data_dir(),
            auto_accept: false,
            domain: DomainConfig::default(),
        }
    }
}

impl Settings {
    /// Directory for build contexts and git checkouts
    pub fn build_dir(&self) -> PathBuf {
        self.data_dir.join("build")
    }
}

/// `$XDG_DATA_HOME/vuln-pkg` or the platform equivalent
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("vuln-pkg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_names() {
        assert_eq!(container_name("dvwa"), "vuln-pkg-dvwa");
        assert_eq!(built_image_tag("git-lab"), "vuln-pkg/git-lab:latest");
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.manifest_url, DEFAULT_MANIFEST_URL);
        assert!(!settings.auto_accept);
        assert!(settings.data_dir.ends_with("vuln-pkg"));
        assert!(settings.build_dir().starts_with(&settings.data_dir));
    }
}
