//! Manifest parser and validator

use super::config::{
    AppEntry, AppSpec, DockerfileSource, Manifest, ManifestDocument, PackageSource, SourceKind,
    DEFAULT_DOCKERFILE_PATH,
};
use crate::error::{Result, VulnPkgError};
use crate::network::proxy::PROXY_APP;
use crate::network::routing::DASHBOARD_HOST;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// A single manifest violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// Entry at `index` has no name
    EmptyName { index: usize },
    /// Name is not usable as a hostname label
    InvalidName { name: String },
    DuplicateName { name: String },
    /// Name taken by the proxy container or dashboard hostname
    ReservedName { name: String },
    EmptyPorts { app: String },
    InvalidPort { app: String, port: i64 },
    DuplicatePort { app: String, port: i64 },
    UnknownKind { app: String, kind: String },
    MissingField {
        app: String,
        kind: SourceKind,
        field: &'static str,
    },
    /// Field that belongs to another source kind
    FieldNotAllowed {
        app: String,
        kind: SourceKind,
        field: &'static str,
    },
    /// Both inline and remote Dockerfile given
    AmbiguousDockerfile { app: String },
    MalformedEnv { app: String, entry: String },
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::EmptyName { index } => {
                write!(f, "app #{} has an empty or missing name", index + 1)
            }
            ValidationIssue::InvalidName { name } => write!(
                f,
                "app name '{}' must be lowercase letters, digits and inner hyphens",
                name
            ),
            ValidationIssue::DuplicateName { name } => {
                write!(f, "app name '{}' is declared more than once", name)
            }
            ValidationIssue::ReservedName { name } => {
                write!(f, "app name '{}' is reserved for the proxy", name)
            }
            ValidationIssue::EmptyPorts { app } => {
                write!(f, "app '{}' must declare at least one port", app)
            }
            ValidationIssue::InvalidPort { app, port } => {
                write!(f, "app '{}' has out-of-range port {}", app, port)
            }
            ValidationIssue::DuplicatePort { app, port } => {
                write!(f, "app '{}' lists port {} more than once", app, port)
            }
            ValidationIssue::UnknownKind { app, kind } => write!(
                f,
                "app '{}' has unknown type '{}' (expected prebuilt, dockerfile or git)",
                app, kind
            ),
            ValidationIssue::MissingField { app, kind, field } => {
                write!(f, "{} app '{}' requires '{}'", kind, app, field)
            }
            ValidationIssue::FieldNotAllowed { app, kind, field } => {
                write!(f, "{} app '{}' must not set '{}'", kind, app, field)
            }
            ValidationIssue::AmbiguousDockerfile { app } => write!(
                f,
                "dockerfile app '{}' sets both 'dockerfile' and 'dockerfile_url'",
                app
            ),
            ValidationIssue::MalformedEnv { app, entry } => {
                write!(f, "app '{}' has env entry '{}' without KEY=VALUE form", app, entry)
            }
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static regex is valid")
    })
}

const RESERVED_NAMES: [&str; 2] = [PROXY_APP, DASHBOARD_HOST];

/// Manifest parser
pub struct ManifestParser;

impl ManifestParser {
    /// Parse raw manifest bytes into the wire model
    pub fn parse(raw: &[u8]) -> Result<ManifestDocument> {
        serde_yaml::from_slice(raw)
            .map_err(|e| VulnPkgError::ManifestParse(format!("Failed to parse YAML: {}", e)))
    }

    /// Parse and validate in one step
    pub fn load(raw: &[u8]) -> Result<Manifest> {
        let document = Self::parse(raw)?;
        Self::validate(&document)
    }

    /// Validate a parsed document, collecting every violation
    pub fn validate(document: &ManifestDocument) -> Result<Manifest> {
        let mut issues = Vec::new();

        Self::check_names(&document.apps, &mut issues);
        Self::check_ports(&document.apps, &mut issues);

        let mut apps = Vec::with_capacity(document.apps.len());
        let mut sources = Vec::with_capacity(document.apps.len());
        for entry in &document.apps {
            sources.push(Self::check_source(entry, &mut issues));
        }

        Self::check_env(&document.apps, &mut issues);

        if !issues.is_empty() {
            return Err(VulnPkgError::ManifestValidation(issues));
        }

        for (entry, source) in document.apps.iter().zip(sources) {
            // Every None source pushed an issue above
            let Some(source) = source else { continue };
            apps.push(AppSpec {
                name: display_name(entry).to_string(),
                version: entry
                    .version
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                source,
                ports: entry
                    .ports
                    .iter()
                    .flatten()
                    .filter_map(|p| u16::try_from(*p).ok())
                    .collect(),
                tags: entry.tags.iter().flatten().cloned().collect(),
                description: entry.description.clone(),
                env: entry.env.clone().unwrap_or_default(),
            });
        }

        Ok(Manifest {
            meta: document.meta.clone(),
            apps,
        })
    }

    fn check_names(apps: &[AppEntry], issues: &mut Vec<ValidationIssue>) {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();

        for (index, entry) in apps.iter().enumerate() {
            let name = entry.name.as_deref().unwrap_or("");
            if name.is_empty() {
                issues.push(ValidationIssue::EmptyName { index });
                continue;
            }
            if !seen.insert(name) && reported.insert(name) {
                issues.push(ValidationIssue::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        for entry in apps {
            let Some(name) = entry.name.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            if !name_pattern().is_match(name) {
                issues.push(ValidationIssue::InvalidName {
                    name: name.to_string(),
                });
            } else if RESERVED_NAMES.contains(&name) {
                issues.push(ValidationIssue::ReservedName {
                    name: name.to_string(),
                });
            }
        }
    }

    fn check_ports(apps: &[AppEntry], issues: &mut Vec<ValidationIssue>) {
        for entry in apps {
            let app = display_name(entry).to_string();
            let ports = entry.ports.as_deref().unwrap_or(&[]);
            if ports.is_empty() {
                issues.push(ValidationIssue::EmptyPorts { app });
                continue;
            }

            let mut seen = HashSet::new();
            for &port in ports {
                if !(1..=i64::from(u16::MAX)).contains(&port) {
                    issues.push(ValidationIssue::InvalidPort {
                        app: app.clone(),
                        port,
                    });
                } else if !seen.insert(port) {
                    issues.push(ValidationIssue::DuplicatePort {
                        app: app.clone(),
                        port,
                    });
                }
            }
        }
    }

    fn check_source(entry: &AppEntry, issues: &mut Vec<ValidationIssue>) -> Option<PackageSource> {
        let app = display_name(entry).to_string();
        let Some(kind) = SourceKind::from_wire(entry.kind.as_deref()) else {
            issues.push(ValidationIssue::UnknownKind {
                app,
                kind: entry.kind.clone().unwrap_or_default(),
            });
            return None;
        };

        let before = issues.len();
        let forbid = |set: bool, field: &'static str, issues: &mut Vec<ValidationIssue>| {
            if set {
                issues.push(ValidationIssue::FieldNotAllowed {
                    app: app.clone(),
                    kind,
                    field,
                });
            }
        };

        let source = match kind {
            SourceKind::Prebuilt => {
                forbid(entry.dockerfile.is_some(), "dockerfile", issues);
                forbid(entry.dockerfile_url.is_some(), "dockerfile_url", issues);
                forbid(entry.context_url.is_some(), "context_url", issues);
                forbid(entry.repo.is_some(), "repo", issues);
                forbid(entry.git_ref.is_some(), "ref", issues);
                forbid(entry.dockerfile_path.is_some(), "dockerfile_path", issues);
                match non_empty(&entry.image) {
                    Some(image) => Some(PackageSource::Prebuilt {
                        image: image.to_string(),
                    }),
                    None => {
                        issues.push(ValidationIssue::MissingField {
                            app: app.clone(),
                            kind,
                            field: "image",
                        });
                        None
                    }
                }
            }
            SourceKind::Dockerfile => {
                forbid(entry.image.is_some(), "image", issues);
                forbid(entry.repo.is_some(), "repo", issues);
                forbid(entry.git_ref.is_some(), "ref", issues);
                forbid(entry.dockerfile_path.is_some(), "dockerfile_path", issues);
                match (non_empty(&entry.dockerfile), non_empty(&entry.dockerfile_url)) {
                    (Some(_), Some(_)) => {
                        issues.push(ValidationIssue::AmbiguousDockerfile { app: app.clone() });
                        None
                    }
                    (Some(text), None) => {
                        forbid(entry.context_url.is_some(), "context_url", issues);
                        Some(PackageSource::Dockerfile(DockerfileSource::Inline(
                            text.to_string(),
                        )))
                    }
                    (None, Some(url)) => Some(PackageSource::Dockerfile(DockerfileSource::Remote {
                        dockerfile_url: url.to_string(),
                        context_url: non_empty(&entry.context_url).map(str::to_string),
                    })),
                    (None, None) => {
                        issues.push(ValidationIssue::MissingField {
                            app: app.clone(),
                            kind,
                            field: "dockerfile or dockerfile_url",
                        });
                        None
                    }
                }
            }
            SourceKind::Git => {
                forbid(entry.image.is_some(), "image", issues);
                forbid(entry.dockerfile.is_some(), "dockerfile", issues);
                forbid(entry.dockerfile_url.is_some(), "dockerfile_url", issues);
                forbid(entry.context_url.is_some(), "context_url", issues);
                match non_empty(&entry.repo) {
                    Some(repo) => Some(PackageSource::Git {
                        repo: repo.to_string(),
                        git_ref: non_empty(&entry.git_ref).map(str::to_string),
                        dockerfile_path: non_empty(&entry.dockerfile_path)
                            .unwrap_or(DEFAULT_DOCKERFILE_PATH)
                            .to_string(),
                    }),
                    None => {
                        issues.push(ValidationIssue::MissingField {
                            app: app.clone(),
                            kind,
                            field: "repo",
                        });
                        None
                    }
                }
            }
        };

        if issues.len() > before {
            None
        } else {
            source
        }
    }

    fn check_env(apps: &[AppEntry], issues: &mut Vec<ValidationIssue>) {
        for entry in apps {
            for item in entry.env.iter().flatten() {
                let well_formed = item
                    .split_once('=')
                    .is_some_and(|(key, _)| !key.trim().is_empty());
                if !well_formed {
                    issues.push(ValidationIssue::MalformedEnv {
                        app: display_name(entry).to_string(),
                        entry: item.clone(),
                    });
                }
            }
        }
    }
}

fn display_name(entry: &AppEntry) -> &str {
    entry.name.as_deref().unwrap_or("<unnamed>")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues_of(yaml: &str) -> Vec<ValidationIssue> {
        match ManifestParser::load(yaml.as_bytes()) {
            Err(VulnPkgError::ManifestValidation(issues)) => issues,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_mixed_manifest() {
        let yaml = r#"
meta:
  author: "Security Lab Team"
  email: "security@example.com"
apps:
  - name: dvwa
    version: "1.0"
    image: vulnerables/web-dvwa:latest
    description: Damn Vulnerable Web Application
    ports: [80, 8080]
    tags: [CVE-2021-12345, SQLi]
    env:
      - MYSQL_ROOT_PASSWORD=root
  - name: custom-sqli-lab
    version: 1.0
    type: dockerfile
    dockerfile: |
      FROM php:8.0-apache
      EXPOSE 80
    ports: [80]
  - name: remote-vuln-app
    version: 2
    type: dockerfile
    dockerfile_url: https://example.com/Dockerfile
    context_url: https://example.com/context.tar.gz
    ports: [8080]
  - name: git-vuln-lab
    type: git
    repo: https://github.com/user/vulnerable-app.git
    ref: main
    ports: [3000]
"#;

        let manifest = ManifestParser::load(yaml.as_bytes()).unwrap();
        assert_eq!(manifest.meta.author.as_deref(), Some("Security Lab Team"));
        assert_eq!(
            manifest.app_names(),
            vec!["dvwa", "custom-sqli-lab", "remote-vuln-app", "git-vuln-lab"]
        );

        let dvwa = &manifest.apps[0];
        assert_eq!(dvwa.kind(), SourceKind::Prebuilt);
        assert_eq!(dvwa.ports, vec![80, 8080]);
        assert!(dvwa.tags.contains("SQLi"));

        assert_eq!(manifest.apps[1].version, "1.0");
        assert_eq!(manifest.apps[2].version, "2");
        assert!(matches!(
            &manifest.apps[2].source,
            PackageSource::Dockerfile(DockerfileSource::Remote { context_url: Some(_), .. })
        ));

        match &manifest.apps[3].source {
            PackageSource::Git {
                git_ref,
                dockerfile_path,
                ..
            } => {
                assert_eq!(git_ref.as_deref(), Some("main"));
                assert_eq!(dockerfile_path, DEFAULT_DOCKERFILE_PATH);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_broken_yaml() {
        let result = ManifestParser::parse(b"apps: [name: : :");
        assert!(matches!(result, Err(VulnPkgError::ManifestParse(_))));
    }

    #[test]
    fn test_validation_accumulates_in_order() {
        let yaml = r#"
apps:
  - name: dvwa
    image: a:latest
    ports: [80]
  - name: dvwa
    image: b:latest
    ports: []
  - name: builder
    type: dockerfile
    ports: [80]
    env: [NOEQUALS]
"#;

        let issues = issues_of(yaml);
        assert_eq!(
            issues,
            vec![
                ValidationIssue::DuplicateName {
                    name: "dvwa".to_string()
                },
                ValidationIssue::EmptyPorts {
                    app: "dvwa".to_string()
                },
                ValidationIssue::MissingField {
                    app: "builder".to_string(),
                    kind: SourceKind::Dockerfile,
                    field: "dockerfile or dockerfile_url",
                },
                ValidationIssue::MalformedEnv {
                    app: "builder".to_string(),
                    entry: "NOEQUALS".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_names_are_case_sensitive_but_must_be_hostnames() {
        let yaml = r#"
apps:
  - name: DVWA
    image: a:latest
    ports: [80]
  - name: dvwa
    image: b:latest
    ports: [80]
"#;

        let issues = issues_of(yaml);
        assert_eq!(
            issues,
            vec![ValidationIssue::InvalidName {
                name: "DVWA".to_string()
            }]
        );
    }

    #[test]
    fn test_proxy_name_is_reserved() {
        let yaml = r#"
apps:
  - name: dvwa
    image: a:latest
    ports: [80]
  - name: traefik
    image: traefik:latest
    ports: [8080]
"#;

        let issues = issues_of(yaml);
        assert_eq!(
            issues,
            vec![ValidationIssue::ReservedName {
                name: "traefik".to_string()
            }]
        );
        assert_eq!(
            issues[0].to_string(),
            "app name 'traefik' is reserved for the proxy"
        );
    }

    #[test]
    fn test_dockerfile_inline_and_remote_is_ambiguous() {
        let yaml = r#"
apps:
  - name: both
    type: dockerfile
    dockerfile: "FROM alpine"
    dockerfile_url: https://example.com/Dockerfile
    ports: [80]
"#;

        assert_eq!(
            issues_of(yaml),
            vec![ValidationIssue::AmbiguousDockerfile {
                app: "both".to_string()
            }]
        );
    }

    #[test]
    fn test_foreign_fields_are_rejected() {
        let yaml = r#"
apps:
  - name: pre
    image: a:latest
    repo: https://x/y.git
    ports: [80]
  - name: inline
    type: dockerfile
    dockerfile: "FROM alpine"
    context_url: https://example.com/ctx.tar.gz
    ports: [80]
"#;

        assert_eq!(
            issues_of(yaml),
            vec![
                ValidationIssue::FieldNotAllowed {
                    app: "pre".to_string(),
                    kind: SourceKind::Prebuilt,
                    field: "repo",
                },
                ValidationIssue::FieldNotAllowed {
                    app: "inline".to_string(),
                    kind: SourceKind::Dockerfile,
                    field: "context_url",
                },
            ]
        );
    }

    #[test]
    fn test_ports_out_of_range_and_repeated() {
        let yaml = r#"
apps:
  - name: web
    image: a:latest
    ports: [0, 80, 80, 70000]
"#;

        let issues = issues_of(yaml);
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&ValidationIssue::DuplicatePort {
            app: "web".to_string(),
            port: 80
        }));
    }

    #[test]
    fn test_unknown_type_and_missing_repo() {
        let yaml = r#"
apps:
  - name: chart
    type: helm
    ports: [80]
  - name: cloned
    type: git
    ports: [80]
"#;

        assert_eq!(
            issues_of(yaml),
            vec![
                ValidationIssue::UnknownKind {
                    app: "chart".to_string(),
                    kind: "helm".to_string()
                },
                ValidationIssue::MissingField {
                    app: "cloned".to_string(),
                    kind: SourceKind::Git,
                    field: "repo"
                },
            ]
        );
    }
}
