//! Image builder - materializes runnable images for manifest applications
//!
//! Prebuilt applications already name their image. Dockerfile and git
//! applications are staged into a scratch build context and built by the
//! container engine under a tag derived from the application name, so a
//! rebuild overwrites the previous image instead of leaving a new one behind.

use super::git;
use crate::config::built_image_tag;
use crate::container::{BuildRequest, ContainerEngine};
use crate::error::{BuildStage, Result, VulnPkgError};
use crate::manifest::{AppSpec, DockerfileSource, Fetcher, PackageSource};
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name the staged Dockerfile is written to
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Staged build context, removed when dropped
#[derive(Debug)]
pub struct BuildContext {
    /// Context directory handed to the engine
    pub context_dir: PathBuf,
    /// Dockerfile inside (or below) the context
    pub dockerfile: PathBuf,
    _workspace: TempDir,
}

/// Image reference an application runs from
pub fn image_ref(app: &AppSpec) -> String {
    match &app.source {
        PackageSource::Prebuilt { image } => image.clone(),
        PackageSource::Dockerfile(_) | PackageSource::Git { .. } => built_image_tag(&app.name),
    }
}

/// Image builder
pub struct ImageBuilder<'a, E: ContainerEngine> {
    engine: &'a E,
    fetcher: Fetcher,
    /// Parent directory for scratch build contexts
    work_root: PathBuf,
}

impl<'a, E: ContainerEngine> ImageBuilder<'a, E> {
    /// Create a new image builder
    pub fn new(engine: &'a E, fetcher: Fetcher, work_root: PathBuf) -> Self {
        Self {
            engine,
            fetcher,
            work_root,
        }
    }

    /// Produce the application's image and return its reference
    pub async fn materialize(&self, app: &AppSpec) -> Result<String> {
        let context = match &app.source {
            PackageSource::Prebuilt { image } => return Ok(image.clone()),
            PackageSource::Dockerfile(DockerfileSource::Inline(text)) => {
                self.inline_context(app, text).await?
            }
            PackageSource::Dockerfile(DockerfileSource::Remote {
                dockerfile_url,
                context_url,
            }) => {
                self.remote_context(app, dockerfile_url, context_url.as_deref())
                    .await?
            }
            PackageSource::Git {
                repo,
                git_ref,
                dockerfile_path,
            } => {
                self.git_context(app, repo, git_ref.as_deref(), dockerfile_path)
                    .await?
            }
        };

        let tag = built_image_tag(&app.name);
        let request = BuildRequest {
            context_dir: context.context_dir.clone(),
            dockerfile: context.dockerfile.clone(),
            tag: tag.clone(),
        };
        self.engine.build(&request).await?;

        tracing::info!("Built {} for {}", tag, app.name);
        Ok(tag)
    }

    fn workspace(&self, app: &AppSpec) -> Result<TempDir> {
        std::fs::create_dir_all(&self.work_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", app.name))
            .tempdir_in(&self.work_root)?;
        Ok(dir)
    }

    async fn inline_context(&self, app: &AppSpec, text: &str) -> Result<BuildContext> {
        let workspace = self.workspace(app)?;
        let dockerfile = workspace.path().join(DOCKERFILE_NAME);
        tokio::fs::write(&dockerfile, text).await?;

        Ok(BuildContext {
            context_dir: workspace.path().to_path_buf(),
            dockerfile,
            _workspace: workspace,
        })
    }

    async fn remote_context(
        &self,
        app: &AppSpec,
        dockerfile_url: &str,
        context_url: Option<&str>,
    ) -> Result<BuildContext> {
        let workspace = self.workspace(app)?;
        let context_dir = workspace.path().to_path_buf();

        if let Some(url) = context_url {
            let archive = self
                .fetcher
                .fetch(url)
                .await
                .map_err(|e| VulnPkgError::build(BuildStage::Fetch, e.to_string()))?;
            unpack_context(&archive, &context_dir).map_err(|e| {
                VulnPkgError::build(
                    BuildStage::Fetch,
                    format!("{}: cannot unpack context archive: {}", url, e),
                )
            })?;
            tracing::debug!("Unpacked context {} for {}", url, app.name);
        }

        let text = self
            .fetcher
            .fetch(dockerfile_url)
            .await
            .map_err(|e| VulnPkgError::build(BuildStage::Fetch, e.to_string()))?;
        let dockerfile = context_dir.join(DOCKERFILE_NAME);
        tokio::fs::write(&dockerfile, text).await?;

        Ok(BuildContext {
            context_dir,
            dockerfile,
            _workspace: workspace,
        })
    }

    async fn git_context(
        &self,
        app: &AppSpec,
        repo: &str,
        git_ref: Option<&str>,
        dockerfile_path: &str,
    ) -> Result<BuildContext> {
        let workspace = self.workspace(app)?;
        let checkout = workspace.path().join("src");
        git::clone_repo(repo, git_ref, &checkout).await?;

        let dockerfile = git::dockerfile_in(&checkout, dockerfile_path).ok_or_else(|| {
            VulnPkgError::build(
                BuildStage::Fetch,
                format!("dockerfile_path '{}' leaves the repository", dockerfile_path),
            )
        })?;
        if !dockerfile.is_file() {
            return Err(VulnPkgError::build(
                BuildStage::Fetch,
                format!("{} has no file at '{}'", repo, dockerfile_path),
            ));
        }

        Ok(BuildContext {
            context_dir: checkout,
            dockerfile,
            _workspace: workspace,
        })
    }
}

/// Unpack a gzip tarball into `dest`
fn unpack_context(archive: &[u8], dest: &Path) -> std::io::Result<()> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    tar.set_preserve_permissions(false);
    tar.unpack(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::MockEngine;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn app(name: &str, source: PackageSource) -> AppSpec {
        AppSpec {
            name: name.to_string(),
            version: "1.0".to_string(),
            source,
            ports: vec![80],
            tags: BTreeSet::new(),
            description: None,
            env: Vec::new(),
        }
    }

    fn context_archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args([
                "-c",
                "user.name=vuln-pkg",
                "-c",
                "user.email=lab@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    #[tokio::test]
    async fn test_prebuilt_is_a_no_op() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().to_path_buf());

        let spec = app(
            "dvwa",
            PackageSource::Prebuilt {
                image: "vulnerables/web-dvwa:latest".to_string(),
            },
        );
        assert_eq!(
            builder.materialize(&spec).await.unwrap(),
            "vulnerables/web-dvwa:latest"
        );
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_inline_dockerfile_builds_stable_tag() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().to_path_buf());
        let spec = app(
            "custom-sqli-lab",
            PackageSource::Dockerfile(DockerfileSource::Inline(
                "FROM php:8.0-apache\nEXPOSE 80\n".to_string(),
            )),
        );

        let first = builder.materialize(&spec).await.unwrap();
        let second = builder.materialize(&spec).await.unwrap();

        assert_eq!(first, "vuln-pkg/custom-sqli-lab:latest");
        assert_eq!(first, second);
        let built = engine.built_dockerfiles();
        assert_eq!(built.len(), 2);
        assert!(built[0].1.starts_with("FROM php:8.0-apache"));
    }

    #[tokio::test]
    async fn test_scratch_context_is_cleaned_up() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let work_root = temp.path().join("build");
        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), work_root.clone());
        let spec = app(
            "inline",
            PackageSource::Dockerfile(DockerfileSource::Inline("FROM alpine\n".to_string())),
        );

        builder.materialize(&spec).await.unwrap();
        assert_eq!(std::fs::read_dir(&work_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remote_dockerfile_with_context() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let dockerfile = temp.path().join("Dockerfile.remote");
        std::fs::write(&dockerfile, "FROM nginx\nCOPY index.html /usr/share/nginx/html/\n").unwrap();
        let archive = temp.path().join("context.tar.gz");
        std::fs::write(&archive, context_archive(&[("index.html", "<h1>lab</h1>")])).unwrap();

        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().join("build"));
        let spec = app(
            "remote-vuln-app",
            PackageSource::Dockerfile(DockerfileSource::Remote {
                dockerfile_url: format!("file://{}", dockerfile.display()),
                context_url: Some(format!("file://{}", archive.display())),
            }),
        );

        let tag = builder.materialize(&spec).await.unwrap();
        assert_eq!(tag, "vuln-pkg/remote-vuln-app:latest");
        assert!(engine.built_dockerfiles()[0].1.starts_with("FROM nginx"));
    }

    #[tokio::test]
    async fn test_remote_fetch_failure_is_fetch_stage() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().to_path_buf());
        let spec = app(
            "remote",
            PackageSource::Dockerfile(DockerfileSource::Remote {
                dockerfile_url: temp.path().join("missing").display().to_string(),
                context_url: None,
            }),
        );

        let err = builder.materialize(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            VulnPkgError::Build {
                stage: BuildStage::Fetch,
                ..
            }
        ));
        assert!(engine.calls_to("build").is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_is_build_stage() {
        let engine = MockEngine::new();
        engine.fail_builds();
        let temp = tempdir().unwrap();
        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().to_path_buf());
        let spec = app(
            "broken",
            PackageSource::Dockerfile(DockerfileSource::Inline("FROM nowhere\n".to_string())),
        );

        let err = builder.materialize(&spec).await.unwrap_err();
        assert!(matches!(
            err,
            VulnPkgError::Build {
                stage: BuildStage::Build,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_git_clone_failure_is_distinct() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().join("build"));
        let spec = app(
            "git-lab",
            PackageSource::Git {
                repo: temp.path().join("nope.git").display().to_string(),
                git_ref: Some("main".to_string()),
                dockerfile_path: "./Dockerfile".to_string(),
            },
        );

        let err = builder.materialize(&spec).await.unwrap_err();
        assert!(matches!(err, VulnPkgError::GitClone(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_git_checkout_of_ref_with_nested_dockerfile() {
        let engine = MockEngine::new();
        let temp = tempdir().unwrap();
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(repo.join("docker")).unwrap();
        git(&repo, &["init", "--quiet"]);

        std::fs::write(repo.join("docker/app.Dockerfile"), "FROM alpine\nCOPY app.sh /\n").unwrap();
        std::fs::write(repo.join("app.sh"), "echo lab\n").unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "--quiet", "-m", "first"]);
        git(&repo, &["tag", "v1"]);

        std::fs::write(repo.join("docker/app.Dockerfile"), "FROM busybox\n").unwrap();
        git(&repo, &["commit", "--quiet", "-am", "second"]);

        let builder = ImageBuilder::new(&engine, Fetcher::new().unwrap(), temp.path().join("build"));
        let spec = app(
            "gl",
            PackageSource::Git {
                repo: repo.display().to_string(),
                git_ref: Some("v1".to_string()),
                dockerfile_path: "docker/app.Dockerfile".to_string(),
            },
        );

        let tag = builder.materialize(&spec).await.unwrap();

        assert_eq!(tag, "vuln-pkg/gl:latest");
        assert_eq!(
            engine.built_dockerfiles(),
            vec![(
                "vuln-pkg/gl:latest".to_string(),
                "FROM alpine\nCOPY app.sh /\n".to_string()
            )]
        );
        assert!(engine.has_image("vuln-pkg/gl:latest"));
    }

    #[test]
    fn test_image_ref_by_kind() {
        let prebuilt = app(
            "dvwa",
            PackageSource::Prebuilt {
                image: "x:latest".to_string(),
            },
        );
        let git = app(
            "lab",
            PackageSource::Git {
                repo: "https://x/y.git".to_string(),
                git_ref: None,
                dockerfile_path: "./Dockerfile".to_string(),
            },
        );
        assert_eq!(image_ref(&prebuilt), "x:latest");
        assert_eq!(image_ref(&git), "vuln-pkg/lab:latest");
    }
}
