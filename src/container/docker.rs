//! Docker engine driven through the `docker` CLI

use super::config::{ContainerRecord, ContainerSpec, ContainerStatus};
use super::engine::{BuildRequest, ContainerEngine, CreateOutcome};
use crate::error::{BuildStage, Result, VulnPkgError};
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::process::Command;

/// Default docker binary
pub const DOCKER_BINARY: &str = "docker";

/// Captured output of one docker invocation
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr.to_lowercase().contains(needle)
    }
}

/// `docker ps --format '{{json .}}'` line
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

/// Subset of `docker inspect` output
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectOutput {
    id: String,
    name: String,
    config: InspectConfig,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

/// Docker CLI client
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Create a client and make sure the daemon answers
    pub async fn connect() -> Result<Self> {
        let cli = Self {
            binary: DOCKER_BINARY.to_string(),
        };
        cli.ping().await?;
        Ok(cli)
    }

    /// Create a client for a specific binary without checking connectivity
    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
        }
    }

    async fn exec(&self, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                VulnPkgError::EngineUnavailable(format!("cannot run {}: {}", self.binary, e))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run and require success, mapping failure to a container operation error
    async fn exec_op(&self, op: &str, args: &[String]) -> Result<String> {
        let output = self.exec(args).await?;
        if !output.success {
            return Err(VulnPkgError::container_op(op, output.stderr));
        }
        Ok(output.stdout)
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Arguments for `docker create`
fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = strings(&["create", "--name", spec.name.as_str()]);

    if let Some(network) = &spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    if let Some(restart) = &spec.restart {
        args.push("--restart".to_string());
        args.push(restart.clone());
    }
    for entry in &spec.env {
        args.push("--env".to_string());
        args.push(entry.clone());
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    for port in &spec.exposed_ports {
        args.push("--expose".to_string());
        args.push(port.to_string());
    }
    for mapping in &spec.published_ports {
        args.push("--publish".to_string());
        args.push(format!("{}:{}", mapping.host_port, mapping.container_port));
    }
    for volume in &spec.volumes {
        args.push("--volume".to_string());
        args.push(volume.to_bind());
    }

    args.push(spec.image.clone());
    args.extend(spec.cmd.iter().cloned());
    args
}

/// Parse the comma-joined label string `docker ps` prints
fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_ps_line(line: &str) -> Result<ContainerRecord> {
    let ps: PsLine = serde_json::from_str(line)?;
    Ok(ContainerRecord {
        id: ps.id,
        // Linked containers list several names; the first is the real one
        name: ps.names.split(',').next().unwrap_or_default().to_string(),
        image: ps.image,
        status: ContainerStatus::from_engine(&ps.state),
        labels: parse_labels(&ps.labels),
    })
}

fn parse_inspect(raw: &str) -> Result<ContainerRecord> {
    let inspect: InspectOutput = serde_json::from_str(raw.trim())?;
    Ok(ContainerRecord {
        id: inspect.id,
        name: inspect.name.trim_start_matches('/').to_string(),
        image: inspect.config.image,
        status: ContainerStatus::from_engine(&inspect.state.status),
        labels: inspect.config.labels.unwrap_or_default(),
    })
}

impl ContainerEngine for DockerCli {
    async fn ping(&self) -> Result<()> {
        let output = self
            .exec(&strings(&["version", "--format", "{{.Server.Version}}"]))
            .await?;
        if !output.success {
            return Err(VulnPkgError::EngineUnavailable(output.stderr));
        }
        tracing::debug!("Docker server {}", output.stdout.trim());
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self
            .exec(&strings(&["image", "inspect", "--format", "{{.Id}}", image]))
            .await?;
        if output.success {
            return Ok(true);
        }
        if output.stderr_contains("no such image") {
            return Ok(false);
        }
        Err(VulnPkgError::container_op("image inspect", output.stderr))
    }

    async fn pull(&self, image: &str) -> Result<()> {
        tracing::info!("Pulling image {}", image);
        let output = self.exec(&strings(&["pull", image])).await?;
        if !output.success {
            return Err(VulnPkgError::ImagePull {
                image: image.to_string(),
                message: output.stderr,
            });
        }
        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> Result<()> {
        tracing::info!(
            "Building {} from {}",
            request.tag,
            request.context_dir.display()
        );
        let args = vec![
            "build".to_string(),
            "--tag".to_string(),
            request.tag.clone(),
            "--file".to_string(),
            request.dockerfile.display().to_string(),
            request.context_dir.display().to_string(),
        ];
        let output = self.exec(&args).await?;
        if !output.success {
            return Err(VulnPkgError::build(BuildStage::Build, output.stderr));
        }
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let output = self.exec(&strings(&["rmi", image])).await?;
        if output.success || output.stderr_contains("no such image") {
            return Ok(());
        }
        Err(VulnPkgError::container_op("remove image", output.stderr))
    }

    async fn ensure_network(&self, name: &str) -> Result<bool> {
        let inspect = self.exec(&strings(&["network", "inspect", name])).await?;
        if inspect.success {
            return Ok(false);
        }

        let output = self.exec(&strings(&["network", "create", name])).await?;
        if output.success {
            tracing::info!("Created network {}", name);
            return Ok(true);
        }
        // Another invocation won the race
        if output.stderr_contains("already exists") {
            return Ok(false);
        }
        Err(VulnPkgError::container_op("network create", output.stderr))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<CreateOutcome> {
        let output = self.exec(&create_args(spec)).await?;
        if output.success {
            return Ok(CreateOutcome::Created(output.stdout.trim().to_string()));
        }
        if output.stderr_contains("already in use") {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(VulnPkgError::container_op("create", output.stderr))
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.exec_op("start", &strings(&["start", name])).await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        self.exec_op("stop", &strings(&["stop", name])).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let output = self.exec(&strings(&["rm", name])).await?;
        if output.success || output.stderr_contains("no such container") {
            return Ok(());
        }
        Err(VulnPkgError::container_op("remove", output.stderr))
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerRecord>> {
        let output = self
            .exec(&strings(&[
                "container",
                "inspect",
                "--format",
                "{{json .}}",
                name,
            ]))
            .await?;
        if output.success {
            return parse_inspect(&output.stdout).map(Some);
        }
        if output.stderr_contains("no such container") {
            return Ok(None);
        }
        Err(VulnPkgError::container_op("inspect", output.stderr))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ContainerRecord>> {
        let filter = format!("name={}", prefix);
        let stdout = self
            .exec_op(
                "list",
                &strings(&[
                    "ps",
                    "--all",
                    "--no-trunc",
                    "--filter",
                    filter.as_str(),
                    "--format",
                    "{{json .}}",
                ]),
            )
            .await?;

        let mut records = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let record = parse_ps_line(line)?;
            // The name filter is a substring match
            if record.name.starts_with(prefix) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_args_order() {
        let spec = ContainerSpec::new("vuln-pkg-dvwa", "vulnerables/web-dvwa:latest")
            .network("vuln-pkg")
            .env("MYSQL_ROOT_PASSWORD=root")
            .expose(80)
            .labels([("traefik.enable".to_string(), "true".to_string())]);

        let args = create_args(&spec);
        assert_eq!(
            args,
            strings(&[
                "create",
                "--name",
                "vuln-pkg-dvwa",
                "--network",
                "vuln-pkg",
                "--env",
                "MYSQL_ROOT_PASSWORD=root",
                "--label",
                "traefik.enable=true",
                "--expose",
                "80",
                "vulnerables/web-dvwa:latest",
            ])
        );
    }

    #[test]
    fn test_parse_ps_line() {
        let line = r#"{"Command":"\"/main.sh\"","ID":"abc123","Image":"vulnerables/web-dvwa:latest","Labels":"vuln-pkg.app=dvwa,vuln-pkg.managed=true","Names":"vuln-pkg-dvwa","State":"running","Status":"Up 2 minutes"}"#;

        let record = parse_ps_line(line).unwrap();
        assert_eq!(record.name, "vuln-pkg-dvwa");
        assert_eq!(record.status, ContainerStatus::Running);
        assert_eq!(record.labels.get("vuln-pkg.app").map(String::as_str), Some("dvwa"));
    }

    #[test]
    fn test_parse_inspect() {
        let raw = r#"{"Id":"abc123","Name":"/vuln-pkg-dvwa","Config":{"Image":"vulnerables/web-dvwa:latest","Labels":null},"State":{"Status":"exited","Running":false}}"#;

        let record = parse_inspect(raw).unwrap();
        assert_eq!(record.name, "vuln-pkg-dvwa");
        assert_eq!(record.status, ContainerStatus::Exited);
        assert!(record.labels.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_unavailable() {
        let cli = DockerCli::with_binary("/nonexistent/docker-binary");
        assert!(matches!(
            cli.ping().await,
            Err(VulnPkgError::EngineUnavailable(_))
        ));
    }
}
