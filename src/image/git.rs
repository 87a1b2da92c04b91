//! Git sources, cloned with the `git` binary

use crate::error::{Result, VulnPkgError};
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;

/// Clone `repo` into `dest` and check out `git_ref` if given
pub async fn clone_repo(repo: &str, git_ref: Option<&str>, dest: &Path) -> Result<()> {
    tracing::info!("Cloning {}", repo);
    let dest_arg = dest.display().to_string();
    run_git(&["clone", "--quiet", "--", repo, &dest_arg], None)
        .await
        .map_err(|e| VulnPkgError::GitClone(format!("{}: {}", repo, e)))?;

    if let Some(reference) = git_ref {
        tracing::debug!("Checking out {} in {}", reference, repo);
        run_git(&["checkout", "--quiet", reference], Some(dest))
            .await
            .map_err(|e| {
                VulnPkgError::GitClone(format!("{}: cannot check out '{}': {}", repo, reference, e))
            })?;
    }

    Ok(())
}

/// Resolve a manifest `dockerfile_path` inside a checkout
///
/// Absolute paths and `..` components are refused so a manifest cannot point
/// the build at files outside the clone.
pub fn dockerfile_in(checkout: &Path, dockerfile_path: &str) -> Option<PathBuf> {
    let relative = Path::new(dockerfile_path);
    let mut resolved = checkout.to_path_buf();

    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if resolved == checkout {
        return None;
    }
    Some(resolved)
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> std::result::Result<(), String> {
    let mut command = Command::new("git");
    command.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .map_err(|e| format!("cannot run git: {}", e))?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(())
}
