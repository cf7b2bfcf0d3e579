//! Named git worktrees ("sandboxes") under a project's checkout (spec
//! §4.6): a thin wrapper over `git worktree`, with name validation and a
//! guard against deleting the primary checkout since git worktree itself
//! enforces nothing there.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command as AsyncCommand;

use crate::error::{OpenCodeError, Result};
use crate::process_ctl::run_with_timeout;
use crate::types::SandboxInfo;

const WORKTREE_TIMEOUT: Duration = Duration::from_secs(60);
const PRIMARY_NAME: &str = "primary";

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains("..") || name == PRIMARY_NAME {
        return Err(OpenCodeError::Validation(format!("invalid sandbox name: '{name}'")));
    }
    Ok(())
}

pub async fn create_sandbox(
    repo_dir: &Path,
    sandboxes_dir: &Path,
    project_git_url: &str,
    name: &str,
    branch: &str,
) -> Result<SandboxInfo> {
    validate_name(name)?;
    let path = sandboxes_dir.join(name);
    if path.exists() {
        return Err(OpenCodeError::SandboxAlreadyExists {
            project: project_git_url.to_string(),
            name: name.to_string(),
        });
    }
    tokio::fs::create_dir_all(sandboxes_dir).await?;

    let mut cmd = AsyncCommand::new("git");
    cmd.args(["-C", &repo_dir.to_string_lossy(), "worktree", "add", &path.to_string_lossy(), branch]);
    let output = run_with_timeout(&mut cmd, WORKTREE_TIMEOUT, "git worktree add").await?;
    if !output.status.success() {
        return Err(OpenCodeError::SubprocessFailed {
            command: "git worktree add".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(SandboxInfo { name: name.to_string(), branch: branch.to_string(), path: path.to_string_lossy().to_string(), is_primary: false })
}

pub async fn list_sandboxes(repo_dir: &Path) -> Result<Vec<SandboxInfo>> {
    let mut cmd = AsyncCommand::new("git");
    cmd.args(["-C", &repo_dir.to_string_lossy(), "worktree", "list", "--porcelain"]);
    let output = run_with_timeout(&mut cmd, WORKTREE_TIMEOUT, "git worktree list").await?;
    if !output.status.success() {
        return Err(OpenCodeError::SubprocessFailed {
            command: "git worktree list".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout), repo_dir))
}

fn parse_worktree_list(porcelain: &str, repo_dir: &Path) -> Vec<SandboxInfo> {
    let mut entries = Vec::new();
    let mut current_path: Option<String> = None;
    let mut current_branch = String::new();

    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(prev_path) = current_path.take() {
                entries.push(finalize_entry(prev_path, std::mem::take(&mut current_branch), repo_dir));
            }
            current_path = Some(path.to_string());
        } else if let Some(branch_ref) = line.strip_prefix("branch ") {
            current_branch = branch_ref.rsplit('/').next().unwrap_or(branch_ref).to_string();
        }
    }
    if let Some(path) = current_path {
        entries.push(finalize_entry(path, current_branch, repo_dir));
    }
    entries
}

fn finalize_entry(path: String, branch: String, repo_dir: &Path) -> SandboxInfo {
    let is_primary = Path::new(&path) == repo_dir;
    let name = if is_primary {
        PRIMARY_NAME.to_string()
    } else {
        Path::new(&path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
    };
    SandboxInfo { name, branch, path, is_primary }
}

pub async fn delete_sandbox(repo_dir: &Path, sandboxes_dir: &Path, project_git_url: &str, name: &str) -> Result<()> {
    validate_name(name)?;
    let path = sandboxes_dir.join(name);
    if !path.exists() {
        return Err(OpenCodeError::SandboxNotFound { project: project_git_url.to_string(), name: name.to_string() });
    }

    let mut cmd = AsyncCommand::new("git");
    cmd.args(["-C", &repo_dir.to_string_lossy(), "worktree", "remove", &path.to_string_lossy(), "--force"]);
    let output = run_with_timeout(&mut cmd, WORKTREE_TIMEOUT, "git worktree remove").await?;
    if !output.status.success() {
        return Err(OpenCodeError::SubprocessFailed {
            command: "git worktree remove".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_primary_and_path_traversal_names() {
        assert!(validate_name(PRIMARY_NAME).is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("nested/name").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("feature-x").is_ok());
    }

    #[test]
    fn porcelain_output_parses_primary_and_named_worktrees() {
        let porcelain = "worktree /repo\nbranch refs/heads/main\n\nworktree /repo/../opencode-sandboxes/p/feature-x\nbranch refs/heads/feature-x\n";
        let entries = parse_worktree_list(porcelain, Path::new("/repo"));
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_primary);
        assert_eq!(entries[0].name, "primary");
        assert!(!entries[1].is_primary);
        assert_eq!(entries[1].name, "feature-x");
    }
}
