//! Clone/update a project's repo using its deploy key (spec §4.6), with
//! hard timeouts so a hung non-interactive git op can't wedge the manager.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command as AsyncCommand;

use crate::error::{OpenCodeError, Result};
use crate::process_ctl::run_with_timeout;

const CLONE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn ssh_command(ssh_key_path: &Path) -> String {
    format!(
        "ssh -i {} -o StrictHostKeyChecking=accept-new -o BatchMode=yes",
        ssh_key_path.display()
    )
}

/// Clone `git_url` into `base_dir` if it isn't already a checkout there,
/// otherwise fast-forward it.
pub async fn clone_or_update(git_url: &str, base_dir: &Path, ssh_key_path: &Path) -> Result<()> {
    if base_dir.join(".git").exists() {
        update(base_dir, ssh_key_path).await
    } else {
        clone(git_url, base_dir, ssh_key_path).await
    }
}

async fn clone(git_url: &str, base_dir: &Path, ssh_key_path: &Path) -> Result<()> {
    if let Some(parent) = base_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut cmd = AsyncCommand::new("git");
    cmd.args(["clone", git_url, &base_dir.to_string_lossy()]);
    cmd.env("GIT_SSH_COMMAND", ssh_command(ssh_key_path));

    let output = run_with_timeout(&mut cmd, CLONE_TIMEOUT, "git clone").await?;
    if !output.status.success() {
        return Err(OpenCodeError::SubprocessFailed {
            command: "git clone".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

async fn update(base_dir: &Path, ssh_key_path: &Path) -> Result<()> {
    let mut cmd = AsyncCommand::new("git");
    cmd.args(["-C", &base_dir.to_string_lossy(), "pull", "--ff-only"]);
    cmd.env("GIT_SSH_COMMAND", ssh_command(ssh_key_path));

    let output = run_with_timeout(&mut cmd, UPDATE_TIMEOUT, "git pull --ff-only").await?;
    if !output.status.success() {
        return Err(OpenCodeError::SubprocessFailed {
            command: "git pull --ff-only".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_command_embeds_the_key_path_and_disables_prompting() {
        let cmd = ssh_command(Path::new("/tmp/key"));
        assert!(cmd.contains("-i /tmp/key"));
        assert!(cmd.contains("BatchMode=yes"));
    }
}
