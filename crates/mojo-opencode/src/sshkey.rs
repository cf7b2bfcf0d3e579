//! SSH deploy key management (spec §4.6/§9): ed25519 key generation at
//! `~/.memory/opencode-keys/<project_name>`, mode 0600, with a passphrase
//! probe before the key is ever handed to a non-interactive git operation.
//! Grounded on `skynet-gateway/src/mcp_lifecycle.rs::run_with_timeout`'s
//! spawn-then-poll pattern, reused here via `process_ctl::run_with_timeout`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command as AsyncCommand;
use tracing::info;

use crate::error::{OpenCodeError, Result};
use crate::process_ctl::run_with_timeout;

const KEYGEN_TIMEOUT: Duration = Duration::from_secs(10);
const PASSPHRASE_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const KEY_COMMENT: &str = "mojoassistant-opencode";

/// Ensure an ed25519 deploy key exists at `<keys_dir>/<project_name>`.
/// Generates one if absent; validates an existing key is not
/// passphrase-protected either way.
pub async fn ensure_deploy_key(keys_dir: &Path, project_name: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(keys_dir).await?;
    let private_path = keys_dir.join(project_name);

    if !private_path.exists() {
        generate_key(&private_path).await?;
    }

    check_not_passphrase_protected(&private_path).await?;
    Ok(private_path)
}

async fn generate_key(private_path: &Path) -> Result<()> {
    let mut cmd = AsyncCommand::new("ssh-keygen");
    cmd.args([
        "-t",
        "ed25519",
        "-N",
        "",
        "-f",
        &private_path.to_string_lossy(),
        "-C",
        KEY_COMMENT,
    ]);
    cmd.stdin(std::process::Stdio::null());

    let output = run_with_timeout(&mut cmd, KEYGEN_TIMEOUT, "ssh-keygen -t ed25519").await?;
    if !output.status.success() {
        return Err(OpenCodeError::SubprocessFailed {
            command: "ssh-keygen -t ed25519".to_string(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    set_private_key_permissions(private_path)?;
    info!(path = %private_path.display(), "generated ed25519 deploy key");
    Ok(())
}

#[cfg(unix)]
fn set_private_key_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_private_key_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Spawn `ssh-keygen -y -f <path>` with closed stdin and a short timeout. A
/// hang (no exit within the timeout, because `ssh-keygen` is waiting on a
/// passphrase prompt that will never come) is treated as
/// passphrase-protected. This never inspects key bytes directly.
pub async fn check_not_passphrase_protected(private_path: &Path) -> Result<()> {
    let mut cmd = AsyncCommand::new("ssh-keygen");
    cmd.args(["-y", "-f", &private_path.to_string_lossy()]);
    cmd.stdin(std::process::Stdio::null());

    match run_with_timeout(&mut cmd, PASSPHRASE_PROBE_TIMEOUT, "ssh-keygen -y").await {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(OpenCodeError::Validation(format!(
            "deploy key at {} failed validation: {}",
            private_path.display(),
            String::from_utf8_lossy(&output.stderr)
        ))),
        Err(OpenCodeError::Timeout { .. }) => Err(OpenCodeError::PassphraseProtectedKey {
            path: private_path.display().to_string(),
            reason: "ssh-keygen -y did not exit within the probe timeout".to_string(),
        }),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_and_validates_a_fresh_key_if_ssh_keygen_is_available() {
        if which::which("ssh-keygen").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let keys_dir = dir.path().join("opencode-keys");
        let path = ensure_deploy_key(&keys_dir, "sample-repo").await.unwrap();
        assert!(path.exists());
        assert!(path.with_extension("pub").exists() || keys_dir.join("sample-repo.pub").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[tokio::test]
    async fn missing_key_file_surfaces_as_a_subprocess_failure_not_a_hang() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        if which::which("ssh-keygen").is_err() {
            return;
        }
        let result = check_not_passphrase_protected(&missing).await;
        assert!(result.is_err());
        assert!(!matches!(result, Err(OpenCodeError::PassphraseProtectedKey { .. })));
    }
}
