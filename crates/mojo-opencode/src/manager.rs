//! `OpenCodeManager` (C7): owns the project registry, the shared gateway
//! process that fronts all running OpenCode instances, SSH deploy keys,
//! and sandbox worktrees. Grounded on `skynet-terminal/src/manager.rs`'s
//! single-struct-owns-a-map shape, generalised from PTY sessions to
//! external OpenCode server processes, plus `skynet-gateway/src/
//! mcp_lifecycle.rs`'s spawn/probe/register pattern for the gateway
//! process itself.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mojo_core::clock::Clock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{OpenCodeError, Result};
use crate::giturl::{derive_project_name, normalize};
use crate::gitops::clone_or_update;
use crate::ports;
use crate::process_ctl::{pid_is_alive, port_answers, stop_pid};
use crate::sshkey::ensure_deploy_key;
use crate::state::{load_gateway_state, load_opencode_state, save_gateway_state, save_opencode_state, OpenCodeStateFile};
use crate::types::{DuplicateGroup, GatewayState, Project, ProjectStatus, SandboxInfo, ServerEntry, ServerStatus};
use crate::worktree;

const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct OpenCodeManagerConfig {
    pub data_dir: PathBuf,
    pub opencode_bin: String,
    pub opencode_mcp_tool_path: Option<String>,
    pub global_mcp_tool_port: u16,
    pub global_mcp_bearer_token: String,
}

impl OpenCodeManagerConfig {
    fn state_path(&self) -> PathBuf {
        self.data_dir.join("opencode-state.json")
    }
    fn gateway_path(&self) -> PathBuf {
        self.data_dir.join("opencode-mcp-tool-servers.json")
    }
    fn keys_dir(&self) -> PathBuf {
        self.data_dir.join("opencode-keys")
    }
    fn sandboxes_dir(&self, project_name: &str) -> PathBuf {
        self.data_dir.join("opencode-sandboxes").join(project_name)
    }
}

pub struct OpenCodeManager {
    state: Mutex<OpenCodeStateFile>,
    gateway: Mutex<GatewayState>,
    config: OpenCodeManagerConfig,
    clock: Arc<dyn Clock>,
}

impl OpenCodeManager {
    pub async fn load(config: OpenCodeManagerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let state = load_opencode_state(&config.state_path())?;
        let gateway = load_gateway_state(&config.gateway_path(), config.global_mcp_tool_port, config.global_mcp_bearer_token.clone())?;
        Ok(Self { state: Mutex::new(state), gateway: Mutex::new(gateway), config, clock })
    }

    async fn persist_state(&self) -> Result<()> {
        save_opencode_state(&self.config.state_path(), &*self.state.lock().await)
    }

    async fn persist_gateway(&self) -> Result<()> {
        save_gateway_state(&self.config.gateway_path(), &*self.gateway.lock().await)
    }

    pub async fn start_project(&self, git_url: &str, base_dir_override: Option<String>) -> Result<Project> {
        let normalized = normalize(git_url);
        let project_name = derive_project_name(&normalized);

        let existing = self.state.lock().await.projects.get(&normalized).cloned();
        if let Some(existing) = &existing {
            if existing.status == ProjectStatus::Running && existing.pid.map(pid_is_alive).unwrap_or(false) {
                return Ok(existing.clone());
            }
        }

        let base_dir = base_dir_override
            .map(PathBuf::from)
            .or_else(|| existing.as_ref().map(|p| PathBuf::from(&p.base_dir)))
            .unwrap_or_else(|| self.config.sandboxes_dir(&project_name).join("repo"));

        let port = match existing.as_ref().map(|p| p.opencode_port) {
            Some(port) => port,
            None => {
                let reserved: HashSet<u16> = self.state.lock().await.projects.values().map(|p| p.opencode_port).collect();
                ports::allocate(&reserved)?
            }
        };

        let ssh_key_path = ensure_deploy_key(&self.config.keys_dir(), &project_name).await?;
        clone_or_update(git_url, &base_dir, &ssh_key_path).await?;

        let args = vec!["serve".to_string(), "--port".to_string(), port.to_string(), "--host".to_string(), "0.0.0.0".to_string()];
        let pid = crate::process_ctl::spawn_detached(&self.config.opencode_bin, &args, &[], Some(base_dir.as_path()))?;

        let now = self.clock.now();
        let project = Project {
            git_url: git_url.to_string(),
            project_name: project_name.clone(),
            base_dir: base_dir.to_string_lossy().to_string(),
            opencode_port: port,
            pid: Some(pid),
            ssh_key_path: ssh_key_path.to_string_lossy().to_string(),
            status: ProjectStatus::Running,
            created_at: existing.as_ref().map(|p| p.created_at).unwrap_or(now),
            last_seen_at: now,
        };

        {
            let mut state = self.state.lock().await;
            state.projects.insert(normalized.clone(), project.clone());
        }
        self.persist_state().await?;
        self.register_in_gateway(&project).await?;

        info!(project = %project_name, port, "started OpenCode project");
        Ok(project)
    }

    pub async fn stop_project(&self, git_url: &str) -> Result<()> {
        let normalized = normalize(git_url);
        let mut project = {
            let state = self.state.lock().await;
            state.projects.get(&normalized).cloned().ok_or_else(|| OpenCodeError::ProjectNotFound(git_url.to_string()))?
        };

        if let Some(pid) = project.pid {
            stop_pid(pid, GRACEFUL_STOP_TIMEOUT).await?;
        }
        project.status = ProjectStatus::Stopped;
        project.pid = None;
        project.last_seen_at = self.clock.now();

        {
            let mut state = self.state.lock().await;
            state.projects.insert(normalized.clone(), project);
        }
        self.persist_state().await?;
        self.unregister_from_gateway(&normalized).await?;
        info!(git_url, "stopped OpenCode project");
        Ok(())
    }

    pub async fn project_status(&self, git_url: &str) -> Result<Project> {
        let normalized = normalize(git_url);
        let mut project = {
            let state = self.state.lock().await;
            state.projects.get(&normalized).cloned().ok_or_else(|| OpenCodeError::ProjectNotFound(git_url.to_string()))?
        };

        if project.status == ProjectStatus::Running {
            let alive = project.pid.map(pid_is_alive).unwrap_or(false)
                && port_answers(project.opencode_port, HEALTH_PROBE_TIMEOUT).await;
            if !alive {
                project.status = ProjectStatus::Crashed;
                let mut state = self.state.lock().await;
                state.projects.insert(normalized, project.clone());
                drop(state);
                self.persist_state().await?;
                warn!(git_url, "OpenCode project health check failed, marked crashed");
            }
        }
        Ok(project)
    }

    pub async fn list_projects(&self) -> Vec<Project> {
        self.state.lock().await.projects.values().cloned().collect()
    }

    pub async fn get_deploy_key(&self, git_url: &str) -> Result<String> {
        let normalized = normalize(git_url);
        let project = {
            let state = self.state.lock().await;
            state.projects.get(&normalized).cloned().ok_or_else(|| OpenCodeError::ProjectNotFound(git_url.to_string()))?
        };
        let pub_path = PathBuf::from(format!("{}.pub", project.ssh_key_path));
        let contents = tokio::fs::read_to_string(&pub_path).await?;
        Ok(contents)
    }

    pub async fn detect_duplicates(&self) -> Vec<DuplicateGroup> {
        let state = self.state.lock().await;
        let mut groups: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for project in state.projects.values() {
            groups.entry(normalize(&project.git_url)).or_default().push(project.git_url.clone());
        }
        groups
            .into_iter()
            .filter(|(_, urls)| urls.len() > 1)
            .map(|(normalized, urls)| DuplicateGroup {
                normalized_git_url: normalized,
                git_urls: urls,
                recommendation: "merge these project records; they refer to the same repository".to_string(),
            })
            .collect()
    }

    pub async fn sandbox_create(&self, git_url: &str, name: &str, branch: &str) -> Result<SandboxInfo> {
        let project = self.project_by_url(git_url).await?;
        let sandboxes_dir = self.config.sandboxes_dir(&project.project_name);
        worktree::create_sandbox(&PathBuf::from(&project.base_dir), &sandboxes_dir, git_url, name, branch).await
    }

    pub async fn sandbox_list(&self, git_url: &str) -> Result<Vec<SandboxInfo>> {
        let project = self.project_by_url(git_url).await?;
        worktree::list_sandboxes(&PathBuf::from(&project.base_dir)).await
    }

    pub async fn sandbox_delete(&self, git_url: &str, name: &str) -> Result<()> {
        let project = self.project_by_url(git_url).await?;
        let sandboxes_dir = self.config.sandboxes_dir(&project.project_name);
        worktree::delete_sandbox(&PathBuf::from(&project.base_dir), &sandboxes_dir, git_url, name).await
    }

    async fn project_by_url(&self, git_url: &str) -> Result<Project> {
        let normalized = normalize(git_url);
        self.state.lock().await.projects.get(&normalized).cloned().ok_or_else(|| OpenCodeError::ProjectNotFound(git_url.to_string()))
    }

    async fn register_in_gateway(&self, project: &Project) -> Result<()> {
        let mut gateway = self.gateway.lock().await;
        if let Some(entry) = gateway.servers.iter_mut().find(|s| s.project_git_url == project.git_url) {
            entry.opencode_url = format!("http://127.0.0.1:{}", project.opencode_port);
            entry.status = ServerStatus::Active;
        } else {
            gateway.servers.push(ServerEntry {
                project_git_url: project.git_url.clone(),
                opencode_url: format!("http://127.0.0.1:{}", project.opencode_port),
                password: self.config.global_mcp_bearer_token.clone(),
                ssh_key_path: project.ssh_key_path.clone(),
                sandbox_dir: project.base_dir.clone(),
                status: ServerStatus::Active,
            });
        }
        gateway.active_project_count = gateway.servers.iter().filter(|s| s.status == ServerStatus::Active).count();
        let became_first = gateway.active_project_count == 1 && gateway.pid.is_none();
        drop(gateway);
        self.persist_gateway().await?;
        if became_first {
            self.start_gateway_process().await?;
        }
        Ok(())
    }

    async fn unregister_from_gateway(&self, normalized_project_url: &str) -> Result<()> {
        let mut gateway = self.gateway.lock().await;
        gateway.servers.retain(|s| normalize(&s.project_git_url) != normalized_project_url);
        gateway.active_project_count = gateway.servers.iter().filter(|s| s.status == ServerStatus::Active).count();
        let should_stop = gateway.active_project_count == 0 && gateway.pid.is_some();
        let pid = gateway.pid;
        drop(gateway);
        self.persist_gateway().await?;
        if should_stop {
            if let Some(pid) = pid {
                stop_pid(pid, GRACEFUL_STOP_TIMEOUT).await?;
            }
            self.gateway.lock().await.pid = None;
            self.persist_gateway().await?;
        }
        Ok(())
    }

    async fn start_gateway_process(&self) -> Result<()> {
        let bin = self
            .config
            .opencode_mcp_tool_path
            .clone()
            .unwrap_or_else(|| "opencode-gateway".to_string());
        let (port, token) = {
            let gateway = self.gateway.lock().await;
            (gateway.port, gateway.bearer_token.clone())
        };
        let args = vec!["--port".to_string(), port.to_string(), "--bearer-token".to_string(), token];
        let pid = crate::process_ctl::spawn_detached(&bin, &args, &[], None)?;
        self.gateway.lock().await.pid = Some(pid);
        self.persist_gateway().await?;
        info!(port, "started OpenCode gateway process");
        Ok(())
    }

    pub async fn mcp_status(&self) -> GatewayState {
        let mut gateway = self.gateway.lock().await;
        if let Some(pid) = gateway.pid {
            if !pid_is_alive(pid) {
                gateway.pid = None;
            }
        }
        gateway.clone()
    }

    pub async fn mcp_restart(&self) -> Result<()> {
        let pid = self.gateway.lock().await.pid;
        if let Some(pid) = pid {
            stop_pid(pid, GRACEFUL_STOP_TIMEOUT).await?;
        }
        self.gateway.lock().await.pid = None;
        self.start_gateway_process().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mojo_core::clock::FixedClock;

    fn test_config(dir: &std::path::Path) -> OpenCodeManagerConfig {
        OpenCodeManagerConfig {
            data_dir: dir.to_path_buf(),
            opencode_bin: "true".to_string(),
            opencode_mcp_tool_path: Some("true".to_string()),
            global_mcp_tool_port: 4099,
            global_mcp_bearer_token: "test-token".to_string(),
        }
    }

    #[tokio::test]
    async fn detect_duplicates_is_empty_for_normally_registered_projects() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let manager = OpenCodeManager::load(test_config(dir.path()), clock).await.unwrap();

        {
            let mut state = manager.state.lock().await;
            state.projects.insert(
                "github.com/u/r".to_string(),
                Project {
                    git_url: "git@github.com:u/r.git".to_string(),
                    project_name: "r".to_string(),
                    base_dir: "/tmp/r".to_string(),
                    opencode_port: 4100,
                    pid: None,
                    ssh_key_path: "/tmp/key".to_string(),
                    status: ProjectStatus::Stopped,
                    created_at: Utc::now(),
                    last_seen_at: Utc::now(),
                },
            );
        }

        assert!(manager.detect_duplicates().await.is_empty());
    }

    #[tokio::test]
    async fn stop_unknown_project_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let manager = OpenCodeManager::load(test_config(dir.path()), clock).await.unwrap();
        let result = manager.stop_project("git@github.com:u/r.git").await;
        assert!(matches!(result, Err(OpenCodeError::ProjectNotFound(_))));
    }
}
