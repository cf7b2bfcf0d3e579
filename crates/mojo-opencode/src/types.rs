//! OpenCode entities (spec §3): Project, Session, the global gateway
//! process state, and sandbox/worktree records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Stopped,
    Starting,
    Running,
    Crashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub git_url: String,
    pub project_name: String,
    pub base_dir: String,
    pub opencode_port: u16,
    #[serde(default)]
    pub pid: Option<u32>,
    pub ssh_key_path: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Opaque handle returned by the external OpenCode process. The manager
/// stores the pairing but does not own the session's own schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub project_git_url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub project_git_url: String,
    pub opencode_url: String,
    pub password: String,
    pub ssh_key_path: String,
    pub sandbox_dir: String,
    pub status: ServerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayState {
    pub port: u16,
    pub bearer_token: String,
    pub active_project_count: usize,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub normalized_git_url: String,
    pub git_urls: Vec<String>,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub name: String,
    pub branch: String,
    pub path: String,
    pub is_primary: bool,
}
