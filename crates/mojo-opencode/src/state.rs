//! `opencode-state.json` / `opencode-mcp-tool-servers.json` persistence
//! (spec §4.6), reusing `mojo_core::atomic_write` like every other
//! persistence layer in this repo. The project-state file auto-migrates a
//! legacy bare-array format (no `normalize`d-key map) on load.

use std::collections::HashMap;
use std::path::Path;

use mojo_core::atomic_write::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{OpenCodeError, Result};
use crate::giturl::normalize;
use crate::types::{GatewayState, Project};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeStateFile {
    #[serde(default)]
    pub projects: HashMap<String, Project>,
}

fn state_err(path: &Path) -> impl Fn(mojo_core::error::CoreError) -> OpenCodeError + '_ {
    move |e| OpenCodeError::State { path: path.display().to_string(), reason: e.to_string() }
}

/// Load project state, migrating a legacy bare-array file (one written
/// before projects were keyed by normalised git URL) transparently.
pub fn load_opencode_state(path: &Path) -> Result<OpenCodeStateFile> {
    let raw: Option<serde_json::Value> = read_json(path).map_err(state_err(path))?;
    let Some(value) = raw else {
        return Ok(OpenCodeStateFile::default());
    };

    if value.is_array() {
        let legacy: Vec<Project> = serde_json::from_value(value)
            .map_err(|e| OpenCodeError::State { path: path.display().to_string(), reason: e.to_string() })?;
        info!(count = legacy.len(), "migrating legacy opencode-state.json array format");
        let projects = legacy.into_iter().map(|p| (normalize(&p.git_url), p)).collect();
        return Ok(OpenCodeStateFile { projects });
    }

    serde_json::from_value(value)
        .map_err(|e| OpenCodeError::State { path: path.display().to_string(), reason: e.to_string() })
}

pub fn save_opencode_state(path: &Path, state: &OpenCodeStateFile) -> Result<()> {
    write_json_atomic(path, state).map_err(state_err(path))
}

pub fn load_gateway_state(path: &Path, default_port: u16, default_token: impl Into<String>) -> Result<GatewayState> {
    let raw: Option<GatewayState> = read_json(path).map_err(state_err(path))?;
    Ok(raw.unwrap_or(GatewayState {
        port: default_port,
        bearer_token: default_token.into(),
        active_project_count: 0,
        pid: None,
        servers: Vec::new(),
    }))
}

pub fn save_gateway_state(path: &Path, state: &GatewayState) -> Result<()> {
    write_json_atomic(path, state).map_err(state_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProjectStatus;
    use chrono::Utc;

    fn sample_project(git_url: &str) -> Project {
        Project {
            git_url: git_url.to_string(),
            project_name: "repo".to_string(),
            base_dir: "/tmp/repo".to_string(),
            opencode_port: 4100,
            pid: None,
            ssh_key_path: "/tmp/key".to_string(),
            status: ProjectStatus::Stopped,
            created_at: Utc::now(),
            last_seen_at: Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_opencode_state(&dir.path().join("opencode-state.json")).unwrap();
        assert!(state.projects.is_empty());
    }

    #[test]
    fn legacy_array_format_migrates_to_a_normalized_key_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opencode-state.json");
        let legacy = vec![sample_project("https://github.com/user/repo.git")];
        write_json_atomic(&path, &legacy).unwrap();

        let state = load_opencode_state(&path).unwrap();
        assert_eq!(state.projects.len(), 1);
        assert!(state.projects.contains_key("github.com/user/repo"));
    }

    #[test]
    fn round_trips_current_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opencode-state.json");
        let mut projects = HashMap::new();
        projects.insert("github.com/user/repo".to_string(), sample_project("https://github.com/user/repo.git"));
        let state = OpenCodeStateFile { projects };
        save_opencode_state(&path, &state).unwrap();

        let loaded = load_opencode_state(&path).unwrap();
        assert_eq!(loaded.projects.len(), 1);
    }
}
