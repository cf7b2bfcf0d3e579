//! Tool definitions + dispatch for the full MCP surface (spec §6):
//! memory, dreaming, scheduler, opencode, and system groups. Structured
//! the same way as the teacher's `mcp_bridge.rs::{tool_definitions,
//! execute_tool}` pair — one function returning the JSON schema list, one
//! big `match` dispatching by name — generalised from the teacher's
//! knowledge/memory-only surface to every subsystem this crate wires.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::{GatewayError, Result};

fn bad_args(tool: &str, reason: impl Into<String>) -> GatewayError {
    GatewayError::BadArguments { tool: tool.to_string(), reason: reason.into() }
}

fn require_str<'a>(args: &'a Value, tool: &str, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| bad_args(tool, format!("missing required string parameter '{key}'")))
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn opt_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

fn opt_usize(args: &Value, key: &str, default: usize) -> usize {
    args.get(key).and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(default)
}

fn require_usize(args: &Value, tool: &str, key: &str) -> Result<usize> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .ok_or_else(|| bad_args(tool, format!("missing required integer parameter '{key}'")))
}

fn require_value<'a>(args: &'a Value, tool: &str, key: &str) -> Result<&'a Value> {
    args.get(key).ok_or_else(|| bad_args(tool, format!("missing required parameter '{key}'")))
}

/// Return MCP tool definitions for every tool spec §6 names.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({"name": "get_memory_context", "description": "Retrieve ranked context hits (archival conversation pages + knowledge chunks) for a query.",
            "inputSchema": {"type": "object", "properties": {
                "query": {"type": "string"}, "max_items": {"type": "integer", "default": 5}
            }, "required": ["query"]}}),
        json!({"name": "add_conversation", "description": "Append a user/assistant turn to the Working tier.",
            "inputSchema": {"type": "object", "properties": {
                "user": {"type": "string"}, "assistant": {"type": "string"},
                "metadata": {"type": "object"}
            }, "required": ["user", "assistant"]}}),
        json!({"name": "add_documents", "description": "Add one or more knowledge-base documents.",
            "inputSchema": {"type": "object", "properties": {
                "docs": {"type": "array", "items": {"type": "object", "properties": {
                    "content": {"type": "string"}, "source": {"type": "string"}, "metadata": {"type": "object"}
                }, "required": ["content", "source"]}}
            }, "required": ["docs"]}}),
        json!({"name": "end_conversation", "description": "Seal the Working tier into a Conversation Page.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "get_memory_stats", "description": "Return tier/document counts.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "list_recent_conversations", "description": "List the n most recent Conversation Pages.",
            "inputSchema": {"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]}}),
        json!({"name": "remove_conversation_message", "description": "Remove one message from a Conversation Page by index.",
            "inputSchema": {"type": "object", "properties": {
                "page_id": {"type": "string"}, "index": {"type": "integer"}
            }, "required": ["page_id", "index"]}}),
        json!({"name": "remove_recent_conversations", "description": "Remove the n most recent Conversation Pages.",
            "inputSchema": {"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]}}),
        json!({"name": "list_recent_documents", "description": "List the n most recently added knowledge documents.",
            "inputSchema": {"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]}}),
        json!({"name": "remove_document", "description": "Remove a knowledge document by id.",
            "inputSchema": {"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}}),
        json!({"name": "toggle_multi_model", "description": "Enable/disable multi-model embedding+ranking for this process.",
            "inputSchema": {"type": "object", "properties": {"enabled": {"type": "boolean"}}, "required": ["enabled"]}}),
        json!({"name": "web_search", "description": "Search the web via the configured search engine.",
            "inputSchema": {"type": "object", "properties": {
                "query": {"type": "string"}, "max_results": {"type": "integer", "default": 5}
            }, "required": ["query"]}}),
        json!({"name": "dreaming_process", "description": "Run the dreaming pipeline (A->B->C->D) over raw conversation text.",
            "inputSchema": {"type": "object", "properties": {
                "conversation_id": {"type": "string"}, "conversation_text": {"type": "string"},
                "quality_level": {"type": "string", "enum": ["basic", "good", "premium"], "default": "basic"}
            }, "required": ["conversation_id", "conversation_text"]}}),
        json!({"name": "dreaming_get_archive", "description": "Fetch a conversation's archive (latest version unless given).",
            "inputSchema": {"type": "object", "properties": {
                "conversation_id": {"type": "string"}, "version": {"type": "integer"}
            }, "required": ["conversation_id"]}}),
        json!({"name": "dreaming_list_archives", "description": "List archive version summaries for a conversation.",
            "inputSchema": {"type": "object", "properties": {"conversation_id": {"type": "string"}}, "required": ["conversation_id"]}}),
        json!({"name": "dreaming_upgrade_quality", "description": "Re-run the pipeline at a higher quality level, producing a new version.",
            "inputSchema": {"type": "object", "properties": {
                "conversation_id": {"type": "string"},
                "new_quality": {"type": "string", "enum": ["basic", "good", "premium"]}
            }, "required": ["conversation_id", "new_quality"]}}),
        json!({"name": "scheduler_add_task", "description": "Register a new scheduled task.",
            "inputSchema": {"type": "object", "properties": {
                "type": {"type": "string", "enum": ["dreaming", "scheduled_cmd", "agent", "custom"]},
                "priority": {"type": "string", "enum": ["low", "medium", "high", "critical"]},
                "schedule": {"type": "object"}, "config": {"type": "object"},
                "resources": {"type": "object"}, "retry_policy": {"type": "object"},
                "off_peak_window": {"type": "object"}
            }, "required": ["type", "schedule"]}}),
        json!({"name": "scheduler_list_tasks", "description": "List tasks, optionally filtered by status/type.",
            "inputSchema": {"type": "object", "properties": {
                "status": {"type": "string"}, "type": {"type": "string"}
            }}}),
        json!({"name": "scheduler_get_task", "description": "Fetch one task by id.",
            "inputSchema": {"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}}),
        json!({"name": "scheduler_get_status", "description": "Summary counts of tasks by state.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "scheduler_remove_task", "description": "Remove a task by id.",
            "inputSchema": {"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}}),
        json!({"name": "scheduler_daemon_status", "description": "Whether the scheduler's background tick loop is running.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "scheduler_start_daemon", "description": "Start the scheduler's background tick loop.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "scheduler_stop_daemon", "description": "Stop the scheduler's background tick loop.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "scheduler_restart_daemon", "description": "Restart the scheduler's background tick loop.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "opencode_project_start", "description": "Start (or resume) an OpenCode project by git URL.",
            "inputSchema": {"type": "object", "properties": {
                "git_url": {"type": "string"}, "base_dir": {"type": "string"}
            }, "required": ["git_url"]}}),
        json!({"name": "opencode_project_stop", "description": "Stop a running OpenCode project.",
            "inputSchema": {"type": "object", "properties": {"git_url": {"type": "string"}}, "required": ["git_url"]}}),
        json!({"name": "opencode_project_status", "description": "Health-checked status of an OpenCode project.",
            "inputSchema": {"type": "object", "properties": {"git_url": {"type": "string"}}, "required": ["git_url"]}}),
        json!({"name": "opencode_project_list", "description": "List all registered OpenCode projects.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "opencode_get_deploy_key", "description": "Return the public half of a project's SSH deploy key.",
            "inputSchema": {"type": "object", "properties": {"git_url": {"type": "string"}}, "required": ["git_url"]}}),
        json!({"name": "opencode_detect_duplicates", "description": "Sweep the project registry for git URLs that normalise to the same key.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "opencode_sandbox_create", "description": "Create a named git worktree sandbox for a project.",
            "inputSchema": {"type": "object", "properties": {
                "git_url": {"type": "string"}, "name": {"type": "string"}, "branch": {"type": "string"}
            }, "required": ["git_url", "name", "branch"]}}),
        json!({"name": "opencode_sandbox_list", "description": "List a project's sandboxes (git worktrees).",
            "inputSchema": {"type": "object", "properties": {"git_url": {"type": "string"}}, "required": ["git_url"]}}),
        json!({"name": "opencode_sandbox_delete", "description": "Delete a named sandbox.",
            "inputSchema": {"type": "object", "properties": {
                "git_url": {"type": "string"}, "name": {"type": "string"}
            }, "required": ["git_url", "name"]}}),
        json!({"name": "opencode_mcp_status", "description": "Status of the shared gateway process fronting all OpenCode projects.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "opencode_mcp_restart", "description": "Restart the shared OpenCode-fronting gateway process.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "system_info", "description": "Process/version/config summary.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "system_health", "description": "Liveness of each wired subsystem.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "get_current_day", "description": "Current date (server clock), ISO 8601.",
            "inputSchema": {"type": "object", "properties": {}}}),
        json!({"name": "get_current_time", "description": "Current time (server clock), ISO 8601.",
            "inputSchema": {"type": "object", "properties": {}}}),
    ]
}

/// Execute a tool by name, returning its JSON result or a typed error the
/// caller renders into an envelope. Takes `Arc<AppState>` (rather than a
/// plain reference) because the scheduler daemon start/restart tools need
/// to spawn a task holding its own `Arc` clone of the engine.
pub async fn execute_tool(state: &Arc<AppState>, name: &str, args: &Value) -> Result<Value> {
    match name {
        "get_memory_context" => {
            let query = require_str(args, name, "query")?;
            let max_items = opt_usize(args, "max_items", 5);
            let result = state.memory.get_context(query, max_items, None).await?;
            Ok(serde_json::to_value(result).unwrap())
        }
        "add_conversation" => {
            let user = require_str(args, name, "user")?;
            let assistant = require_str(args, name, "assistant")?;
            let metadata = parse_metadata(args.get("metadata"));
            state.memory.add_conversation(user, assistant, metadata).await?;
            Ok(json!({ "ok": true }))
        }
        "add_documents" => {
            let docs_value = require_value(args, name, "docs")?;
            let docs = parse_new_documents(name, docs_value)?;
            let ids = state.memory.add_documents(docs).await?;
            Ok(json!({ "ids": ids }))
        }
        "end_conversation" => {
            let page = state.memory.end_conversation().await?;
            Ok(serde_json::to_value(page).unwrap())
        }
        "get_memory_stats" => Ok(serde_json::to_value(state.memory.get_stats().await).unwrap()),
        "list_recent_conversations" => {
            let n = require_usize(args, name, "n")?;
            Ok(serde_json::to_value(state.memory.list_recent_conversations(n).await).unwrap())
        }
        "remove_conversation_message" => {
            let page_id = require_str(args, name, "page_id")?;
            let index = require_usize(args, name, "index")?;
            state.memory.remove_conversation_message(page_id, index).await?;
            Ok(json!({ "ok": true }))
        }
        "remove_recent_conversations" => {
            let n = require_usize(args, name, "n")?;
            let removed = state.memory.remove_recent_conversations(n).await?;
            Ok(json!({ "removed": removed }))
        }
        "list_recent_documents" => {
            let n = require_usize(args, name, "n")?;
            Ok(serde_json::to_value(state.memory.list_recent_documents(n).await).unwrap())
        }
        "remove_document" => {
            let id = require_str(args, name, "id")?;
            state.memory.remove_document(id).await?;
            Ok(json!({ "ok": true }))
        }
        "toggle_multi_model" => {
            let enabled = args
                .get("enabled")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| bad_args(name, "missing required boolean parameter 'enabled'"))?;
            state.memory.set_multi_model_enabled(enabled).await;
            Ok(json!({ "multi_model_enabled": enabled }))
        }
        "web_search" => {
            let query = require_str(args, name, "query")?;
            let max_results = opt_u64(args, "max_results").unwrap_or(5) as usize;
            crate::search::web_search(&state.config, query, max_results).await
        }

        "dreaming_process" => {
            let conversation_id = require_str(args, name, "conversation_id")?;
            let text = require_str(args, name, "conversation_text")?;
            let quality = parse_quality_level(args.get("quality_level"))?;
            let archive = state.dreaming.process_conversation(conversation_id, text, quality).await?;
            Ok(serde_json::to_value(archive).unwrap())
        }
        "dreaming_get_archive" => {
            let conversation_id = require_str(args, name, "conversation_id")?;
            let version = opt_u64(args, "version").map(|v| v as u32);
            let archive = state.dreaming.get_archive(conversation_id, version)?;
            Ok(serde_json::to_value(archive).unwrap())
        }
        "dreaming_list_archives" => {
            let conversation_id = require_str(args, name, "conversation_id")?;
            Ok(serde_json::to_value(state.dreaming.list_archives(conversation_id)?).unwrap())
        }
        "dreaming_upgrade_quality" => {
            let conversation_id = require_str(args, name, "conversation_id")?;
            let new_quality = parse_quality_level(args.get("new_quality"))?;
            let archive = state.dreaming.upgrade_quality(conversation_id, new_quality).await?;
            Ok(serde_json::to_value(archive).unwrap())
        }

        "scheduler_add_task" => {
            let input = parse_new_task_input(name, args)?;
            Ok(serde_json::to_value(state.scheduler.add_task(input).await?).unwrap())
        }
        "scheduler_list_tasks" => {
            let filter = parse_task_filter(args)?;
            Ok(serde_json::to_value(state.scheduler.list_tasks(&filter).await).unwrap())
        }
        "scheduler_get_task" => {
            let id = require_str(args, name, "id")?;
            Ok(serde_json::to_value(state.scheduler.get_task(id).await?).unwrap())
        }
        "scheduler_get_status" => Ok(serde_json::to_value(state.scheduler.get_status().await).unwrap()),
        "scheduler_remove_task" => {
            let id = require_str(args, name, "id")?;
            state.scheduler.remove_task(id).await?;
            Ok(json!({ "ok": true }))
        }
        "scheduler_daemon_status" => Ok(json!({ "running": state.scheduler.is_running() })),
        "scheduler_start_daemon" => {
            if !state.scheduler.is_running() {
                state.start_scheduler_daemon();
            }
            Ok(json!({ "running": true }))
        }
        "scheduler_stop_daemon" => {
            state.scheduler.stop();
            Ok(json!({ "running": false }))
        }
        "scheduler_restart_daemon" => {
            state.scheduler.stop();
            state.start_scheduler_daemon();
            Ok(json!({ "running": true }))
        }

        "opencode_project_start" => {
            let git_url = require_str(args, name, "git_url")?;
            let base_dir = opt_str(args, "base_dir").map(|s| s.to_string());
            Ok(serde_json::to_value(state.opencode.start_project(git_url, base_dir).await?).unwrap())
        }
        "opencode_project_stop" => {
            let git_url = require_str(args, name, "git_url")?;
            state.opencode.stop_project(git_url).await?;
            Ok(json!({ "ok": true }))
        }
        "opencode_project_status" => {
            let git_url = require_str(args, name, "git_url")?;
            Ok(serde_json::to_value(state.opencode.project_status(git_url).await?).unwrap())
        }
        "opencode_project_list" => Ok(serde_json::to_value(state.opencode.list_projects().await).unwrap()),
        "opencode_get_deploy_key" => {
            let git_url = require_str(args, name, "git_url")?;
            Ok(json!({ "public_key": state.opencode.get_deploy_key(git_url).await? }))
        }
        "opencode_detect_duplicates" => Ok(serde_json::to_value(state.opencode.detect_duplicates().await).unwrap()),
        "opencode_sandbox_create" => {
            let git_url = require_str(args, name, "git_url")?;
            let sandbox_name = require_str(args, name, "name")?;
            let branch = require_str(args, name, "branch")?;
            Ok(serde_json::to_value(state.opencode.sandbox_create(git_url, sandbox_name, branch).await?).unwrap())
        }
        "opencode_sandbox_list" => {
            let git_url = require_str(args, name, "git_url")?;
            Ok(serde_json::to_value(state.opencode.sandbox_list(git_url).await?).unwrap())
        }
        "opencode_sandbox_delete" => {
            let git_url = require_str(args, name, "git_url")?;
            let sandbox_name = require_str(args, name, "name")?;
            state.opencode.sandbox_delete(git_url, sandbox_name).await?;
            Ok(json!({ "ok": true }))
        }
        "opencode_mcp_status" => Ok(serde_json::to_value(state.opencode.mcp_status().await).unwrap()),
        "opencode_mcp_restart" => {
            state.opencode.mcp_restart().await?;
            Ok(json!({ "ok": true }))
        }

        "system_info" => Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "environment": state.config.server.environment,
            "data_directory": state.config.memory.data_directory,
        })),
        "system_health" => Ok(json!({
            "memory": "ok",
            "scheduler_daemon_running": state.scheduler.is_running(),
            "opencode_gateway_pid": state.opencode.mcp_status().await.pid,
        })),
        "get_current_day" => Ok(json!({ "date": chrono::Utc::now().date_naive().to_string() })),
        "get_current_time" => Ok(json!({ "time": chrono::Utc::now().to_rfc3339() })),

        other => Err(GatewayError::UnknownTool(other.to_string())),
    }
}

fn parse_metadata(value: Option<&Value>) -> HashMap<String, Value> {
    match value {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => HashMap::new(),
    }
}

fn parse_new_documents(tool: &str, value: &Value) -> Result<Vec<mojo_memory::NewDocument>> {
    let array = value.as_array().ok_or_else(|| bad_args(tool, "'docs' must be an array"))?;
    array
        .iter()
        .map(|doc| {
            let content = doc
                .get("content")
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad_args(tool, "each doc needs a string 'content'"))?
                .to_string();
            let source = doc
                .get("source")
                .and_then(|v| v.as_str())
                .ok_or_else(|| bad_args(tool, "each doc needs a string 'source'"))?
                .to_string();
            let metadata = parse_metadata(doc.get("metadata"));
            Ok(mojo_memory::NewDocument { content, source, metadata })
        })
        .collect()
}

fn parse_quality_level(value: Option<&Value>) -> Result<mojo_dreaming::QualityLevel> {
    let value = value.cloned().unwrap_or_else(|| json!("basic"));
    serde_json::from_value(value).map_err(|e| bad_args("dreaming", format!("invalid quality_level: {e}")))
}

fn parse_new_task_input(tool: &str, args: &Value) -> Result<mojo_scheduler::engine::NewTaskInput> {
    let task_type: mojo_scheduler::TaskType = serde_json::from_value(
        args.get("type").cloned().ok_or_else(|| bad_args(tool, "missing required parameter 'type'"))?,
    )
    .map_err(|e| bad_args(tool, format!("invalid 'type': {e}")))?;

    // `Priority`'s own (de)serialisation is UPPERCASE (it round-trips through
    // the scheduler's on-disk JSON queue), but the tool schema advertises
    // lowercase values to match every other enum-valued parameter here.
    let priority: mojo_scheduler::Priority = match args.get("priority").and_then(|v| v.as_str()) {
        Some(s) => serde_json::from_value(json!(s.to_uppercase()))
            .map_err(|e| bad_args(tool, format!("invalid 'priority': {e}")))?,
        None => mojo_scheduler::Priority::Medium,
    };

    let schedule: mojo_scheduler::ScheduleSpec = serde_json::from_value(
        args.get("schedule").cloned().ok_or_else(|| bad_args(tool, "missing required parameter 'schedule'"))?,
    )
    .map_err(|e| bad_args(tool, format!("invalid 'schedule': {e}")))?;

    let config: HashMap<String, Value> = match args.get("config") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => HashMap::new(),
    };

    let resources: mojo_scheduler::ResourceRequirements = match args.get("resources") {
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| bad_args(tool, format!("invalid 'resources': {e}")))?,
        None => Default::default(),
    };

    let retry_policy: Option<mojo_scheduler::RetryPolicy> = match args.get("retry_policy") {
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| bad_args(tool, format!("invalid 'retry_policy': {e}")))?),
        None => None,
    };

    let off_peak_window: Option<mojo_scheduler::OffPeakWindow> = match args.get("off_peak_window") {
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| bad_args(tool, format!("invalid 'off_peak_window': {e}")))?),
        None => None,
    };

    Ok(mojo_scheduler::engine::NewTaskInput { task_type, priority, schedule, config, resources, retry_policy, off_peak_window })
}

fn parse_task_filter(args: &Value) -> Result<mojo_scheduler::TaskFilter> {
    let status = match args.get("status") {
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| bad_args("scheduler_list_tasks", format!("invalid 'status': {e}")))?),
        None => None,
    };
    let task_type = match args.get("type") {
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| bad_args("scheduler_list_tasks", format!("invalid 'type': {e}")))?),
        None => None,
    };
    Ok(mojo_scheduler::TaskFilter { status, task_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use mojo_core::config::AppConfig;

    /// Build an `AppState` rooted at a fresh temp dir, entirely offline:
    /// `LocalBackend`/`StubProvider` never touch the network, and
    /// `OpenCodeManager::load`/`SchedulerEngine::bootstrap` only read
    /// (absent) persisted JSON, so this never spawns a real process.
    async fn test_state(configure: impl FnOnce(&mut AppConfig)) -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.memory.data_directory = dir.path().to_string_lossy().to_string();
        configure(&mut config);
        let state = AppState::build(config).await.unwrap();
        (dir, Arc::new(state))
    }

    #[tokio::test]
    async fn add_then_search_finds_matching_document() {
        let (_dir, state) = test_state(|_| {}).await;
        let add = execute_tool(
            &state,
            "add_documents",
            &json!({ "docs": [{ "content": "the quick brown fox", "source": "geo.txt" }] }),
        )
        .await
        .unwrap();
        assert_eq!(add["ids"].as_array().unwrap().len(), 1);

        let found = execute_tool(&state, "get_memory_context", &json!({ "query": "the quick brown fox", "max_items": 1 }))
            .await
            .unwrap();
        let hits = found["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["text"], "the quick brown fox");
        assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn conversation_overflow_promotes_to_active() {
        let (_dir, state) = test_state(|c| c.memory.working_max_tokens = 4).await;
        execute_tool(&state, "add_conversation", &json!({ "user": "hello there friend", "assistant": "hi yourself friend today" }))
            .await
            .unwrap();
        let stats = execute_tool(&state, "get_memory_stats", &json!({})).await.unwrap();
        assert_eq!(stats["working_messages"], 0);
        assert_eq!(stats["active_pages"], 1);
    }

    #[tokio::test]
    async fn toggle_multi_model_round_trips() {
        let (_dir, state) = test_state(|_| {}).await;
        let off = execute_tool(&state, "toggle_multi_model", &json!({ "enabled": false })).await.unwrap();
        assert_eq!(off["multi_model_enabled"], false);
        let on = execute_tool(&state, "toggle_multi_model", &json!({ "enabled": true })).await.unwrap();
        assert_eq!(on["multi_model_enabled"], true);
    }

    #[tokio::test]
    async fn unknown_tool_is_validation_error() {
        let (_dir, state) = test_state(|_| {}).await;
        let err = execute_tool(&state, "not_a_real_tool", &json!({})).await.unwrap_err();
        assert_eq!(err.code(), "ValidationError");
    }

    #[tokio::test]
    async fn add_conversation_missing_field_is_bad_arguments() {
        let (_dir, state) = test_state(|_| {}).await;
        let err = execute_tool(&state, "add_conversation", &json!({ "user": "hi" })).await.unwrap_err();
        assert_eq!(err.code(), "ValidationError");
    }

    #[tokio::test]
    async fn web_search_without_config_is_bad_arguments() {
        let (_dir, state) = test_state(|_| {}).await;
        let err = execute_tool(&state, "web_search", &json!({ "query": "rust async traits" })).await.unwrap_err();
        assert_eq!(err.code(), "ValidationError");
    }

    #[tokio::test]
    async fn dreaming_get_archive_missing_conversation_is_not_found() {
        let (_dir, state) = test_state(|_| {}).await;
        let err = execute_tool(&state, "dreaming_get_archive", &json!({ "conversation_id": "nope" })).await.unwrap_err();
        assert_eq!(err.code(), "NotFoundError");
    }

    #[tokio::test]
    async fn scheduler_add_list_get_status_remove_round_trip() {
        let (_dir, state) = test_state(|_| {}).await;
        let task = execute_tool(
            &state,
            "scheduler_add_task",
            &json!({ "type": "custom", "priority": "high", "schedule": { "immediate": true } }),
        )
        .await
        .unwrap();
        let id = task["id"].as_str().unwrap().to_string();

        let listed = execute_tool(&state, "scheduler_list_tasks", &json!({})).await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let status = execute_tool(&state, "scheduler_get_status", &json!({})).await.unwrap();
        assert_eq!(status["pending_count"], 1);

        execute_tool(&state, "scheduler_remove_task", &json!({ "id": id })).await.unwrap();
        let listed = execute_tool(&state, "scheduler_list_tasks", &json!({})).await.unwrap();
        assert!(listed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduler_daemon_start_stop_is_idempotent() {
        let (_dir, state) = test_state(|_| {}).await;
        assert_eq!(execute_tool(&state, "scheduler_daemon_status", &json!({})).await.unwrap()["running"], false);
        execute_tool(&state, "scheduler_start_daemon", &json!({})).await.unwrap();
        execute_tool(&state, "scheduler_start_daemon", &json!({})).await.unwrap();
        assert_eq!(execute_tool(&state, "scheduler_daemon_status", &json!({})).await.unwrap()["running"], true);
        execute_tool(&state, "scheduler_stop_daemon", &json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn opencode_registry_starts_empty() {
        let (_dir, state) = test_state(|_| {}).await;
        let projects = execute_tool(&state, "opencode_project_list", &json!({})).await.unwrap();
        assert!(projects.as_array().unwrap().is_empty());
        let dupes = execute_tool(&state, "opencode_detect_duplicates", &json!({})).await.unwrap();
        assert!(dupes.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn system_info_reports_version_and_environment() {
        let (_dir, state) = test_state(|_| {}).await;
        let info = execute_tool(&state, "system_info", &json!({})).await.unwrap();
        assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(info["environment"], "production");
    }
}
