//! Task executors (spec §4.5): `dreaming` calls into C5, `scheduled_cmd`
//! invokes a configured executable, `custom` dispatches to a
//! caller-registered callback. `agent` is reserved (see `error.rs`).

use async_trait::async_trait;
use mojo_dreaming::{DreamingPipeline, QualityLevel};

use crate::types::Task;

pub type ExecResult = std::result::Result<serde_json::Value, String>;

/// A caller-supplied callback registered by key, for `type=custom` tasks.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> ExecResult;
}

/// A read-only view onto the conversation store, injected the same way
/// `Clock` is (a small trait object rather than a hard dependency on
/// `mojo-memory`), so `run_dreaming` can auto-gather input per spec §4.5
/// without `mojo-scheduler` owning a `MemoryService`.
#[async_trait]
pub trait ConversationSource: Send + Sync {
    /// Concatenated text of the last `limit` conversation pages (newest
    /// first), newline-joined, for dreaming tasks that don't supply
    /// `config.raw_text` directly. Empty if the store has nothing yet.
    async fn recent_text(&self, limit: usize) -> String;
}

const DEFAULT_AUTO_GATHER_PAGES: usize = 20;

pub async fn run_dreaming(
    pipeline: &DreamingPipeline,
    conversation_source: Option<&dyn ConversationSource>,
    task: &Task,
) -> ExecResult {
    let conversation_id = task
        .config
        .get("conversation_id")
        .and_then(|v| v.as_str())
        .ok_or("missing config.conversation_id")?;

    let configured_text = task.config.get("raw_text").and_then(|v| v.as_str()).map(str::to_string);
    let raw_text = match configured_text {
        Some(text) => text,
        None => {
            let source = conversation_source
                .ok_or("missing config.raw_text and no conversation store configured to auto-gather from")?;
            let limit = task
                .config
                .get("auto_gather_pages")
                .and_then(|v| v.as_u64())
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_AUTO_GATHER_PAGES);
            let gathered = source.recent_text(limit).await;
            if gathered.trim().is_empty() {
                return Err("auto-gather found no conversation history to dream on".to_string());
            }
            gathered
        }
    };

    let quality_level = match task.config.get("quality_level").and_then(|v| v.as_str()) {
        Some("good") => QualityLevel::Good,
        Some("premium") => QualityLevel::Premium,
        _ => QualityLevel::Basic,
    };

    pipeline
        .process_conversation(conversation_id, &raw_text, quality_level)
        .await
        .map(|archive| serde_json::to_value(archive).unwrap_or(serde_json::Value::Null))
        .map_err(|e| e.to_string())
}

pub async fn run_scheduled_cmd(task: &Task) -> ExecResult {
    let command = task
        .config
        .get("command")
        .and_then(|v| v.as_str())
        .ok_or("missing config.command")?;
    let args: Vec<String> = task
        .config
        .get("args")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let output = tokio::process::Command::new(command)
        .args(&args)
        .output()
        .await
        .map_err(|e| format!("failed to spawn '{command}': {e}"))?;

    if output.status.success() {
        Ok(serde_json::json!({ "stdout": String::from_utf8_lossy(&output.stdout) }))
    } else {
        Err(format!(
            "command '{command}' exited with status {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mojo_core::clock::FixedClock;
    use mojo_dreaming::ArchiveStore;
    use mojo_llm::provider::StubProvider;
    use mojo_llm::{LlmRouter, RetryPolicy, TaskRoute};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn pipeline_with(dir: &std::path::Path) -> DreamingPipeline {
        let mut router = LlmRouter::new(RetryPolicy::default());
        router.register_provider(Box::new(StubProvider::always(
            "p",
            r#"{"chunks": [{"text": "hello", "entities": []}]}"#.to_string(),
        )));
        router.register_provider(Box::new(StubProvider::always(
            "p2",
            r#"{"clusters": [{"kind": "SUMMARY", "summary_text": "intro", "entities": []}]}"#.to_string(),
        )));
        router.set_route("dreaming_chunk", TaskRoute { provider: "p".to_string(), model: "m".to_string() });
        router.set_route("dreaming_cluster", TaskRoute { provider: "p2".to_string(), model: "m".to_string() });
        router.set_route("repair_json", TaskRoute { provider: "p".to_string(), model: "m".to_string() });
        let archives = Arc::new(ArchiveStore::new(dir));
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        DreamingPipeline::new(Arc::new(router), archives, clock)
    }

    fn task_with_config(config: HashMap<String, serde_json::Value>) -> Task {
        Task {
            id: "t1".to_string(),
            task_type: crate::types::TaskType::Dreaming,
            priority: crate::types::Priority::Medium,
            status: crate::types::TaskStatus::Pending,
            schedule: crate::types::ScheduleSpec::default(),
            config,
            resources: crate::types::ResourceRequirements::default(),
            retry_policy: crate::types::RetryPolicy::default(),
            attempt_count: 0,
            last_error: None,
            last_run_at: None,
            next_run_at: None,
            result: None,
            created_at: chrono::Utc::now(),
            off_peak_window: None,
        }
    }

    struct StubConversationSource(String);

    #[async_trait]
    impl ConversationSource for StubConversationSource {
        async fn recent_text(&self, _limit: usize) -> String {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn missing_raw_text_and_no_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path());
        let mut config = HashMap::new();
        config.insert("conversation_id".to_string(), serde_json::json!("c1"));
        let task = task_with_config(config);

        let err = run_dreaming(&pipeline, None, &task).await.unwrap_err();
        assert!(err.contains("auto-gather"));
    }

    #[tokio::test]
    async fn missing_raw_text_auto_gathers_from_conversation_source() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path());
        let mut config = HashMap::new();
        config.insert("conversation_id".to_string(), serde_json::json!("c1"));
        let task = task_with_config(config);
        let source = StubConversationSource("gathered from the conversation store".to_string());

        let result = run_dreaming(&pipeline, Some(&source), &task).await.unwrap();
        assert!(result.is_object());
    }

    #[tokio::test]
    async fn empty_auto_gather_is_an_error_not_a_silent_noop() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path());
        let mut config = HashMap::new();
        config.insert("conversation_id".to_string(), serde_json::json!("c1"));
        let task = task_with_config(config);
        let source = StubConversationSource(String::new());

        let err = run_dreaming(&pipeline, Some(&source), &task).await.unwrap_err();
        assert!(err.contains("no conversation history"));
    }

    #[tokio::test]
    async fn explicit_raw_text_takes_priority_over_auto_gather() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path());
        let mut config = HashMap::new();
        config.insert("conversation_id".to_string(), serde_json::json!("c1"));
        config.insert("raw_text".to_string(), serde_json::json!("explicit text wins"));
        let task = task_with_config(config);
        let source = StubConversationSource(String::new());

        let result = run_dreaming(&pipeline, Some(&source), &task).await.unwrap();
        assert!(result.is_object());
    }
}
