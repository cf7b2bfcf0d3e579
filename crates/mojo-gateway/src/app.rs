//! Composition root (C9 extension, spec §0.5): one `AppState`, built once
//! in `main`, handed by `Arc` clone to every MCP tool dispatch / Axum
//! handler — mirrors the teacher's own `AppState` in
//! `skynet-gateway/src/app.rs` (one struct, one `new`, a small trait impl
//! surface) generalised from the channel/session/terminal subsystems to
//! the memory/dreaming/scheduler/opencode ones this crate actually wires.

use std::collections::HashMap;
use std::sync::Arc;

use mojo_core::clock::{Clock, SystemClock};
use mojo_core::config::AppConfig;
use mojo_dreaming::{ArchiveStore, DreamingPipeline};
use mojo_embedding::{EmbeddingService, LocalBackend};
use mojo_llm::{LlmRouter, RetryPolicy, StubProvider};
use mojo_memory::MemoryService;
use mojo_opencode::{OpenCodeManager, OpenCodeManagerConfig};
use mojo_scheduler::{ConversationSource, SchedulerConfig, SchedulerEngine};
use tracing::info;

/// Adapts `MemoryService::list_recent_conversations` to the scheduler's
/// `ConversationSource` trait, so the nightly dreaming task can auto-gather
/// input per spec §4.5 without `mojo-scheduler` depending on `mojo-memory`.
struct MemoryConversationSource(Arc<MemoryService>);

#[async_trait::async_trait]
impl ConversationSource for MemoryConversationSource {
    async fn recent_text(&self, limit: usize) -> String {
        self.0
            .list_recent_conversations(limit)
            .await
            .iter()
            .map(|page| page.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub embeddings: Arc<EmbeddingService>,
    pub llm: Arc<LlmRouter>,
    pub memory: Arc<MemoryService>,
    pub dreaming: Arc<DreamingPipeline>,
    pub scheduler: Arc<SchedulerEngine>,
    pub opencode: Arc<OpenCodeManager>,
}

impl AppState {
    /// Build the whole subsystem graph from one loaded config. Falls back
    /// to `StubProvider`/`LocalBackend` when no real provider credentials
    /// are configured, so the gateway still starts in a bare environment
    /// rather than failing at boot — a genuine `ConfigError` is reserved
    /// for config that's actually malformed, not merely absent.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let data_dir = std::path::PathBuf::from(&config.memory.data_directory);
        std::fs::create_dir_all(&data_dir)?;

        let mut embeddings = EmbeddingService::new(256);
        embeddings.register(Box::new(LocalBackend::new(config.memory.embedding_model.clone(), 384)));
        let embeddings = Arc::new(embeddings);

        let mut llm = LlmRouter::new(RetryPolicy::default());
        llm.register_provider(Box::new(StubProvider::new("stub", vec![])));
        for (tag, route) in &config.llm_providers.task_routes {
            llm.set_route(
                tag.clone(),
                mojo_llm::TaskRoute { provider: route.provider.clone(), model: route.model.clone() },
            );
        }
        let llm = Arc::new(llm);

        let memory_config = mojo_memory::MemoryConfig {
            data_dir: data_dir.clone(),
            working_max_tokens: config.memory.working_max_tokens,
            active_max_pages: config.memory.active_max_pages,
            chunk_size_chars: 1200,
            chunk_overlap_chars: 200,
            enabled_models: vec![config.memory.embedding_model.clone()],
            model_weights: HashMap::new(),
            score_floor: 0.15,
            multi_model_enabled: config.memory.multi_model_enabled,
            default_model: config.memory.embedding_model.clone(),
        };
        let memory = Arc::new(MemoryService::new(memory_config, embeddings.clone(), clock.clone()));
        memory.load().await?;

        let archives = Arc::new(ArchiveStore::new(data_dir.clone()));
        let dreaming = Arc::new(DreamingPipeline::new(llm.clone(), archives, clock.clone()));

        let scheduler_config = SchedulerConfig {
            data_dir: data_dir.clone(),
            dreaming_enabled: config.dreaming.dreaming_enabled,
            ..SchedulerConfig::default()
        };
        let scheduler = SchedulerEngine::new(scheduler_config, clock.clone(), Some(dreaming.clone()))
            .with_conversation_source(Arc::new(MemoryConversationSource(memory.clone())));
        scheduler.bootstrap().await?;
        let scheduler = Arc::new(scheduler);

        let opencode_config = OpenCodeManagerConfig {
            data_dir: data_dir.clone(),
            opencode_bin: config.opencode.opencode_bin.clone(),
            opencode_mcp_tool_path: config.opencode.opencode_mcp_tool_path.clone(),
            global_mcp_tool_port: config.opencode.global_mcp_tool_port,
            global_mcp_bearer_token: config
                .opencode
                .global_mcp_bearer_token
                .clone()
                .unwrap_or_else(|| mojo_core::ids::new_random_id()),
        };
        let opencode = Arc::new(OpenCodeManager::load(opencode_config, clock.clone()).await?);

        Ok(Self { config, embeddings, llm, memory, dreaming, scheduler, opencode })
    }

    /// Spawn the scheduler's tick loop. Idempotent in the sense that
    /// calling it again after `stop()` starts a fresh loop (the previous
    /// one has already exited); calling it while one is already running
    /// just adds a second consumer of the same `Arc<SchedulerEngine>`,
    /// which is harmless but redundant, so callers (`scheduler_start_daemon`)
    /// check `is_running()` first.
    pub fn start_scheduler_daemon(self: &Arc<Self>) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(scheduler.run());
    }

    /// Run each subsystem's own stop/save in dependency order on clean
    /// shutdown (`--mode stdio` EOF, or SIGINT/SIGTERM in `--mode http`).
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        info!("shutting down");
        self.scheduler.stop();
        for project in self.opencode.list_projects().await {
            if let Err(e) = self.opencode.stop_project(&project.git_url).await {
                tracing::warn!(git_url = %project.git_url, err = %e, "failed to stop project during shutdown");
            }
        }
        self.memory.save().await?;
        Ok(())
    }
}
