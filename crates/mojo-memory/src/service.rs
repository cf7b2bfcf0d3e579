//! Memory Service (C4): the single entry point over the four tiers.
//! Grounded on the teacher's `MemoryManager` (`skynet-memory/src/manager.rs`)
//! — one struct, one guarded state, a small public surface — adapted from a
//! `Mutex<Connection>` to a `tokio::sync::Mutex<MemoryState>` since every
//! write here goes through at least one `.await`ed embedding call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mojo_core::clock::Clock;
use mojo_core::ids::new_sortable_id;
use tokio::sync::Mutex;

use mojo_embedding::EmbeddingService;

use crate::chunking::chunk_text;
use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::ranking::{score, sort_by_score_then_recency_then_id, Scorable};
use crate::state::{ConversationsFile, KnowledgeFile, MemoryState};
use crate::tokenizer::count_tokens;
use crate::types::{
    derive_digest, Chunk, ContextHit, ContextHitKind, ContextResult, ConversationPage,
    KnowledgeDocument, MemoryStats, Message, Role,
};

pub struct NewDocument {
    pub content: String,
    pub source: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContextFilters {
    pub kind: Option<ContextHitKind>,
}

pub struct MemoryService {
    state: Mutex<MemoryState>,
    config: MemoryConfig,
    embeddings: Arc<EmbeddingService>,
    clock: Arc<dyn Clock>,
    multi_model_enabled: AtomicBool,
}

impl MemoryService {
    pub fn new(config: MemoryConfig, embeddings: Arc<EmbeddingService>, clock: Arc<dyn Clock>) -> Self {
        let multi_model_enabled = AtomicBool::new(config.multi_model_enabled);
        Self {
            state: Mutex::new(MemoryState::default()),
            config,
            embeddings,
            clock,
            multi_model_enabled,
        }
    }

    /// Models to embed/rank with right now: the config default overridden
    /// at runtime by `set_multi_model_enabled` (the `toggle_multi_model`
    /// tool), per spec §4.3.
    fn active_models(&self) -> Vec<String> {
        if self.multi_model_enabled.load(Ordering::Relaxed) {
            self.config.enabled_models.clone()
        } else {
            vec![self.config.default_model.clone()]
        }
    }

    /// Toggle multi-model embedding/ranking for the lifetime of this
    /// process. Scoped to runtime state rather than persisted config, per
    /// the `toggle_multi_model` tool's intent of a live on/off switch.
    pub async fn set_multi_model_enabled(&self, enabled: bool) -> bool {
        self.multi_model_enabled.store(enabled, Ordering::Relaxed);
        enabled
    }

    /// Load both tier files from disk, replacing current in-memory state.
    /// A no-op (empty state) the first time a data directory is used.
    pub async fn load(&self) -> Result<()> {
        let conversations: ConversationsFile =
            mojo_core::atomic_write::read_json(&self.config.conversations_path())
                .map_err(state_err)?
                .unwrap_or_default();
        let knowledge: KnowledgeFile = mojo_core::atomic_write::read_json(&self.config.knowledge_path())
            .map_err(state_err)?
            .unwrap_or_default();

        let mut guard = self.state.lock().await;
        *guard = MemoryState::from_files(conversations, knowledge);
        Ok(())
    }

    /// Persist both tier files atomically. Not auto-periodic: callers (the
    /// scheduler, or a clean-shutdown hook) decide when to call this.
    pub async fn save(&self) -> Result<()> {
        let guard = self.state.lock().await;
        let conversations = guard.to_conversations_file();
        let knowledge = guard.to_knowledge_file();
        drop(guard);

        mojo_core::atomic_write::write_json_atomic(&self.config.conversations_path(), &conversations)
            .map_err(state_err)?;
        mojo_core::atomic_write::write_json_atomic(&self.config.knowledge_path(), &knowledge)
            .map_err(state_err)?;
        Ok(())
    }

    /// Append a user/assistant message pair to Working, then promote the
    /// whole Working buffer into Active if it now exceeds `working_max_tokens`.
    pub async fn add_conversation(
        &self,
        user_content: &str,
        assistant_content: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let now = self.clock.now();
        {
            let mut guard = self.state.lock().await;
            guard.working.push(Message {
                role: Role::User,
                content: user_content.to_string(),
                created_at: now,
                metadata: metadata.clone(),
            });
            guard.working.push(Message {
                role: Role::Assistant,
                content: assistant_content.to_string(),
                created_at: now,
                metadata,
            });
        }

        if self.working_token_count().await > self.config.working_max_tokens {
            self.end_conversation().await?;
        }
        Ok(())
    }

    async fn working_token_count(&self) -> usize {
        let guard = self.state.lock().await;
        guard.working.iter().map(|m| count_tokens(&m.content)).sum()
    }

    /// Seal Working into a Conversation Page, insert at the front of
    /// Active (newest-first), then cascade oldest-Active -> Archival while
    /// Active is over capacity.
    pub async fn end_conversation(&self) -> Result<ConversationPage> {
        let now = self.clock.now();
        let sealed = {
            let mut guard = self.state.lock().await;
            if guard.working.is_empty() {
                return Err(MemoryError::Validation("nothing to end: working tier is empty".into()));
            }
            let messages = std::mem::take(&mut guard.working);
            let text = messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            ConversationPage {
                id: new_sortable_id(),
                digest: derive_digest(&text),
                messages,
                created_at: now,
                embeddings: HashMap::new(),
            }
        };

        {
            let mut guard = self.state.lock().await;
            guard.active.push_front(sealed.clone());
        }

        self.cascade_active_overflow().await?;
        Ok(sealed)
    }

    /// While Active is over capacity, move the oldest page into Archival,
    /// embedding it under every active model first. Embedding failure here
    /// is a write failure and is fatal, per spec §4.3.
    async fn cascade_active_overflow(&self) -> Result<()> {
        loop {
            let oldest = {
                let mut guard = self.state.lock().await;
                if guard.active.len() <= self.config.active_max_pages {
                    return Ok(());
                }
                guard.active.pop_back()
            };
            let Some(mut page) = oldest else { return Ok(()) };

            let models = self.active_models();
            let by_model = embed_texts_all_models(&[page.text()], &models, &self.embeddings).await?;
            page.embeddings = per_item_embeddings(&by_model, 0);

            let mut guard = self.state.lock().await;
            guard.archival.push(page);
        }
    }

    /// Chunk, embed, and index documents. Embedding failure is fatal: no
    /// partial document is left indexed under only some chunks.
    pub async fn add_documents(&self, docs: Vec<NewDocument>) -> Result<Vec<String>> {
        let now = self.clock.now();
        let models = self.active_models();
        let mut new_ids = Vec::with_capacity(docs.len());
        let mut built = Vec::with_capacity(docs.len());

        for doc in docs {
            let doc_id = new_sortable_id();
            let raw_chunks = chunk_text(&doc.content, self.config.chunk_size_chars, self.config.chunk_overlap_chars);
            let texts: Vec<String> = raw_chunks.clone();
            let by_model = embed_texts_all_models(&texts, &models, &self.embeddings).await?;

            let chunks: Vec<Chunk> = raw_chunks
                .into_iter()
                .enumerate()
                .map(|(i, text)| Chunk {
                    id: new_sortable_id(),
                    doc_id: doc_id.clone(),
                    index: i,
                    text,
                    embeddings: per_item_embeddings(&by_model, i),
                })
                .collect();

            new_ids.push(doc_id.clone());
            built.push(KnowledgeDocument {
                id: doc_id,
                content: doc.content,
                metadata: doc.metadata,
                source: doc.source,
                created_at: now,
                chunks,
            });
        }

        let mut guard = self.state.lock().await;
        guard.knowledge.extend(built);
        Ok(new_ids)
    }

    pub async fn remove_document(&self, id: &str) -> Result<()> {
        let mut guard = self.state.lock().await;
        let before = guard.knowledge.len();
        guard.knowledge.retain(|d| d.id != id);
        if guard.knowledge.len() == before {
            return Err(MemoryError::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn remove_conversation_message(&self, page_id: &str, index: usize) -> Result<()> {
        let mut guard = self.state.lock().await;
        let page = guard
            .active
            .iter_mut()
            .chain(guard.archival.iter_mut())
            .find(|p| p.id == page_id)
            .ok_or_else(|| MemoryError::PageNotFound(page_id.to_string()))?;
        if index >= page.messages.len() {
            return Err(MemoryError::MessageIndexOutOfRange {
                page_id: page_id.to_string(),
                index,
            });
        }
        page.messages.remove(index);
        Ok(())
    }

    /// Remove the `n` most recently created conversation pages, considering
    /// Active and Archival together (recency is a property of the page, not
    /// the tier it currently lives in).
    pub async fn remove_recent_conversations(&self, n: usize) -> Result<usize> {
        let mut guard = self.state.lock().await;
        let mut all_ids: Vec<(String, DateTime<Utc>)> = guard
            .active
            .iter()
            .chain(guard.archival.iter())
            .map(|p| (p.id.clone(), p.created_at))
            .collect();
        all_ids.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        let doomed: HashSet<String> = all_ids.into_iter().take(n).map(|(id, _)| id).collect();

        let removed = doomed.len();
        guard.active.retain(|p| !doomed.contains(&p.id));
        guard.archival.retain(|p| !doomed.contains(&p.id));
        Ok(removed)
    }

    /// Top-k across Active + Archival + Knowledge, ranked by weighted
    /// multi-model cosine similarity. Embedding failures here degrade
    /// rather than fail the call, per spec §4.3.
    pub async fn get_context(&self, query: &str, k: usize, filters: Option<ContextFilters>) -> Result<ContextResult> {
        let models = self.active_models();
        let (by_model, failed_models) =
            embed_texts_all_models_degraded(&[query.to_string()], &models, &self.embeddings).await;
        let query_embeddings = per_item_embeddings(&by_model, 0);
        let degraded = !failed_models.is_empty();

        let weights = if self.config.model_weights.is_empty() {
            crate::ranking::uniform_weights(&models)
        } else {
            self.config.model_weights.clone()
        };

        let want_kind = filters.and_then(|f| f.kind);
        let guard = self.state.lock().await;

        let mut candidates: Vec<ContextHit> = Vec::new();

        if want_kind != Some(ContextHitKind::KnowledgeChunk) {
            for page in guard.active.iter().chain(guard.archival.iter()) {
                if let Some(s) = score(
                    &Scorable {
                        id: &page.id,
                        created_at: page.created_at,
                        embeddings: &page.embeddings,
                    },
                    &query_embeddings,
                    &weights,
                ) {
                    if s >= self.config.score_floor {
                        candidates.push(ContextHit {
                            kind: ContextHitKind::ArchivalPage,
                            id: page.id.clone(),
                            text: page.text(),
                            score: s,
                            model_scores: crate::ranking::per_model_scores(
                                &Scorable {
                                    id: &page.id,
                                    created_at: page.created_at,
                                    embeddings: &page.embeddings,
                                },
                                &query_embeddings,
                            ),
                            created_at: page.created_at,
                        });
                    }
                }
            }
        }

        if want_kind != Some(ContextHitKind::ArchivalPage) {
            for doc in guard.knowledge.iter() {
                for chunk in &doc.chunks {
                    if let Some(s) = score(
                        &Scorable {
                            id: &chunk.id,
                            created_at: doc.created_at,
                            embeddings: &chunk.embeddings,
                        },
                        &query_embeddings,
                        &weights,
                    ) {
                        if s >= self.config.score_floor {
                            candidates.push(ContextHit {
                                kind: ContextHitKind::KnowledgeChunk,
                                id: chunk.id.clone(),
                                text: chunk.text.clone(),
                                score: s,
                                model_scores: crate::ranking::per_model_scores(
                                    &Scorable {
                                        id: &chunk.id,
                                        created_at: doc.created_at,
                                        embeddings: &chunk.embeddings,
                                    },
                                    &query_embeddings,
                                ),
                                created_at: doc.created_at,
                            });
                        }
                    }
                }
            }
        }
        drop(guard);

        sort_by_score_then_recency_then_id(&mut candidates, |h| h.score, |h| h.created_at, |h| h.id.as_str());
        candidates.truncate(k);

        Ok(ContextResult {
            hits: candidates,
            degraded,
            failed_models,
        })
    }

    pub async fn get_stats(&self) -> MemoryStats {
        let guard = self.state.lock().await;
        MemoryStats {
            working_messages: guard.working.len(),
            working_tokens: guard.working.iter().map(|m| count_tokens(&m.content)).sum(),
            active_pages: guard.active.len(),
            archival_pages: guard.archival.len(),
            knowledge_documents: guard.knowledge.len(),
            knowledge_chunks: guard.knowledge.iter().map(|d| d.chunks.len()).sum(),
        }
    }

    pub async fn list_recent_conversations(&self, n: usize) -> Vec<ConversationPage> {
        let guard = self.state.lock().await;
        let mut pages: Vec<ConversationPage> = guard.active.iter().chain(guard.archival.iter()).cloned().collect();
        pages.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        pages.truncate(n);
        pages
    }

    pub async fn list_recent_documents(&self, n: usize) -> Vec<KnowledgeDocument> {
        let guard = self.state.lock().await;
        let mut docs: Vec<KnowledgeDocument> = guard.knowledge.clone();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        docs.truncate(n);
        docs
    }
}

fn state_err(e: mojo_core::error::CoreError) -> MemoryError {
    MemoryError::State {
        path: "memory data directory".to_string(),
        reason: e.to_string(),
    }
}

/// Embed `texts` under every model in `models`, fatal on the first failure.
/// Used by write paths (Active -> Archival promotion, document indexing).
async fn embed_texts_all_models(
    texts: &[String],
    models: &[String],
    embeddings: &EmbeddingService,
) -> Result<HashMap<String, Vec<Vec<f32>>>> {
    let mut by_model = HashMap::new();
    for model in models {
        let vectors = embeddings.embed(texts, model).await?;
        by_model.insert(model.clone(), vectors);
    }
    Ok(by_model)
}

/// Embed `texts` under every model in `models`, collecting failures
/// instead of aborting. Used by the read path (`get_context`'s query
/// embedding), per spec §4.3's read-degradation rule.
async fn embed_texts_all_models_degraded(
    texts: &[String],
    models: &[String],
    embeddings: &EmbeddingService,
) -> (HashMap<String, Vec<Vec<f32>>>, Vec<String>) {
    let mut by_model = HashMap::new();
    let mut failed = Vec::new();
    for model in models {
        match embeddings.embed(texts, model).await {
            Ok(vectors) => {
                by_model.insert(model.clone(), vectors);
            }
            Err(e) => {
                tracing::warn!(model = %model, err = %e, "embedding model failed during read, degrading");
                failed.push(model.clone());
            }
        }
    }
    (by_model, failed)
}

fn per_item_embeddings(by_model: &HashMap<String, Vec<Vec<f32>>>, index: usize) -> HashMap<String, Vec<f32>> {
    by_model
        .iter()
        .filter_map(|(model, vectors)| vectors.get(index).map(|v| (model.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mojo_core::clock::FixedClock;
    use mojo_embedding::backend::LocalBackend;
    use chrono::TimeZone;

    fn test_service(data_dir: &std::path::Path) -> MemoryService {
        let mut embed_service = EmbeddingService::new(64);
        embed_service.register(Box::new(LocalBackend::new("m1", 8)));
        let config = MemoryConfig {
            data_dir: data_dir.to_path_buf(),
            working_max_tokens: 6,
            active_max_pages: 1,
            chunk_size_chars: 20,
            chunk_overlap_chars: 4,
            enabled_models: vec!["m1".to_string()],
            model_weights: HashMap::new(),
            score_floor: -1.0,
            multi_model_enabled: true,
            default_model: "m1".to_string(),
        };
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        MemoryService::new(config, Arc::new(embed_service), Arc::new(clock))
    }

    #[tokio::test]
    async fn add_conversation_promotes_working_on_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        service
            .add_conversation("hello there friend", "hi yourself friend today", HashMap::new())
            .await
            .unwrap();
        let stats = service.get_stats().await;
        assert_eq!(stats.working_messages, 0, "overflow should have sealed working into active");
        assert_eq!(stats.active_pages, 1);
    }

    #[tokio::test]
    async fn active_overflow_cascades_into_archival() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        service.add_conversation("a b c d e f g", "ok", HashMap::new()).await.unwrap();
        service.add_conversation("h i j k l m n", "ok", HashMap::new()).await.unwrap();
        let stats = service.get_stats().await;
        assert_eq!(stats.active_pages, 1);
        assert_eq!(stats.archival_pages, 1);
    }

    #[tokio::test]
    async fn get_context_finds_matching_document_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        service
            .add_documents(vec![NewDocument {
                content: "the quick brown fox".to_string(),
                source: "test".to_string(),
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();

        let result = service.get_context("the quick brown fox", 5, None).await.unwrap();
        assert!(!result.degraded);
        assert!(!result.hits.is_empty());
        assert_eq!(result.hits[0].kind, ContextHitKind::KnowledgeChunk);
        assert!(
            result.hits[0].model_scores.contains_key("m1"),
            "every returned hit must carry at least one non-null per-model score"
        );
    }

    #[tokio::test]
    async fn remove_document_errors_on_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        let err = service.remove_document("nope").await.unwrap_err();
        assert!(matches!(err, MemoryError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        service
            .add_documents(vec![NewDocument {
                content: "round trips".to_string(),
                source: "test".to_string(),
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();
        service.save().await.unwrap();

        let reloaded = test_service(dir.path());
        reloaded.load().await.unwrap();
        let stats = reloaded.get_stats().await;
        assert_eq!(stats.knowledge_documents, 1);
    }

    #[tokio::test]
    async fn remove_recent_conversations_removes_sealed_pages() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        service.add_conversation("hi", "yo", HashMap::new()).await.unwrap();
        service.end_conversation().await.unwrap();
        assert_eq!(service.get_stats().await.active_pages, 1);

        let removed = service.remove_recent_conversations(10).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(service.get_stats().await.active_pages, 0);
    }
}
