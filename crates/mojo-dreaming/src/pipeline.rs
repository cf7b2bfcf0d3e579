//! `process_conversation` (spec §4.4): the single entry point driving
//! A→B→C→D. The scheduler (C6) calls this; the pipeline itself never
//! checks the clock or an off-peak window — that's the scheduler's job.

use std::collections::HashMap;
use std::sync::Arc;

use mojo_core::clock::Clock;
use mojo_core::ids::new_sortable_id;
use mojo_llm::{ChatMessage, LlmRouter, Role};

use crate::archive::ArchiveStore;
use crate::error::{DreamingError, Result};
use crate::normalize::{normalize_chunks_payload, normalize_clusters_payload};
use crate::parse::resilient_parse;
use crate::types::{Archive, Chunk, Cluster, QualityLevel};

const CHUNK_TASK_TAG: &str = "dreaming_chunk";
const CLUSTER_TASK_TAG: &str = "dreaming_cluster";
const REPAIR_TASK_TAG: &str = "repair_json";
const STAGE_MAX_TOKENS: u32 = 4096;

pub struct DreamingPipeline {
    llm: Arc<LlmRouter>,
    archives: Arc<ArchiveStore>,
    clock: Arc<dyn Clock>,
}

impl DreamingPipeline {
    pub fn new(llm: Arc<LlmRouter>, archives: Arc<ArchiveStore>, clock: Arc<dyn Clock>) -> Self {
        Self { llm, archives, clock }
    }

    pub async fn process_conversation(
        &self,
        conversation_id: &str,
        raw_text: &str,
        quality_level: QualityLevel,
    ) -> Result<Archive> {
        if raw_text.trim().is_empty() {
            return Err(DreamingError::Validation("raw_text must not be empty".to_string()));
        }

        let chunks = self.chunk(conversation_id, raw_text).await?;
        let clusters = self.cluster(&chunks).await?;

        let mut entities: Vec<String> = chunks.iter().flat_map(|c| c.entities.iter().cloned()).collect();
        entities.extend(clusters.iter().flat_map(|c| c.entities.iter().cloned()));
        entities.sort();
        entities.dedup();

        let version = self.archives.next_version(conversation_id)?;
        let mut metadata = HashMap::new();
        metadata.insert("source_text".to_string(), serde_json::Value::String(raw_text.to_string()));

        let archive = Archive {
            conversation_id: conversation_id.to_string(),
            version,
            created_at: self.clock.now(),
            quality_level,
            chunks,
            clusters,
            entities,
            metadata,
        };

        self.archives.write_new_version(&archive)?;
        Ok(archive)
    }

    /// Re-runs A→B→C→D against the latest version's retained source text,
    /// producing version N+1 at `new_quality`, per spec §4.4.
    pub async fn upgrade_quality(&self, conversation_id: &str, new_quality: QualityLevel) -> Result<Archive> {
        let latest = self.archives.get_archive(conversation_id, None)?;
        let source_text = latest
            .metadata
            .get("source_text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DreamingError::Validation("latest archive retains no source text to re-run".to_string()))?
            .to_string();
        self.process_conversation(conversation_id, &source_text, new_quality).await
    }

    pub fn get_archive(&self, conversation_id: &str, version: Option<u32>) -> Result<Archive> {
        self.archives.get_archive(conversation_id, version)
    }

    pub fn list_archives(&self, conversation_id: &str) -> Result<Vec<crate::types::ArchiveSummary>> {
        self.archives.list_archives(conversation_id)
    }

    async fn chunk(&self, conversation_id: &str, raw_text: &str) -> Result<Vec<Chunk>> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: "Segment the conversation transcript into semantic chunks. Respond with JSON \
                          {\"chunks\": [{\"text\":..., \"topic_label\":..., \"entities\":[...], \"language\":..., \
                          \"speaker\":..., \"confidence\":...}]}."
                    .to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: raw_text.to_string(),
            },
        ];

        let raw_output = self.llm.complete_for_task(CHUNK_TASK_TAG, &messages, STAGE_MAX_TOKENS).await?;
        let parsed = resilient_parse(&raw_output, "chunking", &self.llm, REPAIR_TASK_TAG).await?;
        let items = normalize_chunks_payload(&parsed)?;

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let raw: RawChunk = serde_json::from_value(item)
                    .map_err(|e| DreamingError::Validation(format!("malformed chunk object: {e}")))?;
                Ok(Chunk {
                    id: new_sortable_id(),
                    conversation_id: conversation_id.to_string(),
                    index,
                    text: raw.text,
                    topic_label: raw.topic_label,
                    entities: raw.entities,
                    language: raw.language,
                    speaker: raw.speaker,
                    confidence: raw.confidence,
                    embedding: None,
                })
            })
            .collect()
    }

    async fn cluster(&self, chunks: &[Chunk]) -> Result<Vec<Cluster>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_summary = chunks
            .iter()
            .map(|c| format!("[{}] {}", c.id, c.text))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: "Group the given chunks into TOPIC/RELATIONSHIP/TIMELINE/SUMMARY clusters. Respond \
                          with JSON {\"clusters\": [{\"kind\":..., \"member_chunk_ids\":[...], \
                          \"summary_text\":..., \"entities\":[...], \"confidence\":...}]}."
                    .to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: chunk_summary,
            },
        ];

        let raw_output = self.llm.complete_for_task(CLUSTER_TASK_TAG, &messages, STAGE_MAX_TOKENS).await?;
        let parsed = resilient_parse(&raw_output, "clustering", &self.llm, REPAIR_TASK_TAG).await?;
        let items = normalize_clusters_payload(&parsed)?;

        items
            .into_iter()
            .map(|item| {
                let raw: RawCluster = serde_json::from_value(item)
                    .map_err(|e| DreamingError::Validation(format!("malformed cluster object: {e}")))?;
                Ok(Cluster {
                    id: new_sortable_id(),
                    kind: raw.kind,
                    member_chunk_ids: raw.member_chunk_ids,
                    summary_text: raw.summary_text,
                    entities: raw.entities,
                    confidence: raw.confidence,
                })
            })
            .collect()
    }
}

#[derive(serde::Deserialize)]
struct RawChunk {
    text: String,
    #[serde(default)]
    topic_label: Option<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(serde::Deserialize)]
struct RawCluster {
    kind: crate::types::ClusterKind,
    #[serde(default)]
    member_chunk_ids: Vec<String>,
    summary_text: String,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mojo_core::clock::FixedClock;
    use mojo_llm::provider::StubProvider;
    use mojo_llm::{RetryPolicy, TaskRoute};

    fn pipeline_with(dir: &std::path::Path, chunk_response: &str, cluster_response: &str) -> DreamingPipeline {
        let mut router = LlmRouter::new(RetryPolicy::default());
        router.register_provider(Box::new(StubProvider::always("p", chunk_response.to_string())));
        router.register_provider(Box::new(StubProvider::always("p2", cluster_response.to_string())));
        router.set_route(
            CHUNK_TASK_TAG,
            TaskRoute { provider: "p".to_string(), model: "m".to_string() },
        );
        router.set_route(
            CLUSTER_TASK_TAG,
            TaskRoute { provider: "p2".to_string(), model: "m".to_string() },
        );
        router.set_route(
            REPAIR_TASK_TAG,
            TaskRoute { provider: "p".to_string(), model: "m".to_string() },
        );

        let archives = Arc::new(ArchiveStore::new(dir));
        let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
        DreamingPipeline::new(Arc::new(router), archives, clock)
    }

    #[tokio::test]
    async fn process_conversation_produces_version_one() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(
            dir.path(),
            r#"{"chunks": [{"text": "hello", "entities": ["alice"]}]}"#,
            r#"{"clusters": [{"kind": "SUMMARY", "summary_text": "intro", "entities": ["alice"]}]}"#,
        );

        let archive = pipeline
            .process_conversation("conv-1", "hello there", QualityLevel::Basic)
            .await
            .unwrap();
        assert_eq!(archive.version, 1);
        assert_eq!(archive.chunks.len(), 1);
        assert_eq!(archive.clusters.len(), 1);
        assert_eq!(archive.entities, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn upgrade_quality_produces_version_two_from_retained_source() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(
            dir.path(),
            r#"{"chunks": [{"text": "hello"}]}"#,
            r#"{"clusters": []}"#,
        );

        pipeline.process_conversation("conv-1", "hello there", QualityLevel::Basic).await.unwrap();
        let upgraded = pipeline.upgrade_quality("conv-1", QualityLevel::Premium).await.unwrap();
        assert_eq!(upgraded.version, 2);
        assert_eq!(upgraded.quality_level, QualityLevel::Premium);
    }

    #[tokio::test]
    async fn empty_raw_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), "{}", "{}");
        let err = pipeline.process_conversation("conv-1", "   ", QualityLevel::Basic).await.unwrap_err();
        assert!(matches!(err, DreamingError::Validation(_)));
    }
}
