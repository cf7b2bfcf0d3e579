//! Entities from spec §3's Data Model: Message, Conversation Page,
//! Archival Item, Knowledge Document/Chunk — restructured from the
//! teacher's flat per-user `UserMemory`/`ConversationMessage` rows
//! (`skynet-memory/src/types.rs`) around the tiered-conversation model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at,
            metadata: HashMap::new(),
        }
    }
}

/// An ordered sequence of Messages sealed out of the Working tier. Never
/// mutated in place once archived; only index entries (embeddings) change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPage {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub digest: String,
    /// Present once the page has been promoted into Archival and embedded
    /// under at least one model. Absent while the page lives only in Active.
    #[serde(default)]
    pub embeddings: HashMap<String, Vec<f32>>,
}

impl ConversationPage {
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub const DIGEST_CHARS: usize = 160;

pub fn derive_digest(text: &str) -> String {
    text.chars().take(DIGEST_CHARS).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub embeddings: HashMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
}

/// Uniform shape `get_context` returns candidates in, regardless of which
/// tier they came from. `score` is the aggregate across `model_scores`
/// (spec §8's ranking weight); `model_scores` keeps the per-model
/// breakdown that produced it, so callers can see which models actually
/// scored the hit and which were missing (invariant 4: a missing model
/// is zero, not absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextHit {
    pub kind: ContextHitKind,
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub model_scores: HashMap<String, f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextHitKind {
    ArchivalPage,
    KnowledgeChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResult {
    pub hits: Vec<ContextHit>,
    pub degraded: bool,
    pub failed_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    pub working_messages: usize,
    pub working_tokens: usize,
    pub active_pages: usize,
    pub archival_pages: usize,
    pub knowledge_documents: usize,
    pub knowledge_chunks: usize,
}
