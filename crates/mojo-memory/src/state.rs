//! In-memory tier state plus its two on-disk file shapes
//! (`conversations_multi_model.json`, `knowledge_multi_model.json`) from
//! spec §6. Grounded on the teacher's `MemoryManager` (single struct behind
//! one lock, `skynet-memory/src/manager.rs`), adapted from a guarded SQLite
//! connection to guarded in-memory state with explicit JSON persistence.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{ConversationPage, KnowledgeDocument, Message};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConversationsFile {
    #[serde(default)]
    pub working: Vec<Message>,
    #[serde(default)]
    pub active: VecDeque<ConversationPage>,
    #[serde(default)]
    pub archival: Vec<ConversationPage>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KnowledgeFile {
    #[serde(default)]
    pub documents: Vec<KnowledgeDocument>,
}

/// The full guarded state a `MemoryService` owns. Working/Active/Archival
/// per spec §3's tier lifecycle; Knowledge Base is independent of the
/// conversation tiers.
#[derive(Debug, Default)]
pub struct MemoryState {
    pub working: Vec<Message>,
    pub active: VecDeque<ConversationPage>,
    pub archival: Vec<ConversationPage>,
    pub knowledge: Vec<KnowledgeDocument>,
}

impl MemoryState {
    pub fn from_files(conversations: ConversationsFile, knowledge: KnowledgeFile) -> Self {
        Self {
            working: conversations.working,
            active: conversations.active,
            archival: conversations.archival,
            knowledge: knowledge.documents,
        }
    }

    pub fn to_conversations_file(&self) -> ConversationsFile {
        ConversationsFile {
            working: self.working.clone(),
            active: self.active.clone(),
            archival: self.archival.clone(),
        }
    }

    pub fn to_knowledge_file(&self) -> KnowledgeFile {
        KnowledgeFile {
            documents: self.knowledge.clone(),
        }
    }
}
