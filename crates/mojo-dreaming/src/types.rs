//! Dreaming entities from spec §3: B Chunk, C Cluster, D Archive, Manifest.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub conversation_id: String,
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub topic_label: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterKind {
    Topic,
    Relationship,
    Timeline,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub kind: ClusterKind,
    #[serde(default)]
    pub member_chunk_ids: Vec<String>,
    pub summary_text: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Basic,
    Good,
    Premium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub conversation_id: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub quality_level: QualityLevel,
    pub chunks: Vec<Chunk>,
    pub clusters: Vec<Cluster>,
    pub entities: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    Active,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLocation {
    Hot,
    Cold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestVersionEntry {
    pub is_latest: bool,
    pub status: ArchiveStatus,
    pub storage_location: StorageLocation,
    pub previous_version: Option<u32>,
    pub supersedes_version: Option<u32>,
    pub superseded_by_version: Option<u32>,
    pub quality_level: QualityLevel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub conversation_id: String,
    pub latest_version: u32,
    pub versions: HashMap<String, ManifestVersionEntry>,
}

impl Manifest {
    pub fn empty(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            latest_version: 0,
            versions: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub version: u32,
    pub is_latest: bool,
    pub status: ArchiveStatus,
    pub storage_location: StorageLocation,
    pub quality_level: QualityLevel,
    pub created_at: DateTime<Utc>,
}
