//! Dreaming Pipeline (C5): `process_conversation` A→B→C→D with a four-pass
//! resilient JSON parser and a versioned, manifest-backed archive store.

pub mod archive;
pub mod error;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod types;

pub use archive::ArchiveStore;
pub use error::{DreamingError, Result};
pub use pipeline::DreamingPipeline;
pub use types::{Archive, ArchiveSummary, Chunk, Cluster, ClusterKind, Manifest, QualityLevel};
