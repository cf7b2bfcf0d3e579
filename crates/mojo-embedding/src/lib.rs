//! Embedding Service (C1): polymorphic backends, content-addressed cache.

pub mod backend;
pub mod cache;
pub mod error;
pub mod service;

pub use backend::{EmbeddingBackend, LocalBackend, RemoteCloudBackend, RemoteHttpBackend};
pub use error::{EmbeddingError, Result};
pub use service::EmbeddingService;
