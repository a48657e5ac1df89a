//! Error taxonomy shared by every allure-rag component.
//!
//! Low-level failures (HTTP, Qdrant, filesystem, JSON) are converted into one
//! of these kinds before they cross a component boundary, so callers of the
//! query engine and the ingestion pipeline never see a raw transport error.

use thiserror::Error;

/// Result alias used throughout allure-rag.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or malformed caller input. Never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The vector store could not be constructed or reached at all.
    #[error("vector store unreachable: {0}")]
    StoreUnreachable(String),

    /// Connected to the vector store, but a read (scroll/search) failed.
    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),

    /// Connected to the vector store, but a write (collection/upsert/delete) failed.
    #[error("indexing failed: {0}")]
    IndexFailed(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The generative model call failed or returned a non-success status.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short machine-readable code, used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "bad_request",
            RagError::StoreUnreachable(_) => "store_unreachable",
            RagError::RetrievalFailed(_) => "retrieval_failed",
            RagError::IndexFailed(_) => "index_failed",
            RagError::Embedding(_) => "embedding_failed",
            RagError::GenerationFailed(_) => "generation_failed",
            RagError::Io(_) => "io_error",
            RagError::Serialization(_) => "serialization_error",
        }
    }
}
