//! Vector store abstraction for allure-rag.
//!
//! The [`VectorStore`] trait is the narrow surface the indexer and the query
//! engine need from a vector database: collection management, upsert,
//! filtered scroll, similarity search and delete. Backends: Qdrant (app
//! crate) and [`memory::InMemoryVectorStore`] for tests.
//!
//! Implementations classify their own failures: a store that cannot be
//! reached returns [`RagError::StoreUnreachable`](crate::error::RagError),
//! a failed read returns `RetrievalFailed`, a failed write `IndexFailed`.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{StoredPoint, VectorPoint};

/// Distance metric of a collection. Only cosine is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
}

/// Abstract vector database.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`collection_exists`](VectorStore::collection_exists) | Check for the target collection |
/// | [`create_collection`](VectorStore::create_collection) | Create it with a fixed dimension |
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite points by id |
/// | [`scroll_team`](VectorStore::scroll_team) | Unordered points of one team |
/// | [`search`](VectorStore::search) | Nearest points by vector distance |
/// | [`delete`](VectorStore::delete) | Delete points by id |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self) -> Result<bool>;

    async fn create_collection(&self, dims: usize, distance: Distance) -> Result<()>;

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Points whose payload `team` equals `team`, in no particular order.
    ///
    /// `limit = None` returns every matching point.
    async fn scroll_team(&self, team: &str, limit: Option<usize>) -> Result<Vec<StoredPoint>>;

    /// The `top_k` points nearest to `vector`, best first.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<StoredPoint>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}
