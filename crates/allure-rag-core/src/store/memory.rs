//! In-memory [`VectorStore`] implementation for testing and embedding.
//!
//! Points live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Search is brute-force cosine similarity over all stored vectors.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{StoredPoint, VectorPoint};

use super::{Distance, VectorStore};

/// In-memory vector store with a single collection.
pub struct InMemoryVectorStore {
    dims: RwLock<Option<usize>>,
    points: RwLock<Vec<VectorPoint>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            dims: RwLock::new(None),
            points: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all stored points, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.points
            .read()
            .unwrap()
            .iter()
            .map(|p| p.id.clone())
            .collect()
    }

    /// Dimension the collection was created with, if it exists.
    pub fn dims(&self) -> Option<usize> {
        *self.dims.read().unwrap()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn stored(point: &VectorPoint, score: Option<f32>) -> StoredPoint {
    StoredPoint {
        id: point.id.clone(),
        payload: point.payload.clone(),
        score,
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.dims.read().unwrap().is_some())
    }

    async fn create_collection(&self, dims: usize, _distance: Distance) -> Result<()> {
        let mut current = self.dims.write().unwrap();
        if current.is_some() {
            return Err(RagError::IndexFailed("collection already exists".to_string()));
        }
        *current = Some(dims);
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let dims = self
            .dims()
            .ok_or_else(|| RagError::IndexFailed("collection not found".to_string()))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dims) {
            return Err(RagError::IndexFailed(format!(
                "point {} has dimension {}, collection expects {}",
                bad.id,
                bad.vector.len(),
                dims
            )));
        }

        let mut stored = self.points.write().unwrap();
        for point in points {
            match stored.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => stored.push(point),
            }
        }
        Ok(())
    }

    async fn scroll_team(&self, team: &str, limit: Option<usize>) -> Result<Vec<StoredPoint>> {
        if self.dims().is_none() {
            return Err(RagError::RetrievalFailed("collection not found".to_string()));
        }
        let points = self.points.read().unwrap();
        Ok(points
            .iter()
            .filter(|p| p.payload.team == team)
            .take(limit.unwrap_or(usize::MAX))
            .map(|p| stored(p, None))
            .collect())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<StoredPoint>> {
        if self.dims().is_none() {
            return Err(RagError::RetrievalFailed("collection not found".to_string()));
        }
        let points = self.points.read().unwrap();
        let mut scored: Vec<StoredPoint> = points
            .iter()
            .map(|p| stored(p, Some(cosine_similarity(vector, &p.vector))))
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.points.write().unwrap();
        stored.retain(|p| !ids.contains(&p.id));
        Ok(())
    }
}
