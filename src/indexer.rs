//! Vector tier of the retention store.
//!
//! [`VectorIndexer`] owns the collection lifecycle and report uploads:
//! existing report groups of the team are evicted first, then one point per
//! chunk is upserted under the id `"{team}_{report_id}_{index}"`.
//!
//! Eviction deletes are not rolled back: if an upsert fails after old
//! points were removed, the error is returned and the removal stands.

use std::sync::Arc;

use chrono::Utc;

use allure_rag_core::models::{Chunk, PointPayload, VectorPoint};
use allure_rag_core::retention::{EvictionOrder, EvictionPlan, RetentionPolicy};
use allure_rag_core::store::{Distance, VectorStore};
use allure_rag_core::{RagError, Result};

/// Outcome of one [`VectorIndexer::upload`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    pub inserted: usize,
    pub evicted_reports: Vec<String>,
    pub replaced_points: usize,
}

pub struct VectorIndexer {
    store: Arc<dyn VectorStore>,
    policy: RetentionPolicy,
    order: EvictionOrder,
}

impl VectorIndexer {
    pub fn new(store: Arc<dyn VectorStore>, policy: RetentionPolicy, order: EvictionOrder) -> Self {
        Self {
            store,
            policy,
            order,
        }
    }

    /// Create the collection with cosine distance unless it already exists.
    pub async fn ensure_collection(&self, dims: usize) -> Result<()> {
        if dims == 0 {
            return Err(RagError::validation("vector dimension must be > 0"));
        }
        let exists = self
            .store
            .collection_exists()
            .await
            .map_err(|e| RagError::IndexFailed(e.to_string()))?;
        if !exists {
            self.store.create_collection(dims, Distance::Cosine).await?;
        }
        Ok(())
    }

    /// Plan eviction for an incoming report without touching the store.
    pub async fn plan_eviction(&self, team: &str, report_id: &str) -> Result<EvictionPlan> {
        let existing = self
            .store
            .scroll_team(team, None)
            .await
            .map_err(|e| RagError::IndexFailed(format!("listing points of {}: {}", team, e)))?;
        Ok(self
            .policy
            .plan_vector_eviction(existing, report_id, self.order))
    }

    /// Evict stale report groups of `team`, then upsert the chunks of
    /// `report_id`.
    pub async fn upload(
        &self,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
        team: &str,
        report_id: &str,
    ) -> Result<UploadReport> {
        if team.trim().is_empty() {
            return Err(RagError::validation("team must not be empty"));
        }
        if chunks.len() != embeddings.len() {
            return Err(RagError::validation(format!(
                "got {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let plan = self.plan_eviction(team, report_id).await?;
        let to_delete = plan.ids_to_delete();
        if !to_delete.is_empty() {
            self.store.delete(&to_delete).await?;
        }
        let evicted_reports: Vec<String> =
            plan.evicted.iter().map(|g| g.report_uuid.clone()).collect();
        for report in &evicted_reports {
            tracing::info!(team, report_uuid = %report, "evicted report vectors");
        }

        let ingested_at = Utc::now().timestamp_millis();
        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (chunk, vector))| VectorPoint {
                id: VectorPoint::point_id(team, report_id, index),
                vector,
                payload: PointPayload {
                    rag_text: chunk.rag_text.clone(),
                    name: chunk.name.clone(),
                    status: chunk.status.clone(),
                    suite: chunk.suite.clone(),
                    uid: chunk.uid.clone(),
                    team: team.to_string(),
                    report_uuid: report_id.to_string(),
                    ingested_at,
                },
            })
            .collect();

        let inserted = points.len();
        if inserted > 0 {
            self.store.upsert(points).await?;
        }
        tracing::info!(team, report_uuid = report_id, inserted, "uploaded report vectors");

        Ok(UploadReport {
            inserted,
            evicted_reports,
            replaced_points: plan.replaced.map_or(0, |g| g.point_ids.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allure_rag_core::decompose::decompose;
    use allure_rag_core::models::Report;
    use allure_rag_core::store::memory::InMemoryVectorStore;
    use serde_json::json;

    fn report_chunks(report_id: &str, cases: usize) -> Vec<Chunk> {
        let nodes: Vec<_> = (0..cases)
            .map(|i| {
                json!({"uid": format!("{}-{}", report_id, i), "name": format!("t{}", i),
                       "labels": [{"name": "parentSuite", "value": "TeamA"}]})
            })
            .collect();
        decompose(&Report::from_json(&json!(nodes)), Some(report_id))
    }

    fn vectors(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![1.0, i as f32]).collect()
    }

    async fn indexer(order: EvictionOrder) -> (Arc<InMemoryVectorStore>, VectorIndexer) {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = VectorIndexer::new(store.clone(), RetentionPolicy::default(), order);
        indexer.ensure_collection(2).await.unwrap();
        (store, indexer)
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let (store, indexer) = indexer(EvictionOrder::IngestedAt).await;
        indexer.ensure_collection(2).await.unwrap();
        assert_eq!(store.dims(), Some(2));
    }

    #[tokio::test]
    async fn test_length_mismatch_rejected() {
        let (_, indexer) = indexer(EvictionOrder::IngestedAt).await;
        let err = indexer
            .upload(&report_chunks("r", 2), vectors(1), "TeamA", "r")
            .await;
        assert!(matches!(err, Err(RagError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ids_are_deterministic_and_reupload_overwrites() {
        let (store, indexer) = indexer(EvictionOrder::IngestedAt).await;
        for _ in 0..3 {
            indexer
                .upload(&report_chunks("r1", 2), vectors(2), "TeamA", "r1")
                .await
                .unwrap();
        }
        assert_eq!(store.ids(), vec!["TeamA_r1_0", "TeamA_r1_1"]);
    }

    #[tokio::test]
    async fn test_at_most_three_groups_after_each_upload() {
        let (store, indexer) = indexer(EvictionOrder::ReportId).await;
        for id in ["a", "b", "c"] {
            indexer
                .upload(&report_chunks(id, 1), vectors(1), "TeamA", id)
                .await
                .unwrap();
        }
        let report = indexer
            .upload(&report_chunks("d", 2), vectors(2), "TeamA", "d")
            .await
            .unwrap();

        assert_eq!(report.evicted_reports, vec!["a"]);
        assert_eq!(report.inserted, 2);
        assert_eq!(
            store.ids(),
            vec!["TeamA_b_0", "TeamA_c_0", "TeamA_d_0", "TeamA_d_1"]
        );
    }

    #[tokio::test]
    async fn test_other_teams_are_untouched() {
        let (store, indexer) = indexer(EvictionOrder::ReportId).await;
        indexer
            .upload(&report_chunks("x", 1), vectors(1), "TeamB", "x")
            .await
            .unwrap();
        for id in ["a", "b", "c", "d"] {
            indexer
                .upload(&report_chunks(id, 1), vectors(1), "TeamA", id)
                .await
                .unwrap();
        }
        assert!(store.ids().contains(&"TeamB_x_0".to_string()));
        assert_eq!(store.len(), 4);
    }
}
