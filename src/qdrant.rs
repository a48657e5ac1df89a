//! Qdrant-backed [`VectorStore`].
//!
//! Qdrant only accepts unsigned integers or UUIDs as point ids, so each
//! logical id (`"{team}_{report}_{index}"`) is mapped to a name-based UUIDv5
//! and the logical id is kept in the `point_key` payload field. The mapping
//! is deterministic, which keeps re-ingestion an overwrite.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, value::Kind, Condition, CreateCollectionBuilder, DeletePointsBuilder, Filter, PointId,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use uuid::Uuid;

use allure_rag_core::models::{PointPayload, StoredPoint, VectorPoint};
use allure_rag_core::store::{Distance, VectorStore};
use allure_rag_core::{RagError, Result};

use crate::config::QdrantConfig;

/// Payload key holding the logical point id.
pub const POINT_KEY: &str = "point_key";

/// Points fetched per scroll request.
const SCROLL_PAGE: usize = 256;

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Build the client and verify the server answers.
    ///
    /// Any failure here is reported as [`RagError::StoreUnreachable`].
    pub async fn connect(config: &QdrantConfig) -> Result<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = config.api_key.clone() {
            builder = builder.api_key(api_key);
        }
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));

        let client = builder
            .build()
            .map_err(|e| RagError::StoreUnreachable(format!("failed to build client: {}", e)))?;

        client
            .health_check()
            .await
            .map_err(|e| RagError::StoreUnreachable(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, collection = %config.collection, "connected to qdrant");

        Ok(Self {
            client,
            collection: config.collection.clone(),
        })
    }
}

/// Deterministic Qdrant id for a point id.
///
/// Logical ids are mapped to a UUIDv5. A raw Qdrant id, as reported for
/// points stored without a `point_key`, is passed through unchanged so the
/// point can still be deleted. Logical ids always contain `_` and therefore
/// never parse as either raw form.
pub fn qdrant_point_id(id: &str) -> PointId {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return PointId::from(uuid.to_string());
    }
    if let Ok(num) = id.parse::<u64>() {
        return PointId::from(num);
    }
    PointId::from(Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes()).to_string())
}

fn payload_to_qdrant(logical_id: &str, payload: PointPayload) -> HashMap<String, QdrantValue> {
    HashMap::from([
        (POINT_KEY.to_string(), QdrantValue::from(logical_id.to_string())),
        ("rag_text".to_string(), QdrantValue::from(payload.rag_text)),
        ("name".to_string(), QdrantValue::from(payload.name)),
        ("status".to_string(), QdrantValue::from(payload.status)),
        ("suite".to_string(), QdrantValue::from(payload.suite)),
        ("uid".to_string(), QdrantValue::from(payload.uid)),
        ("team".to_string(), QdrantValue::from(payload.team)),
        ("report_uuid".to_string(), QdrantValue::from(payload.report_uuid)),
        ("ingested_at".to_string(), QdrantValue::from(payload.ingested_at)),
    ])
}

fn string_value(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        Some(Kind::IntegerValue(i)) => i.to_string(),
        Some(Kind::DoubleValue(f)) => f.to_string(),
        Some(Kind::BoolValue(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn integer_value(payload: &HashMap<String, QdrantValue>, key: &str) -> i64 {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(i)) => *i,
        Some(Kind::DoubleValue(f)) => *f as i64,
        _ => 0,
    }
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

/// Convert a stored Qdrant point back into the logical model.
///
/// Points written without a `point_key` keep their raw Qdrant id.
fn stored_point(
    id: Option<&PointId>,
    payload: &HashMap<String, QdrantValue>,
    score: Option<f32>,
) -> StoredPoint {
    let logical = string_value(payload, POINT_KEY);
    StoredPoint {
        id: if logical.is_empty() {
            point_id_string(id)
        } else {
            logical
        },
        payload: PointPayload {
            rag_text: string_value(payload, "rag_text"),
            name: string_value(payload, "name"),
            status: string_value(payload, "status"),
            suite: string_value(payload, "suite"),
            uid: string_value(payload, "uid"),
            team: string_value(payload, "team"),
            report_uuid: string_value(payload, "report_uuid"),
            ingested_at: integer_value(payload, "ingested_at"),
        },
        score,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self) -> Result<bool> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| RagError::RetrievalFailed(e.to_string()))
    }

    async fn create_collection(&self, dims: usize, distance: Distance) -> Result<()> {
        let distance = match distance {
            Distance::Cosine => qdrant::Distance::Cosine,
        };
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dims as u64, distance)),
            )
            .await
            .map_err(|e| RagError::IndexFailed(e.to_string()))?;
        tracing::info!(collection = %self.collection, dims, "created collection");
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                PointStruct::new(
                    qdrant_point_id(&p.id),
                    p.vector,
                    payload_to_qdrant(&p.id, p.payload),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| RagError::IndexFailed(e.to_string()))?;
        Ok(())
    }

    async fn scroll_team(&self, team: &str, limit: Option<usize>) -> Result<Vec<StoredPoint>> {
        let mut out = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let remaining = limit.map(|l| l.saturating_sub(out.len()));
            if remaining == Some(0) {
                break;
            }
            let page = remaining.unwrap_or(SCROLL_PAGE).min(SCROLL_PAGE);

            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .filter(Filter::must([Condition::matches("team", team.to_string())]))
                .limit(page as u32)
                .with_payload(true)
                .with_vectors(false);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| RagError::RetrievalFailed(e.to_string()))?;

            out.extend(
                response
                    .result
                    .iter()
                    .map(|p| stored_point(p.id.as_ref(), &p.payload, None)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(out)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<StoredPoint>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::RetrievalFailed(e.to_string()))?;

        Ok(response
            .result
            .iter()
            .map(|p| stored_point(p.id.as_ref(), &p.payload, Some(p.score)))
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| qdrant_point_id(id))
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(point_ids)
                    .wait(true),
            )
            .await
            .map_err(|e| RagError::IndexFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> PointPayload {
        PointPayload {
            rag_text: "Название теста: t".to_string(),
            name: "t".to_string(),
            status: "failed".to_string(),
            suite: "auth".to_string(),
            uid: "u1".to_string(),
            team: "TeamA".to_string(),
            report_uuid: "r1".to_string(),
            ingested_at: 1_700_000_000_123,
        }
    }

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = qdrant_point_id("TeamA_r1_0");
        assert_eq!(a, qdrant_point_id("TeamA_r1_0"));
        assert_ne!(a, qdrant_point_id("TeamA_r1_1"));
        let Some(qdrant::point_id::PointIdOptions::Uuid(uuid)) = a.point_id_options else {
            panic!("expected a uuid point id");
        };
        assert!(Uuid::parse_str(&uuid).is_ok());
    }

    #[test]
    fn test_raw_ids_round_trip_for_deletion() {
        let uuid_id = PointId::from("5c56c793-69f3-4fbf-87e6-c4bf54c28c26".to_string());
        let point = stored_point(Some(&uuid_id), &HashMap::new(), None);
        assert_eq!(qdrant_point_id(&point.id), uuid_id);

        let num_id = PointId::from(7u64);
        let point = stored_point(Some(&num_id), &HashMap::new(), None);
        assert_eq!(qdrant_point_id(&point.id), num_id);
    }

    #[test]
    fn test_payload_conversion_keeps_logical_id() {
        let raw = payload_to_qdrant("TeamA_r1_0", payload());
        let id = qdrant_point_id("TeamA_r1_0");
        let point = stored_point(Some(&id), &raw, Some(0.5));
        assert_eq!(point.id, "TeamA_r1_0");
        assert_eq!(point.payload, payload());
        assert_eq!(point.score, Some(0.5));
    }

    #[test]
    fn test_missing_point_key_falls_back_to_raw_id() {
        let id = PointId::from(7u64);
        let point = stored_point(Some(&id), &HashMap::new(), None);
        assert_eq!(point.id, "7");
        assert_eq!(point.payload.ingested_at, 0);
    }
}
