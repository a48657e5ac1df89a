//! Ingestion and analysis orchestration.
//!
//! Coordinates the full flow for one report: decompose → chunk file (file
//! tier) → embed → upload (vector tier) → analyse → deliver. Ingestion
//! failures are returned to the caller; analysis or delivery failures after
//! a successful ingestion produce a [`Delivery::Partial`] outcome instead.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use allure_rag_core::decompose::{decompose, extract_cases, extract_team};
use allure_rag_core::models::{Chunk, Report, UNKNOWN};
use allure_rag_core::retention::{EvictionOrder, RetentionPolicy};
use allure_rag_core::summary::format_report_summary;
use allure_rag_core::{RagError, Result};

use crate::cache::EmbeddingCache;
use crate::chunk_files::ChunkFileStore;
use crate::config::Config;
use crate::indexer::{UploadReport, VectorIndexer};
use crate::rag::QueryEngine;
use crate::sink::{combine_message, ResultSink};

/// Result of [`Pipeline::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub team: String,
    pub report_id: String,
    pub chunks: usize,
    pub chunk_file: PathBuf,
    pub upload: UploadReport,
}

/// One report uploaded by [`Pipeline::reindex`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedReport {
    pub team: String,
    pub report_id: String,
    pub upload: UploadReport,
}

/// Result of [`Pipeline::analyze_and_deliver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Delivered { team: String, analysis: String },
    Partial { error: String },
}

pub struct Pipeline {
    files: ChunkFileStore,
    cache: Arc<EmbeddingCache>,
    engine: Arc<QueryEngine>,
    sink: Arc<dyn ResultSink>,
    policy: RetentionPolicy,
    order: EvictionOrder,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        engine: Arc<QueryEngine>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let policy = RetentionPolicy::new(config.storage.retained_reports);
        Self {
            files: ChunkFileStore::new(config.storage.chunks_dir.clone(), policy),
            cache: engine.cache().clone(),
            engine,
            sink,
            policy,
            order: config.retrieval.eviction_order,
        }
    }

    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    /// Persist and index one report.
    ///
    /// `report_id` falls back to the report's root `uuid`, then `"unknown"`.
    /// A report without test cases writes an empty chunk file and leaves the
    /// vector tier untouched.
    pub async fn ingest(&self, report: &Report, report_id: Option<&str>) -> Result<IngestOutcome> {
        let team = extract_team(report)?;
        let report_id = report_id
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .or_else(|| report.uuid.clone())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let chunks = decompose(report, Some(&report_id));
        let chunk_file = self.files.persist_and_evict(&chunks, &team, &report_id)?;
        tracing::info!(%team, %report_id, chunks = chunks.len(), "saved chunks");

        let upload = if chunks.is_empty() {
            tracing::warn!(%team, %report_id, "report has no test cases, skipping indexing");
            UploadReport::default()
        } else {
            self.index_chunks(&chunks, &team, &report_id).await?
        };

        Ok(IngestOutcome {
            team,
            chunks: chunks.len(),
            report_id,
            chunk_file,
            upload,
        })
    }

    /// Embed and upload the chunks of one report, applying the vector-tier
    /// retention window of `team`.
    pub async fn index_chunks(
        &self,
        chunks: &[Chunk],
        team: &str,
        report_id: &str,
    ) -> Result<UploadReport> {
        let model = self.cache.get_model().await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.rag_text.clone()).collect();
        let embeddings = model.embed(&texts).await?;
        let dims = embeddings.first().map_or(model.dims(), Vec::len);

        let store = self.cache.get_client().await?;
        let indexer = VectorIndexer::new(store, self.policy, self.order);
        indexer.ensure_collection(dims).await?;
        indexer.upload(chunks, embeddings, team, report_id).await
    }

    /// Re-index previously written chunks, one upload per
    /// (`parentSuite`, `report_uuid`) pair in first-seen order. The chunk
    /// files themselves are left as they are.
    pub async fn reindex(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexedReport>> {
        let mut groups: Vec<(String, String, Vec<Chunk>)> = Vec::new();
        for chunk in chunks {
            let found = groups.iter().position(|(team, report, _)| {
                *team == chunk.parent_suite && *report == chunk.report_uuid
            });
            match found {
                Some(i) => groups[i].2.push(chunk),
                None => groups.push((
                    chunk.parent_suite.clone(),
                    chunk.report_uuid.clone(),
                    vec![chunk],
                )),
            }
        }

        let mut indexed = Vec::with_capacity(groups.len());
        for (team, report_id, group) in groups {
            if team.trim().is_empty() || team == UNKNOWN {
                tracing::warn!(%report_id, "chunks without a team, skipping");
                continue;
            }
            let upload = self.index_chunks(&group, &team, &report_id).await?;
            tracing::info!(%team, %report_id, inserted = upload.inserted, "re-indexed chunks");
            indexed.push(IndexedReport {
                team,
                report_id,
                upload,
            });
        }
        Ok(indexed)
    }

    /// Analyse `team` and hand the result to the sink.
    ///
    /// When `report` is given, its summary is prepended to the analysis.
    pub async fn analyze_and_deliver(
        &self,
        team: &str,
        report_id: &str,
        report: Option<&Report>,
        question_override: Option<&str>,
        prompt_override: Option<&str>,
    ) -> Delivery {
        let result = match self
            .engine
            .answer(team, question_override, prompt_override)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(team, report_id, code = e.code(), error = %e, "analysis failed");
                return Delivery::Partial {
                    error: e.to_string(),
                };
            }
        };

        let summary = report
            .map(|r| {
                let cases = extract_cases(&r.root);
                format_report_summary(&cases, true, Utc::now().timestamp())
            })
            .unwrap_or_default();
        let message = combine_message(&summary, &result.analysis);

        if let Err(e) = self.sink.deliver(report_id, &message).await {
            tracing::error!(team, report_id, error = %e, "analysis delivery failed");
            return Delivery::Partial {
                error: e.to_string(),
            };
        }

        Delivery::Delivered {
            team: result.team,
            analysis: result.analysis,
        }
    }

    /// Ingest a raw report and deliver its analysis.
    pub async fn process(
        &self,
        raw: &serde_json::Value,
        report_id: &str,
        prompt_override: Option<&str>,
    ) -> Result<(IngestOutcome, Delivery)> {
        if report_id.trim().is_empty() {
            return Err(RagError::validation("report id must not be empty"));
        }
        let report = Report::from_json(raw);
        let outcome = self.ingest(&report, Some(report_id)).await?;
        let delivery = self
            .analyze_and_deliver(&outcome.team, report_id, Some(&report), None, prompt_override)
            .await;
        Ok((outcome, delivery))
    }
}
