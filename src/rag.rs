//! Retrieval-augmented query engine.
//!
//! Two retrieval paths share one engine:
//! - **Team analysis** ([`QueryEngine::answer`]): unordered scroll of every
//!   point of a team (up to `retrieval.scroll_limit`), no similarity ranking.
//! - **Ad-hoc questions** ([`QueryEngine::search`], [`QueryEngine::ask`]):
//!   the query is embedded and the `top_k` nearest chunks are used.
//!
//! Store failures surface as `StoreUnreachable` or `RetrievalFailed`, model
//! failures as `GenerationFailed`. An empty retrieval is not an error: the
//! answer is the empty string and the model is never called.

use std::sync::Arc;

use allure_rag_core::models::{AnalysisResult, StoredPoint};
use allure_rag_core::prompt::{analysis_prompt, build_context, question_prompt};
use allure_rag_core::store::VectorStore;
use allure_rag_core::{RagError, Result};

use crate::cache::EmbeddingCache;
use crate::generation::{complete, CompletionModel};

pub struct QueryEngine {
    cache: Arc<EmbeddingCache>,
    model: Arc<dyn CompletionModel>,
    scroll_limit: usize,
}

fn retrieval_error(err: RagError) -> RagError {
    match err {
        RagError::RetrievalFailed(_) | RagError::StoreUnreachable(_) => err,
        other => RagError::RetrievalFailed(other.to_string()),
    }
}

impl QueryEngine {
    pub fn new(cache: Arc<EmbeddingCache>, model: Arc<dyn CompletionModel>, scroll_limit: usize) -> Self {
        Self {
            cache,
            model,
            scroll_limit: scroll_limit.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Store handle, or `None` when the collection does not exist yet.
    async fn store(&self) -> Result<Option<Arc<dyn VectorStore>>> {
        let store = self.cache.get_client().await?;
        let exists = store.collection_exists().await.map_err(retrieval_error)?;
        Ok(exists.then_some(store))
    }

    /// Every retained chunk text of `team`, in store order.
    pub async fn team_context(&self, team: &str) -> Result<Vec<String>> {
        let Some(store) = self.store().await? else {
            return Ok(Vec::new());
        };
        let points = store
            .scroll_team(team, Some(self.scroll_limit))
            .await
            .map_err(retrieval_error)?;
        Ok(points.into_iter().map(|p| p.payload.rag_text).collect())
    }

    /// Analyse the retained reports of `team`.
    ///
    /// `prompt_override` replaces the whole instruction; `question_override`
    /// replaces only the question. Without either, the default trend
    /// analysis is requested.
    pub async fn answer(
        &self,
        team: &str,
        question_override: Option<&str>,
        prompt_override: Option<&str>,
    ) -> Result<AnalysisResult> {
        let team = team.trim();
        if team.is_empty() {
            return Err(RagError::validation("team name must not be empty"));
        }

        let texts = self.team_context(team).await?;
        if texts.is_empty() {
            tracing::info!(team, "no indexed chunks, skipping generation");
            return Ok(AnalysisResult {
                team: team.to_string(),
                analysis: String::new(),
            });
        }

        let context = build_context(&texts);
        let prompt = analysis_prompt(&context, question_override, prompt_override);
        tracing::info!(team, chunks = texts.len(), model = self.model.model_name(), "generating analysis");
        let analysis = complete(self.model.as_ref(), &prompt).await?;

        Ok(AnalysisResult {
            team: team.to_string(),
            analysis,
        })
    }

    /// The `top_k` points nearest to `query`, best first.
    pub async fn search_points(&self, query: &str, top_k: usize) -> Result<Vec<StoredPoint>> {
        if query.trim().is_empty() {
            return Err(RagError::validation("query must not be empty"));
        }
        let Some(store) = self.store().await? else {
            return Ok(Vec::new());
        };
        let embedder = self.cache.get_model().await?;
        let vector = embedder.embed_query(query).await?;
        store
            .search(&vector, top_k.max(1))
            .await
            .map_err(retrieval_error)
    }

    /// `rag_text` of the `top_k` chunks nearest to `query`.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        Ok(self
            .search_points(query, top_k)
            .await?
            .into_iter()
            .map(|p| p.payload.rag_text)
            .collect())
    }

    /// Answer a free-form question from the nearest chunks.
    pub async fn ask(&self, question: &str, top_k: usize) -> Result<String> {
        let texts = self.search(question, top_k).await?;
        if texts.is_empty() {
            return Ok(String::new());
        }
        let prompt = question_prompt(&build_context(&texts), question.trim());
        complete(self.model.as_ref(), &prompt).await
    }
}
