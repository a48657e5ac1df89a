//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use allure_rag::cache::EmbeddingCache;
use allure_rag::config::Config;
use allure_rag::generation::{CompletionModel, FragmentStream};
use allure_rag::pipeline::Pipeline;
use allure_rag::rag::QueryEngine;
use allure_rag::sink::ResultSink;
use allure_rag_core::embedding::Embedder;
use allure_rag_core::models::{StoredPoint, VectorPoint};
use allure_rag_core::store::{Distance, VectorStore};
use allure_rag_core::{RagError, Result};

/// Deterministic 4-dimensional embedding derived from the text.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                vec![
                    1.0,
                    t.matches("passed").count() as f32,
                    t.matches("failed").count() as f32,
                    (t.len() % 7) as f32,
                ]
            })
            .collect())
    }
}

/// Completion model replaying fixed fragments and recording prompts.
#[derive(Default)]
pub struct ScriptedModel {
    pub fragments: Vec<String>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

struct Replay(std::vec::IntoIter<String>);

#[async_trait]
impl FragmentStream for Replay {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        Ok(self.0.next())
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, prompt: &str) -> Result<Box<dyn FragmentStream>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(RagError::GenerationFailed("model returned 500".to_string()));
        }
        Ok(Box::new(Replay(self.fragments.clone().into_iter())))
    }
}

/// Sink recording every delivered `(report_id, message)`.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn deliver(&self, report_id: &str, message: &str) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((report_id.to_string(), message.to_string()));
        Ok(())
    }
}

/// A store whose collection exists but every read and write fails.
pub struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn collection_exists(&self) -> Result<bool> {
        Ok(true)
    }
    async fn create_collection(&self, _dims: usize, _distance: Distance) -> Result<()> {
        Err(RagError::IndexFailed("read-only".to_string()))
    }
    async fn upsert(&self, _points: Vec<VectorPoint>) -> Result<()> {
        Err(RagError::IndexFailed("read-only".to_string()))
    }
    async fn scroll_team(&self, _team: &str, _limit: Option<usize>) -> Result<Vec<StoredPoint>> {
        Err(RagError::RetrievalFailed("connection reset by peer".to_string()))
    }
    async fn search(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<StoredPoint>> {
        Err(RagError::RetrievalFailed("connection reset by peer".to_string()))
    }
    async fn delete(&self, _ids: &[String]) -> Result<()> {
        Err(RagError::IndexFailed("read-only".to_string()))
    }
}

/// Report with one passed and one failed case of `TeamA`.
pub fn two_case_report(uuid: &str) -> Value {
    json!({
        "uuid": uuid,
        "children": [
            {
                "name": "auth",
                "children": [
                    {
                        "uid": format!("{}-login", uuid),
                        "name": "login works",
                        "status": "passed",
                        "time": {"start": 1_700_000_000_000i64},
                        "labels": [
                            {"name": "parentSuite", "value": "TeamA"},
                            {"name": "suite", "value": "auth"},
                            {"name": "owner", "value": "ivan"}
                        ]
                    },
                    {
                        "uid": format!("{}-logout", uuid),
                        "name": "logout works",
                        "status": "failed",
                        "statusMessage": "expected 200, got 500",
                        "labels": [
                            {"name": "parentSuite", "value": "TeamA"},
                            {"name": "suite", "value": "auth"}
                        ]
                    }
                ]
            }
        ]
    })
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config::minimal();
    config.storage.chunks_dir = root.join("chunks");
    config
}

pub fn pipeline(
    root: &Path,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn CompletionModel>,
    sink: Arc<dyn ResultSink>,
) -> Pipeline {
    let config = test_config(root);
    let cache = Arc::new(EmbeddingCache::with_instances(Arc::new(HashEmbedder), store));
    let engine = Arc::new(QueryEngine::new(cache, model, config.retrieval.scroll_limit));
    Pipeline::new(&config, engine, sink)
}
