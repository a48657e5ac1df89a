//! Streaming text completion.
//!
//! A [`CompletionModel`] opens a [`FragmentStream`]; [`complete`] drains it
//! in arrival order and trims the concatenated answer. The Ollama backend
//! reads `/api/generate` line-delimited JSON as it arrives.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use allure_rag_core::stream::{parse_fragment, AnswerBuilder, LineBuffer};
use allure_rag_core::{RagError, Result};

use crate::config::GenerationConfig;

/// Text fragments of one streamed completion.
#[async_trait]
pub trait FragmentStream: Send {
    /// Next fragment, or `None` once the stream has closed.
    async fn next_fragment(&mut self) -> Result<Option<String>>;
}

/// A generative model answering a prompt as a stream of fragments.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn stream(&self, prompt: &str) -> Result<Box<dyn FragmentStream>>;
}

/// Run a completion to the end and return the trimmed answer.
pub async fn complete(model: &dyn CompletionModel, prompt: &str) -> Result<String> {
    let mut stream = model.stream(prompt).await?;
    let mut answer = AnswerBuilder::new();
    while let Some(fragment) = stream.next_fragment().await? {
        answer.push(&fragment);
    }
    tracing::debug!(model = model.model_name(), fragments = answer.fragments(), "completion finished");
    Ok(answer.finish())
}

const CONNECT_TIMEOUT_SECS: u64 = 10;

pub struct OllamaGenerator {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        // Per-read limit: a long answer keeps streaming as long as fragments
        // keep arriving.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::GenerationFailed(e.to_string()))?;
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl CompletionModel for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, prompt: &str) -> Result<Box<dyn FragmentStream>> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::GenerationFailed(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        Ok(Box::new(OllamaStream {
            response,
            buffer: LineBuffer::new(),
            pending: VecDeque::new(),
            closed: false,
        }))
    }
}

struct OllamaStream {
    response: reqwest::Response,
    buffer: LineBuffer,
    pending: VecDeque<String>,
    closed: bool,
}

#[async_trait]
impl FragmentStream for OllamaStream {
    async fn next_fragment(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                match parse_fragment(&line)? {
                    Some(fragment) => return Ok(Some(fragment)),
                    None => continue,
                }
            }
            if self.closed {
                return Ok(None);
            }

            let chunk = self
                .response
                .chunk()
                .await
                .map_err(|e| RagError::GenerationFailed(format!("stream interrupted: {}", e)))?;
            match chunk {
                Some(bytes) => self.pending.extend(self.buffer.push(&bytes)),
                None => {
                    self.closed = true;
                    if let Some(rest) = std::mem::take(&mut self.buffer).finish() {
                        self.pending.push_back(rest);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fragments(VecDeque<Result<String>>);

    #[async_trait]
    impl FragmentStream for Fragments {
        async fn next_fragment(&mut self) -> Result<Option<String>> {
            self.0.pop_front().transpose()
        }
    }

    struct Scripted(Vec<&'static str>, bool);

    #[async_trait]
    impl CompletionModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn stream(&self, _prompt: &str) -> Result<Box<dyn FragmentStream>> {
            let mut items: VecDeque<Result<String>> =
                self.0.iter().map(|s| Ok(s.to_string())).collect();
            if self.1 {
                items.push_back(Err(RagError::GenerationFailed("reset".to_string())));
            }
            Ok(Box::new(Fragments(items)))
        }
    }

    #[tokio::test]
    async fn test_complete_concatenates_and_trims() {
        let model = Scripted(vec!["\n Hello", " world", " \n"], false);
        assert_eq!(complete(&model, "p").await.unwrap(), "Hello world");
    }

    #[tokio::test]
    async fn test_mid_stream_error_discards_answer() {
        let model = Scripted(vec!["partial"], true);
        assert!(matches!(
            complete(&model, "p").await,
            Err(RagError::GenerationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_generation_failure() {
        let config = GenerationConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let model = OllamaGenerator::new(&config).unwrap();
        assert!(matches!(
            model.stream("p").await.err(),
            Some(RagError::GenerationFailed(_))
        ));
    }
}
