//! Delivery of finished analyses.
//!
//! The receiving service expects a single-element list:
//! `[{"rule": "auto-analysis", "message": "<summary><br><br><analysis>"}]`
//! posted to `{analysis_url}/api/analysis/report/{report_id}`. Delivery is
//! best effort; nothing is retried or deduplicated.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

pub const ANALYSIS_RULE: &str = "auto-analysis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisMessage {
    pub rule: String,
    pub message: String,
}

impl AnalysisMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            rule: ANALYSIS_RULE.to_string(),
            message: message.into(),
        }
    }
}

/// Combine the report summary with the generated analysis.
pub fn combine_message(summary: &str, analysis: &str) -> String {
    if summary.is_empty() {
        analysis.to_string()
    } else {
        format!("{}<br><br>{}", summary, analysis)
    }
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, report_id: &str, message: &str) -> Result<()>;
}

/// Posts analyses to the reporting service.
pub struct HttpSink {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self, report_id: &str) -> String {
        format!("{}/api/analysis/report/{}", self.base_url, report_id)
    }
}

#[async_trait]
impl ResultSink for HttpSink {
    async fn deliver(&self, report_id: &str, message: &str) -> Result<()> {
        let url = self.endpoint(report_id);
        let body = vec![AnalysisMessage::new(message)];

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("analysis sink returned {}: {}", status, text);
        }
        tracing::info!(report_id, %url, "analysis delivered");
        Ok(())
    }
}

/// Used when no `allure.analysis_url` is configured: the analysis is only logged.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn deliver(&self, report_id: &str, message: &str) -> Result<()> {
        tracing::info!(report_id, chars = message.chars().count(), "no analysis sink configured, analysis not delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let body = vec![AnalysisMessage::new("sum<br><br>text")];
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!([{"rule": "auto-analysis", "message": "sum<br><br>text"}])
        );
    }

    #[test]
    fn test_combine_message() {
        assert_eq!(combine_message("s", "a"), "s<br><br>a");
        assert_eq!(combine_message("", "a"), "a");
    }

    #[test]
    fn test_endpoint() {
        let sink = HttpSink::new("http://reports:8080/", 5).unwrap();
        assert_eq!(sink.endpoint("r1"), "http://reports:8080/api/analysis/report/r1");
    }
}
