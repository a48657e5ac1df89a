//! Allure report API client.
//!
//! Fetches the aggregated test cases of one report:
//! `GET {api_url}/report/{id}/test-cases/aggregate`. A response body that is
//! not valid JSON is saved to `$TMPDIR/{id}_invalid_allure_response.txt` for
//! inspection.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::chunk_files::{check_path_component, safe_file_name};
use crate::config::AllureConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("allure api is not configured (allure.api_url)")]
    NotConfigured,

    #[error("{0}")]
    InvalidReportId(String),

    #[error("failed to fetch report: {0}")]
    Request(String),

    /// The API answered, but not with JSON. The raw body was saved to `saved_to`.
    #[error("invalid JSON from allure (see {})", saved_to.display())]
    InvalidJson { saved_to: PathBuf },
}

/// Where reports come from.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_report(&self, report_id: &str) -> Result<serde_json::Value, FetchError>;
}

enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: Option<String> },
}

pub struct AllureClient {
    api_url: Option<String>,
    auth: Auth,
    client: reqwest::Client,
}

impl AllureClient {
    pub fn new(config: &AllureConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let auth = match (&config.token, &config.username) {
            (Some(token), _) => Auth::Bearer(token.clone()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Auth::None,
        };

        Ok(Self {
            api_url: config
                .api_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            auth,
            client,
        })
    }

    pub fn report_url(&self, report_id: &str) -> Option<String> {
        self.api_url
            .as_ref()
            .map(|base| format!("{}/report/{}/test-cases/aggregate", base, report_id))
    }
}

fn invalid_response_path(report_id: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "{}_invalid_allure_response.txt",
        safe_file_name(report_id)
    ))
}

/// Parse a report body, saving it to disk when it is not JSON.
pub fn parse_report_body(report_id: &str, body: &str) -> Result<serde_json::Value, FetchError> {
    serde_json::from_str(body).map_err(|e| {
        let saved_to = invalid_response_path(report_id);
        match std::fs::write(&saved_to, body) {
            Ok(()) => tracing::error!(
                report_id,
                path = %saved_to.display(),
                error = %e,
                "allure returned invalid JSON, raw response saved"
            ),
            Err(write_err) => tracing::error!(
                report_id,
                error = %write_err,
                "failed to save invalid allure response"
            ),
        }
        FetchError::InvalidJson { saved_to }
    })
}

#[async_trait]
impl ReportSource for AllureClient {
    async fn fetch_report(&self, report_id: &str) -> Result<serde_json::Value, FetchError> {
        check_path_component("report id", report_id, false)
            .map_err(|e| FetchError::InvalidReportId(e.to_string()))?;
        let url = self.report_url(report_id).ok_or(FetchError::NotConfigured)?;

        let mut request = self.client.get(&url);
        request = match &self.auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
        };

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        tracing::info!(report_id, bytes = body.len(), "fetched report from allure");
        parse_report_body(report_id, &body)
    }
}
