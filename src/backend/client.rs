//! HTTP client for the report backend.
//!
//! Fetches chat-flow steps, resolves choices, runs the INK2 tax recalculation,
//! syncs approved tax into the statements, and uploads SIE exports. Each call
//! is a single attempt: failures are returned to the orchestrator, which
//! reports them once in the chat.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::config::ApiConfig;
use super::errors::BackendError;
use super::types::{
    ChatStep, ChoiceOutcome, ChoiceRequest, RecalculateRequest, RecalculateResponse,
    TaxSyncRequest, TaxSyncResponse, UploadFile,
};

// ─── FlowBackend ─────────────────────────────────────────────────────────────

/// The backend operations the chat flow and ingestion depend on.
///
/// [`BackendClient`] is the production implementation; tests substitute a
/// scripted double.
#[allow(async_fn_in_trait)]
pub trait FlowBackend {
    /// `GET step/{n}`.
    async fn fetch_step(&self, step_number: u32) -> Result<ChatStep, BackendError>;

    /// `POST process-choice`.
    async fn process_choice(&self, request: &ChoiceRequest) -> Result<ChoiceOutcome, BackendError>;

    /// `POST recalculate-tax`.
    async fn recalculate_tax(
        &self,
        request: &RecalculateRequest,
    ) -> Result<RecalculateResponse, BackendError>;

    /// `POST update-tax-in-financial-data`.
    async fn update_tax_in_financial_data(
        &self,
        request: &TaxSyncRequest,
    ) -> Result<TaxSyncResponse, BackendError>;

    /// Upload one or two SIE exports; returns the parser's raw JSON.
    async fn upload_files(&self, files: &[UploadFile]) -> Result<serde_json::Value, BackendError>;
}

// ─── BackendClient ───────────────────────────────────────────────────────────

/// reqwest-backed [`FlowBackend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpClient,
    base_url: String,
}

impl BackendClient {
    /// Build a client from the `api` config section.
    ///
    /// Does NOT check connectivity; the first request does.
    pub fn from_config(config: &ApiConfig) -> Result<Self, BackendError> {
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| BackendError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.url(path);
        tracing::debug!(url = %url, method = "GET", "backend request");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode(&url, response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.url(path);
        tracing::debug!(url = %url, method = "POST", "backend request");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode(&url, response).await
    }
}

impl FlowBackend for BackendClient {
    async fn fetch_step(&self, step_number: u32) -> Result<ChatStep, BackendError> {
        self.get_json(&format!("chat-flow/step/{step_number}")).await
    }

    async fn process_choice(&self, request: &ChoiceRequest) -> Result<ChoiceOutcome, BackendError> {
        self.post_json("chat-flow/process-choice", request).await
    }

    async fn recalculate_tax(
        &self,
        request: &RecalculateRequest,
    ) -> Result<RecalculateResponse, BackendError> {
        tracing::info!(
            manual_count = request.manual_amounts.len(),
            hint_count = request.hints.len(),
            "requesting INK2 recalculation"
        );
        self.post_json("recalculate-tax", request).await
    }

    async fn update_tax_in_financial_data(
        &self,
        request: &TaxSyncRequest,
    ) -> Result<TaxSyncResponse, BackendError> {
        self.post_json("update-tax-in-financial-data", request).await
    }

    async fn upload_files(&self, files: &[UploadFile]) -> Result<serde_json::Value, BackendError> {
        let (path, form) = match files {
            [single] => ("upload-se-file", Form::new().part("file", file_part(single))),
            many => {
                let form = many.iter().fold(Form::new(), |form, f| {
                    form.part(f.role.field_name(), file_part(f))
                });
                ("upload-two-se-files", form)
            }
        };
        let url = self.url(path);
        tracing::info!(url = %url, file_count = files.len(), "uploading SIE files");

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode(&url, response).await
    }
}

fn file_part(file: &UploadFile) -> Part {
    Part::bytes(file.bytes.clone()).file_name(file.file_name.clone())
}

/// Map a reqwest send error onto [`BackendError`].
fn transport_error(url: &str, e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout {
            endpoint: url.to_string(),
        }
    } else {
        BackendError::ConnectionFailed {
            endpoint: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Check the status, then decode the JSON body.
async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(url = %url, status = status.as_u16(), "backend returned error status");
        return Err(BackendError::HttpError {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await.map_err(|e| BackendError::DecodeError {
        endpoint: url.to_string(),
        reason: format!("failed to read response body: {e}"),
    })?;

    serde_json::from_str(&body).map_err(|e| BackendError::DecodeError {
        endpoint: url.to_string(),
        reason: e.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
