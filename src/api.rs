//! HTTP facade over the document-pipeline backend.
//!
//! Every endpoint answers a JSON envelope `{ ok: boolean, message?, ... }`;
//! `ok: false` is mapped to [`PipelineError::Backend`] so callers never see
//! the envelope. The [`PipelineApi`] and [`UploadApi`] traits are the seams
//! the session controller, the upload flow, and the tests consume.

use crate::config::ClientConfig;
use crate::document::{DocumentStatistics, DocumentSummary, ParseMode, ResultBlock};
use crate::error::{PipelineError, Result};
use crate::poller::{JobState, JobStatus, StatusSource};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Parse-side backend operations.
#[async_trait::async_trait]
pub trait PipelineApi: StatusSource {
    /// Submit a parse job, returning the backend's query id.
    async fn submit_parse(&self, mode: ParseMode, task_id: &str, file_name: &str)
        -> Result<String>;
    /// Fetch the raw block payload after a job reported success.
    async fn fetch_result(&self, task_id: &str, file_name: &str) -> Result<Vec<ResultBlock>>;
    /// List all documents for the configured tenant.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;
    /// Fetch processing statistics for one document.
    async fn statistics(&self, task_id: &str, file_name: &str) -> Result<DocumentStatistics>;
}

/// Upload-side backend operations.
#[async_trait::async_trait]
pub trait UploadApi: Send + Sync {
    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        use_large_model: bool,
    ) -> Result<UploadReceipt>;
    async fn trigger_ocr(&self, request: &OcrRequest) -> Result<()>;
    /// Check whether the processed document is ready for viewing.
    async fn document_ready(&self, task_id: &str, file_name: &str) -> Result<DocReadiness>;
}

/// Outcome of `/api/upload`.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub task_id: String,
    pub file_name: String,
    pub local_url: String,
}

/// Body of `/api/ocr`.
#[derive(Debug, Clone, Serialize)]
pub struct OcrRequest {
    pub task_id: String,
    #[serde(rename = "agentUserId")]
    pub agent_user_id: String,
    pub file_name: String,
    pub input_file_path: String,
    pub output_file_path: String,
    pub use_large_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl OcrRequest {
    /// OCR trigger for a fresh upload, with storage paths derived from the
    /// configured storage root.
    pub fn for_upload(
        config: &ClientConfig,
        receipt: &UploadReceipt,
        prompt: Option<String>,
    ) -> Self {
        Self {
            task_id: receipt.task_id.clone(),
            agent_user_id: config.agent_user_id.clone(),
            file_name: receipt.file_name.clone(),
            input_file_path: format!("{}/upload", config.storage_root),
            output_file_path: format!("{}/save", config.storage_root),
            use_large_model: config.use_large_model,
            prompt,
        }
    }
}

/// Readiness of the processed document on `/api/onlyoffice-docurl`.
#[derive(Debug, Clone)]
pub enum DocReadiness {
    Ready(ReadyDocument),
    Processing { message: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ReadyDocument {
    pub doc_url: String,
    pub doc_name: String,
    pub callback_url: Option<String>,
}

/// Export formats accepted by `/api/document/export`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Word,
    Excel,
    Json,
    Markdown,
}

/// Body of `/api/document/export`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest {
    pub task_id: String,
    pub file_name: String,
    pub format: ExportFormat,
    pub content_types: Vec<String>,
    pub content: serde_json::Value,
}

// ── Wire types ──────────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

#[derive(Deserialize)]
struct AckResponse {
    ok: bool,
    message: Option<String>,
}

#[derive(Deserialize)]
struct RunResponse {
    ok: bool,
    message: Option<String>,
    query_id: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    ok: bool,
    message: Option<String>,
    status: Option<String>,
    percent: Option<i64>,
}

#[derive(Deserialize)]
struct ResultResponse {
    ok: bool,
    message: Option<String>,
    data: Option<Vec<ResultBlock>>,
}

#[derive(Deserialize)]
struct ListResponse {
    ok: bool,
    message: Option<String>,
    data: Option<Vec<DocumentSummary>>,
}

#[derive(Deserialize)]
struct StatisticsResponse {
    ok: bool,
    message: Option<String>,
    statistics: Option<DocumentStatistics>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default = "default_true")]
    ok: bool,
    message: Option<String>,
    #[serde(rename = "taskId")]
    task_id: Option<String>,
    #[serde(rename = "fileName")]
    file_name: Option<String>,
    #[serde(rename = "localUrl")]
    local_url: Option<String>,
}

#[derive(Deserialize)]
struct DocUrlResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    processing: bool,
    message: Option<String>,
    #[serde(rename = "docUrl")]
    doc_url: Option<String>,
    #[serde(rename = "docName")]
    doc_name: Option<String>,
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[derive(Deserialize)]
struct ExportResponse {
    ok: bool,
    message: Option<String>,
    data: Option<ExportData>,
}

#[derive(Deserialize)]
struct ExportData {
    #[serde(rename = "downloadUrl")]
    download_url: String,
}

/// Map a status envelope into a [`JobStatus`].
fn map_status(response: StatusResponse) -> Result<JobStatus> {
    if !response.ok {
        return Err(PipelineError::backend(response.message));
    }
    let state = match response.status.as_deref() {
        Some("success") => JobState::Succeeded,
        Some("failed") | Some("error") => JobState::Failed,
        _ => JobState::Running,
    };
    let percent = response.percent.unwrap_or(0).clamp(0, 100) as u8;
    Ok(JobStatus {
        state,
        percent,
        message: response.message,
    })
}

// ── Client ──────────────────────────────────────────────────────────────────

/// Reqwest-backed client for the pipeline API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Absolute URL serving stored image bytes through the proxy endpoint.
    pub fn image_proxy_url(&self, storage_path: &str) -> String {
        format!("{}?path={}", self.url("/api/image-proxy"), storage_path)
    }

    /// Absolute URL serving stored file bytes through the proxy endpoint.
    pub fn file_proxy_url(&self, storage_path: &str) -> String {
        format!("{}?path={}", self.url("/api/file-proxy"), storage_path)
    }

    /// Export selected content items, returning the download URL.
    pub async fn export(&self, request: &ExportRequest) -> Result<String> {
        let body = json!({
            "agentUserId": self.config.agent_user_id,
            "taskId": request.task_id,
            "fileName": request.file_name,
            "format": request.format,
            "contentTypes": request.content_types,
            "content": request.content,
        });
        let response = self
            .client
            .post(self.url("/api/document/export"))
            .json(&body)
            .send()
            .await?;
        let parsed: ExportResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        parsed
            .data
            .map(|d| d.download_url)
            .ok_or_else(|| PipelineError::backend(Some("export response missing downloadUrl".to_string())))
    }
}

/// Read a response body, surfacing non-2xx answers as backend errors while
/// preserving any envelope message they carry.
async fn parse_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("HTTP {}", status));
        return Err(PipelineError::Backend { message });
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait::async_trait]
impl StatusSource for ApiClient {
    async fn job_status(&self, query_id: &str) -> Result<JobStatus> {
        let response = self
            .client
            .get(self.url("/api/pipeline/status"))
            .query(&[("query_id", query_id)])
            .send()
            .await?;
        map_status(parse_envelope(response).await?)
    }
}

#[async_trait::async_trait]
impl PipelineApi for ApiClient {
    async fn submit_parse(
        &self,
        mode: ParseMode,
        task_id: &str,
        file_name: &str,
    ) -> Result<String> {
        let path = match mode {
            ParseMode::Smart => "/api/pipeline/run_check",
            ParseMode::Plain => "/api/pipeline/run",
        };
        info!(%task_id, %file_name, ?mode, "submitting parse job");
        let body = json!({
            "agentUserId": self.config.agent_user_id,
            "taskId": task_id,
            "fileName": file_name,
        });
        let response = self.client.post(self.url(path)).json(&body).send().await?;
        let parsed: RunResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        parsed
            .query_id
            .ok_or_else(|| PipelineError::backend(Some("run response missing query_id".to_string())))
    }

    async fn fetch_result(&self, task_id: &str, file_name: &str) -> Result<Vec<ResultBlock>> {
        let response = self
            .client
            .get(self.url("/api/pipeline/result"))
            .query(&[
                ("agentUserId", self.config.agent_user_id.as_str()),
                ("taskId", task_id),
                ("fileName", file_name),
            ])
            .send()
            .await?;
        let parsed: ResultResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        let blocks = parsed.data.unwrap_or_default();
        debug!(%task_id, count = blocks.len(), "fetched result payload");
        Ok(blocks)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let response = self
            .client
            .get(self.url("/api/document/list"))
            .query(&[("agentUserId", self.config.agent_user_id.as_str())])
            .send()
            .await?;
        let parsed: ListResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        Ok(parsed.data.unwrap_or_default())
    }

    async fn statistics(&self, task_id: &str, file_name: &str) -> Result<DocumentStatistics> {
        let body = json!({
            "agentUserId": self.config.agent_user_id,
            "taskId": task_id,
            "fileName": file_name,
        });
        let response = self
            .client
            .post(self.url("/api/pipeline/statistics"))
            .json(&body)
            .send()
            .await?;
        let parsed: StatisticsResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        Ok(parsed.statistics.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl UploadApi for ApiClient {
    async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        use_large_model: bool,
    ) -> Result<UploadReceipt> {
        info!(%file_name, size = bytes.len(), "uploading document");
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new()
            .part("file", part)
            .text("agentUserId", self.config.agent_user_id.clone())
            .text("useLargeModel", use_large_model.to_string());

        let response = self
            .client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        let parsed: UploadResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        Ok(UploadReceipt {
            task_id: parsed
                .task_id
                .ok_or_else(|| PipelineError::backend(Some("upload response missing taskId".to_string())))?,
            file_name: parsed.file_name.unwrap_or_else(|| file_name.to_string()),
            local_url: parsed.local_url.unwrap_or_default(),
        })
    }

    async fn trigger_ocr(&self, request: &OcrRequest) -> Result<()> {
        info!(task_id = %request.task_id, large_model = request.use_large_model, "triggering OCR");
        let response = self
            .client
            .post(self.url("/api/ocr"))
            .json(request)
            .send()
            .await?;
        let parsed: AckResponse = parse_envelope(response).await?;
        if !parsed.ok {
            return Err(PipelineError::backend(parsed.message));
        }
        Ok(())
    }

    async fn document_ready(&self, task_id: &str, file_name: &str) -> Result<DocReadiness> {
        let response = self
            .client
            .get(self.url("/api/onlyoffice-docurl"))
            .query(&[
                ("agentUserId", self.config.agent_user_id.as_str()),
                ("taskId", task_id),
                ("fileName", file_name),
            ])
            .send()
            .await?;
        let parsed: DocUrlResponse = parse_envelope(response).await?;
        if parsed.ok {
            return Ok(DocReadiness::Ready(ReadyDocument {
                doc_url: parsed.doc_url.unwrap_or_default(),
                doc_name: parsed
                    .doc_name
                    .unwrap_or_else(|| file_name.to_string()),
                callback_url: parsed.callback_url,
            }));
        }
        if parsed.processing {
            return Ok(DocReadiness::Processing {
                message: parsed.message,
            });
        }
        Err(PipelineError::backend(parsed.message))
    }
}
