//! Upload-and-convert flow.
//!
//! Getting a document into the system is three steps: upload the raw file,
//! trigger OCR conversion, then poll `/api/onlyoffice-docurl` until the
//! converted document exists on disk. Conversion takes a few seconds, so the
//! readiness poll is bounded rather than open-ended.

use crate::api::{DocReadiness, OcrRequest, ReadyDocument, UploadApi};
use crate::config::ClientConfig;
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounds for the document-readiness poll after OCR is triggered.
#[derive(Debug, Clone)]
pub struct DocPollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for DocPollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 30,
        }
    }
}

/// Runs the upload → OCR → wait-until-ready sequence.
pub struct UploadFlow<A: ?Sized> {
    api: Arc<A>,
    config: ClientConfig,
    options: DocPollOptions,
}

impl<A> UploadFlow<A>
where
    A: UploadApi + ?Sized,
{
    pub fn new(api: Arc<A>, config: ClientConfig) -> Self {
        Self {
            api,
            config,
            options: DocPollOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DocPollOptions) -> Self {
        self.options = options;
        self
    }

    /// Upload `bytes`, trigger OCR with an optional extraction prompt, and
    /// wait for the converted document to become available.
    pub async fn run(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        prompt: Option<String>,
    ) -> Result<ReadyDocument> {
        let receipt = self
            .api
            .upload(file_name, bytes, self.config.use_large_model)
            .await?;
        info!(task_id = %receipt.task_id, file = %receipt.file_name, "file uploaded");

        let request = OcrRequest::for_upload(&self.config, &receipt, prompt);
        self.api.trigger_ocr(&request).await?;
        info!(task_id = %receipt.task_id, "ocr conversion triggered");

        self.wait_for_document(&receipt.task_id, &receipt.file_name)
            .await
    }

    /// Poll until the converted document is ready.
    ///
    /// "Still processing" answers and transport errors are both retried; a
    /// backend error means the conversion itself failed and is returned
    /// immediately.
    pub async fn wait_for_document(
        &self,
        task_id: &str,
        file_name: &str,
    ) -> Result<ReadyDocument> {
        for attempt in 1..=self.options.max_attempts {
            match self.api.document_ready(task_id, file_name).await {
                Ok(DocReadiness::Ready(document)) => {
                    info!(task_id, attempt, "converted document ready");
                    return Ok(document);
                }
                Ok(DocReadiness::Processing { message }) => {
                    debug!(task_id, attempt, message = message.as_deref(), "still converting");
                }
                Err(err @ PipelineError::Backend { .. }) => return Err(err),
                Err(err) => {
                    warn!(task_id, attempt, error = %err, "readiness check failed, retrying");
                }
            }
            if attempt < self.options.max_attempts {
                tokio::time::sleep(self.options.interval).await;
            }
        }
        Err(PipelineError::Timeout {
            attempts: self.options.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UploadReceipt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockUploadApi {
        /// Scripted `document_ready` answers, consumed front to back. When
        /// exhausted, keeps answering Processing.
        readiness: Mutex<Vec<Result<DocReadiness>>>,
        ready_calls: AtomicU32,
        uploaded: Mutex<Option<(String, usize)>>,
        ocr_requests: Mutex<Vec<OcrRequest>>,
    }

    impl MockUploadApi {
        fn new(readiness: Vec<Result<DocReadiness>>) -> Arc<Self> {
            let mut readiness = readiness;
            readiness.reverse();
            Arc::new(Self {
                readiness: Mutex::new(readiness),
                ready_calls: AtomicU32::new(0),
                uploaded: Mutex::new(None),
                ocr_requests: Mutex::new(Vec::new()),
            })
        }
    }

    fn ready(doc_name: &str) -> Result<DocReadiness> {
        Ok(DocReadiness::Ready(ReadyDocument {
            doc_url: format!("http://localhost:3000/api/file-proxy?path=save/{}", doc_name),
            doc_name: doc_name.to_string(),
            callback_url: None,
        }))
    }

    fn processing() -> Result<DocReadiness> {
        Ok(DocReadiness::Processing {
            message: Some("converting".to_string()),
        })
    }

    #[async_trait::async_trait]
    impl UploadApi for MockUploadApi {
        async fn upload(
            &self,
            file_name: &str,
            bytes: Vec<u8>,
            _use_large_model: bool,
        ) -> Result<UploadReceipt> {
            *self.uploaded.lock().unwrap() = Some((file_name.to_string(), bytes.len()));
            Ok(UploadReceipt {
                task_id: "t1".to_string(),
                file_name: file_name.to_string(),
                local_url: format!("/upload/{}", file_name),
            })
        }

        async fn trigger_ocr(&self, request: &OcrRequest) -> Result<()> {
            self.ocr_requests.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn document_ready(&self, _task_id: &str, _file_name: &str) -> Result<DocReadiness> {
            self.ready_calls.fetch_add(1, Ordering::SeqCst);
            self.readiness.lock().unwrap().pop().unwrap_or_else(processing)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_uploads_triggers_ocr_and_waits() {
        let api = MockUploadApi::new(vec![processing(), processing(), ready("report_res.docx")]);
        let flow = UploadFlow::new(Arc::clone(&api), ClientConfig::default());

        let document = flow
            .run("report.pdf", vec![0u8; 64], Some("extract all tables".to_string()))
            .await
            .unwrap();
        assert_eq!(document.doc_name, "report_res.docx");

        let uploaded = api.uploaded.lock().unwrap().clone().unwrap();
        assert_eq!(uploaded, ("report.pdf".to_string(), 64));

        let requests = api.ocr_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].task_id, "t1");
        assert_eq!(requests[0].input_file_path, "/my-doc-system-uploads/upload");
        assert_eq!(requests[0].output_file_path, "/my-doc-system-uploads/save");
        assert_eq!(requests[0].prompt.as_deref(), Some("extract all tables"));

        assert_eq!(api.ready_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_are_retried() {
        let api = MockUploadApi::new(vec![
            Err(PipelineError::Timeout { attempts: 1 }),
            ready("a_res.docx"),
        ]);
        let flow = UploadFlow::new(Arc::clone(&api), ClientConfig::default());

        let document = flow.wait_for_document("t1", "a.pdf").await.unwrap();
        assert_eq!(document.doc_name, "a_res.docx");
        assert_eq!(api.ready_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_aborts_immediately() {
        let api = MockUploadApi::new(vec![
            processing(),
            Err(PipelineError::Backend {
                message: "conversion failed".to_string(),
            }),
        ]);
        let flow = UploadFlow::new(Arc::clone(&api), ClientConfig::default());

        let err = flow.wait_for_document("t1", "a.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::Backend { .. }));
        assert_eq!(api.ready_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_poll_is_bounded() {
        let api = MockUploadApi::new(vec![]);
        let flow = UploadFlow::new(Arc::clone(&api), ClientConfig::default()).with_options(
            DocPollOptions {
                interval: Duration::from_secs(3),
                max_attempts: 5,
            },
        );

        let err = flow.wait_for_document("t1", "a.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { attempts: 5 }));
        assert_eq!(api.ready_calls.load(Ordering::SeqCst), 5);
    }
}
