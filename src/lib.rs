//! Client library for a document-processing pipeline backend.
//!
//! The backend converts uploaded office documents and PDFs through an OCR
//! pipeline, exposing the work as long-running jobs over a small HTTP API.
//! This crate wraps that API and implements the client-side machinery around
//! it:
//!
//! - [`api::ApiClient`] — typed facade over the HTTP endpoints (upload, OCR
//!   trigger, parse submission, status, result, document list, export,
//!   proxies).
//! - [`poller::JobPoller`] — fixed-interval status polling with deterministic
//!   cancellation and a bounded attempt budget.
//! - [`normalize`] — turns raw result blocks, whose type and storage location
//!   are encoded in marker strings inside the content, into typed text,
//!   table, and image entries with resolvable URLs.
//! - [`session::ParsingSession`] — the per-document state machine tying the
//!   above together: submit, poll, fetch, normalize, publish.
//! - [`upload::UploadFlow`] — upload, trigger conversion, wait until the
//!   converted document is ready.
//!
//! ```no_run
//! use doc_pipeline_client::api::{ApiClient, PipelineApi};
//! use doc_pipeline_client::config::ClientConfig;
//! use doc_pipeline_client::document::ParseMode;
//! use doc_pipeline_client::session::ParsingSession;
//! use std::sync::Arc;
//!
//! # async fn run() -> doc_pipeline_client::error::Result<()> {
//! let config = ClientConfig::from_env();
//! let api = Arc::new(ApiClient::new(config.clone()));
//! let session = ParsingSession::new(api.clone(), config);
//!
//! let documents = api.list_documents().await?;
//! if let Some(doc) = documents.first() {
//!     session.start(doc, ParseMode::Smart).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod marker;
pub mod normalize;
pub mod poller;
pub mod session;
pub mod upload;

pub use api::{ApiClient, PipelineApi, UploadApi};
pub use config::ClientConfig;
pub use document::{DocumentDetails, DocumentSummary, ParseMode};
pub use error::{PipelineError, Result};
pub use poller::{JobPoller, PollHandle, PollObserver, PollOutcome};
pub use session::{ParsingSession, SessionHooks, SessionSnapshot, SessionState};
pub use upload::UploadFlow;
