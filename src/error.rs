//! Error taxonomy for the pipeline client.
//!
//! Transport failures, backend-reported failures, and decode failures are
//! kept distinct so callers can tell "the network dropped" from "the job
//! failed". User cancellation is a session state, not an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network-level failure: connection refused, timeout, non-JSON body, etc.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with `ok: false` (or a terminal `failed`/`error`
    /// job status) and this message.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// The body was valid JSON but not the shape we expected.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A bounded poll loop exhausted its attempt budget without reaching a
    /// terminal status.
    #[error("timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },
}

impl PipelineError {
    /// Backend-reported failure with a fallback when the envelope carried
    /// no message.
    pub fn backend(message: Option<String>) -> Self {
        Self::Backend {
            message: message.unwrap_or_else(|| "request rejected by backend".to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
