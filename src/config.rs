//! Client configuration, read from environment variables with sane defaults.

use std::time::Duration;

/// Default poll cadence for parse jobs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Slower cadence when the large-model OCR path is active (jobs take longer).
pub const LARGE_MODEL_POLL_INTERVAL: Duration = Duration::from_secs(4);
/// Uniform attempt budget for parse-job polling (~30 min at the default cadence).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 900;

/// Where the backend stores pipeline outputs, as seen by the proxy endpoints.
pub const DEFAULT_STORAGE_ROOT: &str = "/my-doc-system-uploads";

/// Connection settings for the pipeline API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the dashboard API, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Tenant identifier sent as `agentUserId` on every request.
    pub agent_user_id: String,
    /// Storage root prefix used when building proxy paths.
    pub storage_root: String,
    /// Route OCR to the large-model service and poll at the slower cadence.
    pub use_large_model: bool,
}

impl ClientConfig {
    /// Read configuration from the environment (`.env` is loaded if present).
    ///
    /// - `DOC_PIPELINE_BASE_URL` (default `http://localhost:3000`)
    /// - `DOC_PIPELINE_AGENT_USER_ID` (default `123`, matching the backend's
    ///   fallback tenant)
    /// - `DOC_PIPELINE_STORAGE_ROOT` (default `/my-doc-system-uploads`)
    /// - `DOC_PIPELINE_USE_LARGE_MODEL` (`1`/`true` to enable)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("DOC_PIPELINE_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let agent_user_id =
            std::env::var("DOC_PIPELINE_AGENT_USER_ID").unwrap_or_else(|_| "123".to_string());
        let storage_root = std::env::var("DOC_PIPELINE_STORAGE_ROOT")
            .unwrap_or_else(|_| DEFAULT_STORAGE_ROOT.to_string());
        let use_large_model = std::env::var("DOC_PIPELINE_USE_LARGE_MODEL")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        tracing::info!(%base_url, %agent_user_id, use_large_model, "pipeline client configured");

        Self {
            base_url,
            agent_user_id,
            storage_root,
            use_large_model,
        }
    }

    /// Poll interval appropriate for the configured OCR path.
    pub fn poll_interval(&self) -> Duration {
        if self.use_large_model {
            LARGE_MODEL_POLL_INTERVAL
        } else {
            DEFAULT_POLL_INTERVAL
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            agent_user_id: "123".to_string(),
            storage_root: DEFAULT_STORAGE_ROOT.to_string(),
            use_large_model: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_tracks_model_choice() {
        let mut config = ClientConfig::default();
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        config.use_large_model = true;
        assert_eq!(config.poll_interval(), LARGE_MODEL_POLL_INTERVAL);
    }
}
