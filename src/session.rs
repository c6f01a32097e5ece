//! Parsing session controller.
//!
//! One `ParsingSession` drives one document parse at a time:
//! `Idle → Submitting → Polling → (Succeeded | Failed | Stopped)`.
//! Starting while a run is active toggles into a stop (the UI's start button
//! doubles as a stop button). Every run carries a generation number; state
//! mutations from a superseded or stopped run are discarded, so two quick
//! starts can never interleave timers and an in-flight response after a stop
//! is ignored.

use crate::api::PipelineApi;
use crate::config::ClientConfig;
use crate::document::{DocumentDetails, DocumentStatistics, DocumentSummary, ParseMode};
use crate::normalize::{normalize, NormalizeContext};
use crate::poller::{JobPoller, PollHandle, PollObserver, PollOptions, PollOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    /// Manually stopped. Not an error; the backend job may keep running.
    Stopped,
}

/// Point-in-time view of the session for display.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub progress: u8,
    pub status_text: String,
    pub details: Option<DocumentDetails>,
    pub statistics: Option<DocumentStatistics>,
}

/// Side effects the controller triggers on behalf of its surroundings.
///
/// Parsing produces server-side metadata (custom display names, statistics)
/// that only becomes visible through a document-list refresh; the hooks let
/// the embedding UI react without the controller knowing about it.
#[async_trait::async_trait]
pub trait SessionHooks: Send + Sync {
    async fn on_documents_changed(&self) {}
    async fn on_statistics(&self, _statistics: &DocumentStatistics) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

#[async_trait::async_trait]
impl SessionHooks for NoHooks {}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    progress: u8,
    status_text: String,
    details: Option<DocumentDetails>,
    statistics: Option<DocumentStatistics>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            progress: 0,
            status_text: String::new(),
            details: None,
            statistics: None,
        }
    }
}

/// Controller for one document's parse runs.
pub struct ParsingSession<A: ?Sized, H: ?Sized = NoHooks> {
    api: Arc<A>,
    hooks: Arc<H>,
    config: ClientConfig,
    poll_options: PollOptions,
    inner: RwLock<SessionInner>,
    handle: Mutex<Option<PollHandle>>,
    generation: AtomicU64,
}

impl<A> ParsingSession<A>
where
    A: PipelineApi + ?Sized + 'static,
{
    pub fn new(api: Arc<A>, config: ClientConfig) -> Arc<Self> {
        Self::with_hooks(api, Arc::new(NoHooks), config)
    }
}

impl<A, H> ParsingSession<A, H>
where
    A: PipelineApi + ?Sized + 'static,
    H: SessionHooks + ?Sized + 'static,
{
    pub fn with_hooks(api: Arc<A>, hooks: Arc<H>, config: ClientConfig) -> Arc<Self> {
        let poll_options = PollOptions {
            interval: config.poll_interval(),
            ..PollOptions::default()
        };
        Arc::new(Self {
            api,
            hooks,
            config,
            poll_options,
            inner: RwLock::new(SessionInner::new()),
            handle: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().unwrap();
        SessionSnapshot {
            state: inner.state,
            progress: inner.progress,
            status_text: inner.status_text.clone(),
            details: inner.details.clone(),
            statistics: inner.statistics.clone(),
        }
    }

    /// Whether a run is currently submitting or polling.
    pub fn is_running(&self) -> bool {
        matches!(
            self.inner.read().unwrap().state,
            SessionState::Submitting | SessionState::Polling
        )
    }

    /// Start a parse run for `doc`, or stop the active one (toggle).
    ///
    /// Displayed content is cleared immediately so a new run never shows the
    /// previous run's results.
    pub async fn start(self: &Arc<Self>, doc: &DocumentSummary, mode: ParseMode) {
        if self.is_running() {
            self.stop();
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.write().unwrap();
            inner.state = SessionState::Submitting;
            inner.progress = 0;
            inner.status_text = match mode {
                ParseMode::Smart => "checking whether the document was already parsed...",
                ParseMode::Plain => "submitting parse job...",
            }
            .to_string();
            inner.details = Some(DocumentDetails::default());
        }

        let file_name = doc.file_name().to_string();
        let started = Instant::now();
        match self.api.submit_parse(mode, &doc.id, &file_name).await {
            Ok(query_id) => {
                // Staleness check, state write, and handle install form one
                // critical section against `stop`: a stop landing after the
                // check but before the install would otherwise take an empty
                // handle slot and leave the fresh poller running orphaned.
                let mut handle_slot = self.handle.lock().unwrap();
                if self.generation.load(Ordering::SeqCst) != generation {
                    // Stopped or restarted while the submit was in flight.
                    return;
                }
                info!(doc_id = %doc.id, %query_id, "parse job submitted");
                {
                    let mut inner = self.inner.write().unwrap();
                    inner.state = SessionState::Polling;
                    inner.status_text = format!("job submitted, id: {}", query_id);
                }
                let observer: Arc<dyn PollObserver> = Arc::new(RunObserver {
                    session: Arc::clone(self),
                    generation,
                    doc: doc.clone(),
                    file_name,
                    started,
                });
                // Replacing a previous handle drops it, which stops its timer.
                *handle_slot = Some(JobPoller::spawn(
                    Arc::clone(&self.api),
                    query_id,
                    self.poll_options.clone(),
                    observer,
                ));
            }
            Err(err) => {
                let _handle_slot = self.handle.lock().unwrap();
                if self.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                warn!(doc_id = %doc.id, error = %err, "parse submit failed");
                let mut inner = self.inner.write().unwrap();
                inner.state = SessionState::Failed;
                inner.status_text = format!("submit failed: {}", err);
            }
        }
    }

    /// Stop the active run. The poll timer is cleared deterministically; the
    /// backend job is not cancelled server-side.
    pub fn stop(&self) {
        // Mirror of the critical section in `start`: bumping the generation
        // and taking the handle under the same lock means a concurrently
        // resolving submit either observes the bump or has already handed
        // over its handle.
        let mut handle_slot = self.handle.lock().unwrap();
        // Invalidate any callback still in flight for the current run.
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = handle_slot.take() {
            handle.stop();
        }
        let mut inner = self.inner.write().unwrap();
        if matches!(
            inner.state,
            SessionState::Submitting | SessionState::Polling
        ) {
            inner.state = SessionState::Stopped;
            inner.status_text = "parsing stopped by user".to_string();
            info!("parse run stopped by user");
        }
    }
}

/// Observer for one run, pinned to the generation it was started under.
struct RunObserver<A: ?Sized, H: ?Sized> {
    session: Arc<ParsingSession<A, H>>,
    generation: u64,
    doc: DocumentSummary,
    file_name: String,
    started: Instant,
}

impl<A, H> RunObserver<A, H>
where
    A: PipelineApi + ?Sized + 'static,
    H: SessionHooks + ?Sized + 'static,
{
    fn is_stale(&self) -> bool {
        self.session.generation.load(Ordering::SeqCst) != self.generation
    }

    async fn complete(&self) {
        let session = &self.session;
        {
            let mut inner = session.inner.write().unwrap();
            inner.progress = 100;
            inner.status_text = "parse finished, fetching result...".to_string();
        }
        let elapsed_secs = self.started.elapsed().as_secs();

        match session.api.fetch_result(&self.doc.id, &self.file_name).await {
            Ok(blocks) => {
                if self.is_stale() {
                    return;
                }
                let ctx = NormalizeContext::for_document(&session.config, &self.doc);
                let details = normalize(&blocks, &ctx);
                info!(
                    doc_id = %self.doc.id,
                    text = details.text.len(),
                    tables = details.tables.len(),
                    images = details.images.len(),
                    elapsed_secs,
                    "parse result loaded"
                );
                {
                    let mut inner = session.inner.write().unwrap();
                    inner.state = SessionState::Succeeded;
                    inner.status_text = "parse succeeded, content loaded".to_string();
                    inner.details = Some(details);
                }
                // Parsing may have produced new document metadata server-side.
                session.hooks.on_documents_changed().await;
                self.push_statistics(elapsed_secs).await;
            }
            Err(err) => {
                if self.is_stale() {
                    return;
                }
                // Distinct from a parse failure: the job succeeded but the
                // payload is unavailable. Details stay unset.
                warn!(doc_id = %self.doc.id, error = %err, "result fetch failed after success");
                let mut inner = session.inner.write().unwrap();
                inner.state = SessionState::Failed;
                inner.status_text = format!("parse succeeded but the result could not be fetched: {}", err);
            }
        }
    }

    /// Patch the freshly parsed document's statistics with the measured
    /// processing time and hand them to the embedding UI. Best-effort.
    async fn push_statistics(&self, elapsed_secs: u64) {
        let session = &self.session;
        match session.api.list_documents().await {
            Ok(documents) => {
                let statistics = documents
                    .into_iter()
                    .find(|d| d.id == self.doc.id)
                    .and_then(|d| d.statistics);
                if let Some(mut statistics) = statistics {
                    statistics.processing_time_seconds = Some(elapsed_secs);
                    if self.is_stale() {
                        return;
                    }
                    session.inner.write().unwrap().statistics = Some(statistics.clone());
                    session.hooks.on_statistics(&statistics).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "could not refresh processing-time statistics");
            }
        }
    }
}

#[async_trait::async_trait]
impl<A, H> PollObserver for RunObserver<A, H>
where
    A: PipelineApi + ?Sized + 'static,
    H: SessionHooks + ?Sized + 'static,
{
    async fn on_progress(&self, percent: u8, message: Option<&str>) {
        if self.is_stale() {
            return;
        }
        let mut inner = self.session.inner.write().unwrap();
        if inner.state != SessionState::Polling {
            return;
        }
        // Last-write-wins; the backend does not guarantee monotonic percent.
        inner.progress = percent;
        inner.status_text = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("processing {}%", percent));
    }

    async fn on_terminal(&self, outcome: PollOutcome) {
        if self.is_stale() {
            return;
        }
        match outcome {
            PollOutcome::Succeeded => self.complete().await,
            PollOutcome::Failed { message } => {
                // Previously displayed content is not cleared on failure.
                let mut inner = self.session.inner.write().unwrap();
                inner.state = SessionState::Failed;
                inner.status_text = format!("parse failed: {}", message);
            }
            PollOutcome::TimedOut { attempts } => {
                let mut inner = self.session.inner.write().unwrap();
                inner.state = SessionState::Failed;
                inner.status_text =
                    format!("parse timed out after {} status checks", attempts);
            }
        }
    }
}
