//! Job polling: drive one pipeline job from submission to a terminal state.
//!
//! The poller owns its timer. A spawned task queries the status source once
//! per interval and reports through a [`PollObserver`]; the returned
//! [`PollHandle`] is the only way to cancel, and cancellation is
//! deterministic: once `stop()` returns, no further observer callback fires,
//! even from a status request that was in flight at that moment.

use crate::config::{DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Coarse job state derived from the backend's status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Any non-terminal status (`pending`, `processing`, ...).
    Running,
    /// `status == "success"`.
    Succeeded,
    /// `status == "failed"` or `"error"`.
    Failed,
}

/// One `/api/pipeline/status` answer.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    /// Progress percentage, clamped to 0–100. Not guaranteed monotonic by
    /// the backend; consumers apply last-write-wins.
    pub percent: u8,
    pub message: Option<String>,
}

impl JobStatus {
    pub fn running(percent: u8, message: impl Into<Option<String>>) -> Self {
        Self {
            state: JobState::Running,
            percent,
            message: message.into(),
        }
    }
}

/// Where the poller gets job status from. Implemented by the HTTP facade
/// and by mocks in tests.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    async fn job_status(&self, query_id: &str) -> Result<JobStatus>;
}

/// Terminal result of one polling run.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Succeeded,
    Failed { message: String },
    TimedOut { attempts: u32 },
}

/// Callbacks for one polling run. At most one `on_terminal` per run, and
/// none at all after the handle is stopped.
#[async_trait::async_trait]
pub trait PollObserver: Send + Sync {
    async fn on_progress(&self, percent: u8, message: Option<&str>);
    async fn on_terminal(&self, outcome: PollOutcome);
}

/// Polling cadence and attempt budget.
///
/// Every poll loop is bounded: a permanently stuck backend job terminates
/// with [`PollOutcome::TimedOut`] instead of polling forever.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

/// Handle owning one polling task. Dropping the handle stops the task.
pub struct PollHandle {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Cancel the run. No observer callback fires after this returns; an
    /// in-flight status request is abandoned.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.task.abort();
    }

    /// Whether the run is still polling (not stopped, not terminal).
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct JobPoller;

impl JobPoller {
    /// Start polling `query_id` on `source` until a terminal state, the
    /// attempt budget runs out, or the handle is stopped.
    ///
    /// Transport errors on a tick are logged and retried on the next tick;
    /// they are not terminal. Ticks are sequential: the next status request
    /// is not issued until the previous one resolved.
    pub fn spawn<S>(
        source: Arc<S>,
        query_id: impl Into<String>,
        options: PollOptions,
        observer: Arc<dyn PollObserver>,
    ) -> PollHandle
    where
        S: StatusSource + ?Sized + 'static,
    {
        let query_id = query_id.into();
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(options.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first interval tick completes immediately; consume it so
            // the first status request happens one interval after spawn.
            ticker.tick().await;

            let mut attempts = 0u32;
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                attempts += 1;

                match source.job_status(&query_id).await {
                    Ok(status) => {
                        // Stopped while the request was in flight: the
                        // response must not reach the observer.
                        if !flag.load(Ordering::SeqCst) {
                            return;
                        }
                        match status.state {
                            JobState::Succeeded => {
                                flag.store(false, Ordering::SeqCst);
                                observer.on_terminal(PollOutcome::Succeeded).await;
                                return;
                            }
                            JobState::Failed => {
                                flag.store(false, Ordering::SeqCst);
                                let message = status
                                    .message
                                    .unwrap_or_else(|| "job failed".to_string());
                                observer.on_terminal(PollOutcome::Failed { message }).await;
                                return;
                            }
                            JobState::Running => {
                                observer
                                    .on_progress(status.percent, status.message.as_deref())
                                    .await;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%query_id, attempt = attempts, error = %err, "status poll failed, retrying next tick");
                    }
                }

                if attempts >= options.max_attempts {
                    if !flag.load(Ordering::SeqCst) {
                        return;
                    }
                    flag.store(false, Ordering::SeqCst);
                    tracing::warn!(%query_id, attempts, "poll attempt budget exhausted");
                    observer.on_terminal(PollOutcome::TimedOut { attempts }).await;
                    return;
                }
            }
        });

        PollHandle { active, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<JobStatus>>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<JobStatus>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl StatusSource for ScriptedSource {
        async fn job_status(&self, _query_id: &str) -> Result<JobStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(JobStatus::running(99, None)))
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u8>>,
        terminals: Mutex<Vec<PollOutcome>>,
    }

    impl Recorder {
        fn progress_count(&self) -> usize {
            self.progress.lock().unwrap().len()
        }

        fn terminal_count(&self) -> usize {
            self.terminals.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl PollObserver for Recorder {
        async fn on_progress(&self, percent: u8, _message: Option<&str>) {
            self.progress.lock().unwrap().push(percent);
        }

        async fn on_terminal(&self, outcome: PollOutcome) {
            self.terminals.lock().unwrap().push(outcome);
        }
    }

    fn success() -> JobStatus {
        JobStatus {
            state: JobState::Succeeded,
            percent: 100,
            message: None,
        }
    }

    fn options(interval_secs: u64, max_attempts: u32) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(interval_secs),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_fires_exactly_once() {
        let source = ScriptedSource::new(vec![
            Ok(JobStatus::running(40, Some("working".to_string()))),
            Ok(success()),
        ]);
        let recorder = Arc::new(Recorder::default());
        let handle = JobPoller::spawn(
            Arc::clone(&source),
            "q1",
            options(2, 10),
            recorder.clone() as Arc<dyn PollObserver>,
        );

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(recorder.progress_count(), 1);
        assert_eq!(recorder.terminal_count(), 1);
        assert!(matches!(
            recorder.terminals.lock().unwrap()[0],
            PollOutcome::Succeeded
        ));
        // The loop exited after the terminal status; no further queries even
        // though plenty of intervals elapsed.
        assert_eq!(source.calls(), 2);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_carries_message() {
        let source = ScriptedSource::new(vec![Ok(JobStatus {
            state: JobState::Failed,
            percent: 0,
            message: Some("ocr worker crashed".to_string()),
        })]);
        let recorder = Arc::new(Recorder::default());
        let _handle = JobPoller::spawn(
            source,
            "q1",
            options(2, 10),
            recorder.clone() as Arc<dyn PollObserver>,
        );

        tokio::time::sleep(Duration::from_secs(10)).await;

        let terminals = recorder.terminals.lock().unwrap();
        assert_eq!(terminals.len(), 1);
        match &terminals[0] {
            PollOutcome::Failed { message } => assert_eq!(message, "ocr worker crashed"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried() {
        let source = ScriptedSource::new(vec![
            Err(PipelineError::Backend {
                message: "connection reset".to_string(),
            }),
            Ok(success()),
        ]);
        let recorder = Arc::new(Recorder::default());
        let _handle = JobPoller::spawn(
            Arc::clone(&source),
            "q1",
            options(2, 10),
            recorder.clone() as Arc<dyn PollObserver>,
        );

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(source.calls(), 2);
        assert_eq!(recorder.terminal_count(), 1);
        assert!(matches!(
            recorder.terminals.lock().unwrap()[0],
            PollOutcome::Succeeded
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_yields_timeout() {
        let source = ScriptedSource::new(vec![]);
        let recorder = Arc::new(Recorder::default());
        let _handle = JobPoller::spawn(
            Arc::clone(&source),
            "q1",
            options(2, 3),
            recorder.clone() as Arc<dyn PollObserver>,
        );

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(source.calls(), 3);
        let terminals = recorder.terminals.lock().unwrap();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], PollOutcome::TimedOut { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let source = ScriptedSource::new(vec![]);
        let recorder = Arc::new(Recorder::default());
        let handle = JobPoller::spawn(
            Arc::clone(&source),
            "q1",
            options(2, 100),
            recorder.clone() as Arc<dyn PollObserver>,
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let calls_before = source.calls();
        assert!(calls_before >= 1);
        handle.stop();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(source.calls(), calls_before);
        assert_eq!(recorder.terminal_count(), 0);
    }

    /// A status request is in flight at the moment of cancellation; its
    /// response must not reach the observer.
    #[tokio::test(start_paused = true)]
    async fn test_cancellation_race_suppresses_in_flight_response() {
        struct BlockingSource {
            entered: Notify,
            release: Notify,
        }

        #[async_trait::async_trait]
        impl StatusSource for BlockingSource {
            async fn job_status(&self, _query_id: &str) -> Result<JobStatus> {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(JobStatus {
                    state: JobState::Succeeded,
                    percent: 100,
                    message: None,
                })
            }
        }

        let source = Arc::new(BlockingSource {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let recorder = Arc::new(Recorder::default());
        let handle = JobPoller::spawn(
            Arc::clone(&source),
            "q1",
            options(2, 10),
            recorder.clone() as Arc<dyn PollObserver>,
        );

        // Wait until the request is in flight, then cancel.
        source.entered.notified().await;
        handle.stop();
        source.release.notify_one();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(recorder.progress_count(), 0);
        assert_eq!(recorder.terminal_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let source = ScriptedSource::new(vec![]);
        let recorder = Arc::new(Recorder::default());
        let handle = JobPoller::spawn(
            Arc::clone(&source),
            "q1",
            options(2, 100),
            recorder.clone() as Arc<dyn PollObserver>,
        );
        drop(handle);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(source.calls(), 0);
    }
}
