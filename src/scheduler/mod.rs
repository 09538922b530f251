//! Job scheduler: admission, bounded concurrency, cancellation, progress
//! fan-out and lifecycle persistence.
//!
//! One dispatch loop pulls job ids off an unbounded FIFO queue and blocks
//! only on the semaphore guarding execution slots, never on job execution
//! itself. Each pipeline runs in its own spawned task so a panic or failure
//! is contained to that job.

use crate::engines::EngineRegistry;
use crate::error::{DubError, Result};
use crate::job::{Job, JobId, JobSpec, JobStatus, JobUpdate};
use crate::media::VideoProcessor;
use crate::pipeline::progress::{ProgressEvent, Stage};
use crate::pipeline::{DubOutcome, Dubber, DubberConfig};
use crate::store::JobStore;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
    /// Root directory; each job works in `<root>/<job_id>/`.
    pub output_directory: PathBuf,
    pub clean_intermediate_files: bool,
}

/// Snapshot of the scheduler's queue and active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    pub queue_depth: usize,
    pub active_count: usize,
    pub max_concurrent_jobs: usize,
    pub active_job_ids: Vec<JobId>,
}

/// Identifies one observer registration for later removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    job_id: JobId,
    token: u64,
}

#[derive(Default)]
struct SchedulerState {
    /// Submitted, not yet holding an execution slot.
    queued: HashSet<JobId>,
    /// Cancelled while queued; the dispatch loop skips these.
    cancelled_before_start: HashSet<JobId>,
    /// Running jobs and their cancellation tokens.
    active: HashMap<JobId, CancellationToken>,
    observers: HashMap<JobId, Vec<(u64, UnboundedSender<ProgressEvent>)>>,
    next_token: u64,
}

/// The job scheduler. Construct with [`QueueService::start`]; the returned
/// handle is cheap to clone via `Arc` and safe to share with the transport
/// layer.
pub struct QueueService {
    store: Arc<dyn JobStore>,
    registry: Arc<EngineRegistry>,
    video: Arc<dyn VideoProcessor>,
    config: SchedulerConfig,
    queue_tx: UnboundedSender<JobId>,
    events_tx: UnboundedSender<ProgressEvent>,
    state: Mutex<SchedulerState>,
    shutdown: CancellationToken,
}

impl QueueService {
    /// Starts the dispatch loop and the progress fan-out task.
    pub fn start(
        store: Arc<dyn JobStore>,
        registry: Arc<EngineRegistry>,
        video: Arc<dyn VideoProcessor>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let service = Arc::new(Self {
            store,
            registry,
            video,
            config,
            queue_tx,
            events_tx,
            state: Mutex::new(SchedulerState::default()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(service.clone().dispatch_loop(queue_rx));
        tokio::spawn(service.clone().fan_out(events_rx));
        service
    }

    /// Admits a job: persists it as `uploaded` and enqueues it.
    ///
    /// The engine selection is resolved here so an unknown engine fails the
    /// submission instead of a job that already holds a slot.
    pub async fn submit(&self, spec: JobSpec) -> Result<JobId> {
        let job = self.store.create_job(spec).await?;
        if let Err(e) = self.registry.resolve(&job.engines) {
            self.store
                .update_job(
                    &job.id,
                    JobUpdate {
                        status: Some(JobStatus::Failed),
                        error_message: Some(e.to_string()),
                        completed_at: Some(chrono::Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
            return Err(e);
        }

        self.state
            .lock()
            .expect("scheduler state")
            .queued
            .insert(job.id.clone());
        if self.queue_tx.send(job.id.clone()).is_err() {
            self.state
                .lock()
                .expect("scheduler state")
                .queued
                .remove(&job.id);
            return Err(DubError::Other("scheduler is shut down".to_string()));
        }
        info!(job_id = %job.id, "job admitted");
        Ok(job.id)
    }

    /// Cancels a job.
    ///
    /// Queued jobs are removed and marked `cancelled` without ever becoming
    /// `processing`. Running jobs get their token cancelled and stop at the
    /// next stage boundary. Terminal or unknown jobs return `false`.
    pub async fn cancel(&self, job_id: &str) -> bool {
        enum Hit {
            Queued,
            Running,
            Miss,
        }
        let hit = {
            let mut state = self.state.lock().expect("scheduler state");
            if state.queued.remove(job_id) {
                state.cancelled_before_start.insert(job_id.to_string());
                Hit::Queued
            } else if let Some(token) = state.active.get(job_id) {
                token.cancel();
                Hit::Running
            } else {
                Hit::Miss
            }
        };

        match hit {
            Hit::Queued => {
                info!(job_id, "cancelled while queued");
                if let Err(e) = self
                    .store
                    .update_job(
                        job_id,
                        JobUpdate {
                            status: Some(JobStatus::Cancelled),
                            completed_at: Some(chrono::Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    error!(job_id, "failed to persist queued-cancel: {e}");
                }
                self.events_tx
                    .send(ProgressEvent::cancelled(job_id, Stage::Preprocessing))
                    .ok();
                true
            }
            Hit::Running => {
                info!(job_id, "cancellation requested for running job");
                true
            }
            Hit::Miss => false,
        }
    }

    /// Registers an observer for a job's progress events.
    ///
    /// An observer arriving after the terminal event was fanned out would
    /// otherwise never hear anything. The terminal status is persisted
    /// before its event enters the channel, so a terminal record here means
    /// the live event may already be gone; a synthesized copy is delivered
    /// instead and the registration dropped. At worst the observer sees the
    /// terminal event twice.
    pub async fn subscribe(
        &self,
        job_id: &str,
    ) -> (SubscriptionHandle, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = {
            let mut state = self.state.lock().expect("scheduler state");
            let token = state.next_token;
            state.next_token += 1;
            state
                .observers
                .entry(job_id.to_string())
                .or_default()
                .push((token, tx.clone()));
            SubscriptionHandle {
                job_id: job_id.to_string(),
                token,
            }
        };

        if let Ok(Some(job)) = self.store.get_job(job_id).await {
            if job.status.is_terminal() {
                let stage = job
                    .progress_stage
                    .as_deref()
                    .and_then(Stage::from_name)
                    .unwrap_or(Stage::Preprocessing);
                let event = match job.status {
                    JobStatus::Completed => ProgressEvent::completed(job_id),
                    JobStatus::Cancelled => ProgressEvent::cancelled(job_id, stage),
                    _ => ProgressEvent::failed(
                        job_id,
                        stage,
                        job.error_message.as_deref().unwrap_or("unknown error"),
                    ),
                };
                tx.send(event).ok();
                self.unsubscribe(&handle);
            }
        }

        (handle, rx)
    }

    /// Removes one observer registration. Safe to call while events are
    /// being delivered.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut state = self.state.lock().expect("scheduler state");
        if let Some(observers) = state.observers.get_mut(&handle.job_id) {
            observers.retain(|(token, _)| *token != handle.token);
            if observers.is_empty() {
                state.observers.remove(&handle.job_id);
            }
        }
    }

    /// Fetches the current record for a job.
    pub async fn job(&self, job_id: &str) -> Result<Option<Job>> {
        self.store.get_job(job_id).await
    }

    pub fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().expect("scheduler state");
        let mut active_job_ids: Vec<JobId> = state.active.keys().cloned().collect();
        active_job_ids.sort();
        QueueStatus {
            queue_depth: state.queued.len(),
            active_count: state.active.len(),
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            active_job_ids,
        }
    }

    /// Stops the dispatch loop and requests cancellation of every active
    /// job. Already-running pipelines stop at their next stage boundary.
    pub fn shutdown(&self) {
        info!("scheduler shutting down");
        self.shutdown.cancel();
        let state = self.state.lock().expect("scheduler state");
        for token in state.active.values() {
            token.cancel();
        }
    }

    async fn dispatch_loop(self: Arc<Self>, mut queue_rx: UnboundedReceiver<JobId>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        loop {
            let job_id = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = queue_rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let cancel = CancellationToken::new();
            {
                let mut state = self.state.lock().expect("scheduler state");
                if state.cancelled_before_start.remove(&job_id) {
                    continue;
                }
                state.queued.remove(&job_id);
                state.active.insert(job_id.clone(), cancel.clone());
            }

            tokio::spawn(self.clone().run_job(job_id, permit, cancel));
        }
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: JobId,
        permit: OwnedSemaphorePermit,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();
        let outcome = self.execute(&job_id, cancel).await;
        self.finish(&job_id, outcome, started.elapsed().as_secs())
            .await;

        self.state
            .lock()
            .expect("scheduler state")
            .active
            .remove(&job_id);
        drop(permit);
    }

    /// Runs the pipeline in its own task so a panic is caught and reported
    /// as a failure instead of taking the scheduler down.
    async fn execute(
        &self,
        job_id: &str,
        cancel: CancellationToken,
    ) -> (Result<DubOutcome>, Stage) {
        let job = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return (
                    Err(DubError::JobNotFound {
                        id: job_id.to_string(),
                    }),
                    Stage::Preprocessing,
                )
            }
            Err(e) => return (Err(e), Stage::Preprocessing),
        };

        if let Err(e) = self
            .store
            .update_job(job_id, JobUpdate::status(JobStatus::Processing))
            .await
        {
            return (Err(e), Stage::Preprocessing);
        }
        info!(job_id, "job started");

        let engines = match self.registry.resolve(&job.engines) {
            Ok(engines) => engines,
            Err(e) => return (Err(e), Stage::Preprocessing),
        };
        let config = DubberConfig {
            output_directory: self.config.output_directory.join(job_id),
            clean_intermediate_files: self.config.clean_intermediate_files,
        };
        let video = self.video.clone();
        let events = self.events_tx.clone();

        let handle = tokio::spawn(async move {
            let mut dubber = Dubber::new(&job, engines, video, config, cancel, events);
            let result = dubber.run().await;
            (result, dubber.stage())
        });

        match handle.await {
            Ok(done) => done,
            Err(join_error) => {
                error!(job_id, "pipeline task aborted: {join_error}");
                (
                    Err(DubError::Other(format!("pipeline panicked: {join_error}"))),
                    Stage::Preprocessing,
                )
            }
        }
    }

    /// Persists the terminal state, then emits the terminal event.
    async fn finish(
        &self,
        job_id: &str,
        (result, stage): (Result<DubOutcome>, Stage),
        elapsed_secs: u64,
    ) {
        let now = chrono::Utc::now();
        let (update, event) = match result {
            Ok(outcome) => {
                let output_file_size = std::fs::metadata(&outcome.artifacts.video_file)
                    .map(|m| m.len())
                    .ok();
                info!(job_id, elapsed_secs, "job completed");
                (
                    JobUpdate {
                        status: Some(JobStatus::Completed),
                        source_language: Some(outcome.source_language),
                        output_file_path: Some(outcome.artifacts.video_file),
                        output_file_size,
                        progress_stage: Some(Stage::Done.name().to_string()),
                        progress_percentage: Some(100.0),
                        processing_time_seconds: Some(elapsed_secs),
                        completed_at: Some(now),
                        ..Default::default()
                    },
                    ProgressEvent::completed(job_id),
                )
            }
            Err(e) if e.is_cancellation() => {
                info!(job_id, stage = %stage, "job cancelled");
                (
                    JobUpdate {
                        status: Some(JobStatus::Cancelled),
                        processing_time_seconds: Some(elapsed_secs),
                        completed_at: Some(now),
                        ..Default::default()
                    },
                    ProgressEvent::cancelled(job_id, stage),
                )
            }
            Err(e) => {
                warn!(job_id, stage = %stage, "job failed: {e}");
                (
                    JobUpdate {
                        status: Some(JobStatus::Failed),
                        error_message: Some(e.to_string()),
                        processing_time_seconds: Some(elapsed_secs),
                        completed_at: Some(now),
                        ..Default::default()
                    },
                    ProgressEvent::failed(job_id, stage, &e.to_string()),
                )
            }
        };

        if let Err(e) = self.store.update_job(job_id, update).await {
            error!(job_id, "failed to persist terminal state: {e}");
        }
        self.events_tx.send(event).ok();
    }

    /// Single consumer of the progress channel: persists the latest snapshot
    /// into the job record, then delivers to every observer of that job.
    /// Observer registrations are dropped after their terminal event.
    async fn fan_out(self: Arc<Self>, mut events_rx: UnboundedReceiver<ProgressEvent>) {
        while let Some(event) = events_rx.recv().await {
            let snapshot = JobUpdate {
                progress_stage: Some(event.stage.name().to_string()),
                progress_percentage: Some(event.percentage as f32),
                ..Default::default()
            };
            if let Err(e) = self.store.update_job(&event.job_id, snapshot).await {
                warn!(job_id = %event.job_id, "failed to persist progress snapshot: {e}");
            }

            let mut state = self.state.lock().expect("scheduler state");
            if let Some(observers) = state.observers.get_mut(&event.job_id) {
                // A closed receiver drops out here; nobody else is affected.
                observers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
            }
            if event.status.is_terminal() {
                state.observers.remove(&event.job_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::SAMPLE_RATE;
    use crate::engines::{
        MockDiarizer, MockSpeechToText, MockTextToSpeech, MockTranslator, SttEngineId,
        TranslationEngineId, TtsEngineId,
    };
    use crate::job::EngineSelection;
    use crate::media::{AudioTrack, MockVideoProcessor};
    use crate::store::MemoryJobStore;
    use std::path::Path;
    use std::time::Duration;

    fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("input.wav");
        AudioTrack::from_samples(vec![40; 4 * SAMPLE_RATE as usize], SAMPLE_RATE)
            .to_wav(&path)
            .expect("write input");
        path
    }

    fn registry() -> Arc<EngineRegistry> {
        Arc::new(
            EngineRegistry::new(Arc::new(
                MockDiarizer::new().with_segment(0.5, 1.5, "SPEAKER_00"),
            ))
            .register_stt(SttEngineId::FasterWhisper, Arc::new(MockSpeechToText::new()))
            .register_translator(TranslationEngineId::Nllb, Arc::new(MockTranslator::new()))
            .register_tts(TtsEngineId::Mms, Arc::new(MockTextToSpeech::new())),
        )
    }

    fn service(dir: &Path, registry: Arc<EngineRegistry>, max: usize) -> Arc<QueueService> {
        QueueService::start(
            Arc::new(MemoryJobStore::new()),
            registry,
            Arc::new(MockVideoProcessor::new()),
            SchedulerConfig {
                max_concurrent_jobs: max,
                output_directory: dir.join("out"),
                clean_intermediate_files: false,
            },
        )
    }

    fn spec(input: &Path) -> JobSpec {
        JobSpec {
            original_filename: "input.wav".to_string(),
            input_file_path: input.to_path_buf(),
            input_file_size: 0,
            source_language: Some("en".to_string()),
            target_language: "ca".to_string(),
            engines: EngineSelection::default(),
        }
    }

    async fn wait_terminal(service: &QueueService, job_id: &str) -> Job {
        for _ in 0..200 {
            if let Ok(Some(job)) = service.store.get_job(job_id).await {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_submitted_job_completes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_input(dir.path());
        let service = service(dir.path(), registry(), 2);

        let job_id = service.submit(spec(&input)).await.expect("submit");
        let job = wait_terminal(&service, &job_id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.output_file_path.is_some());
        assert!(job.processing_time_seconds.is_some());
        assert_eq!(job.progress_percentage, Some(100.0));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_submit_with_unregistered_engine_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_input(dir.path());
        let service = service(dir.path(), registry(), 2);

        let mut spec = spec(&input);
        spec.engines.tts = TtsEngineId::OpenAi;
        let result = service.submit(spec).await;
        assert!(matches!(result, Err(DubError::EngineUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job_is_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(dir.path(), registry(), 1);
        assert!(!service.cancel("no-such-job").await);
    }

    #[tokio::test]
    async fn test_cancel_after_terminal_is_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_input(dir.path());
        let service = service(dir.path(), registry(), 1);

        let job_id = service.submit(spec(&input)).await.expect("submit");
        wait_terminal(&service, &job_id).await;
        assert!(!service.cancel(&job_id).await);
    }

    #[tokio::test]
    async fn test_queue_status_reports_limits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(dir.path(), registry(), 3);
        let status = service.queue_status();
        assert_eq!(status.max_concurrent_jobs, 3);
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.active_count, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_observer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = service(dir.path(), registry(), 1);
        let (handle, _rx) = service.subscribe("some-job").await;
        service.unsubscribe(&handle);
        let state = service.state.lock().expect("state");
        assert!(!state.observers.contains_key("some-job"));
    }

    #[tokio::test]
    async fn test_late_subscriber_receives_terminal_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_input(dir.path());
        let service = service(dir.path(), registry(), 1);

        let job_id = service.submit(spec(&input)).await.expect("submit");
        wait_terminal(&service, &job_id).await;

        // The live terminal event is long gone; the subscription must
        // resynchronize from the persisted record instead of waiting.
        let (_handle, mut rx) = service.subscribe(&job_id).await;
        let event = rx.recv().await.expect("terminal event");
        assert_eq!(event.status, JobStatus::Completed);
        assert_eq!(event.percentage, 100);

        let state = service.state.lock().expect("state");
        assert!(!state.observers.contains_key(&job_id));
    }

    #[tokio::test]
    async fn test_shutdown_stops_admission() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_input(dir.path());
        let service = service(dir.path(), registry(), 1);

        service.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The dispatch loop has dropped its end of the queue.
        let result = service.submit(spec(&input)).await;
        assert!(matches!(result, Err(DubError::Other(_))));
        assert_eq!(service.queue_status().queue_depth, 0);
    }
}
