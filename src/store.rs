//! Durable job record storage.
//!
//! Only the CRUD contract matters to the scheduler; the in-memory
//! implementation is the in-process default and the reference for the
//! invariants any backing store must uphold.

use crate::error::Result;
use crate::job::{Job, JobId, JobSpec, JobStatus, JobUpdate};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// CRUD contract for job records. Every call is atomic and safe under
/// concurrent invocation from multiple execution units.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Creates and persists a fresh `uploaded` job.
    async fn create_job(&self, spec: JobSpec) -> Result<Job>;

    /// Fetches a job by id.
    async fn get_job(&self, id: &str) -> Result<Option<Job>>;

    /// Applies a partial update and returns the updated record.
    ///
    /// Status changes out of a terminal state are refused: the rest of the
    /// update still applies, but the status field is left untouched.
    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Option<Job>>;

    /// Lists jobs in submission order, optionally filtered by status.
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>>;

    /// Counts jobs, optionally filtered by status.
    async fn count_jobs(&self, status: Option<JobStatus>) -> Result<usize>;
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, Job>,
    /// Insertion order for stable listing.
    order: Vec<JobId>,
}

/// In-memory job store backed by a single `RwLock`.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<StoreInner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, spec: JobSpec) -> Result<Job> {
        let job = Job::from_spec(spec);
        let mut inner = self.inner.write().await;
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Option<Job>> {
        let mut inner = self.inner.write().await;
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(None);
        };

        if let Some(status) = update.status {
            if job.status.is_terminal() && status != job.status {
                debug!(
                    job_id = %id,
                    from = job.status.as_str(),
                    to = status.as_str(),
                    "refusing status change out of terminal state"
                );
            } else {
                job.status = status;
            }
        }
        if let Some(language) = update.source_language {
            job.source_language = Some(language);
        }
        if let Some(path) = update.output_file_path {
            job.output_file_path = Some(path);
        }
        if let Some(size) = update.output_file_size {
            job.output_file_size = Some(size);
        }
        if let Some(stage) = update.progress_stage {
            job.progress_stage = Some(stage);
        }
        if let Some(percentage) = update.progress_percentage {
            job.progress_percentage = Some(percentage);
        }
        if let Some(seconds) = update.processing_time_seconds {
            job.processing_time_seconds = Some(seconds);
        }
        if let Some(message) = update.error_message {
            job.error_message = Some(message);
        }
        if let Some(at) = update.completed_at {
            job.completed_at = Some(at);
        }
        job.updated_at = Utc::now();

        Ok(Some(job.clone()))
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        let inner = self.inner.read().await;
        let jobs = inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| status.is_none_or(|s| job.status == s))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(jobs)
    }

    async fn count_jobs(&self, status: Option<JobStatus>) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status == s))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::EngineSelection;
    use std::path::PathBuf;

    fn spec(name: &str) -> JobSpec {
        JobSpec {
            original_filename: name.to_string(),
            input_file_path: PathBuf::from(format!("/uploads/{name}")),
            input_file_size: 42,
            source_language: None,
            target_language: "de".to_string(),
            engines: EngineSelection::default(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryJobStore::new();
        let job = store.create_job(spec("a.mp4")).await.expect("create");
        let fetched = store.get_job(&job.id).await.expect("get");
        assert_eq!(fetched.map(|j| j.original_filename), Some("a.mp4".to_string()));
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let store = MemoryJobStore::new();
        assert!(store.get_job("nope").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_update_applies_partial_fields() {
        let store = MemoryJobStore::new();
        let job = store.create_job(spec("a.mp4")).await.expect("create");

        let updated = store
            .update_job(
                &job.id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    progress_stage: Some("diarizing".to_string()),
                    progress_percentage: Some(10.0),
                    ..Default::default()
                },
            )
            .await
            .expect("update")
            .expect("exists");

        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(updated.progress_stage.as_deref(), Some("diarizing"));
        assert_eq!(updated.original_filename, "a.mp4");
        assert!(updated.updated_at >= job.updated_at);
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let store = MemoryJobStore::new();
        let job = store.create_job(spec("a.mp4")).await.expect("create");
        store
            .update_job(&job.id, JobUpdate::status(JobStatus::Cancelled))
            .await
            .expect("update");

        let after = store
            .update_job(&job.id, JobUpdate::status(JobStatus::Processing))
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(after.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_list_preserves_submission_order() {
        let store = MemoryJobStore::new();
        for name in ["a.mp4", "b.mp4", "c.mp4"] {
            store.create_job(spec(name)).await.expect("create");
        }
        let jobs = store.list_jobs(None, 10, 0).await.expect("list");
        let names: Vec<_> = jobs.iter().map(|j| j.original_filename.as_str()).collect();
        assert_eq!(names, ["a.mp4", "b.mp4", "c.mp4"]);
    }

    #[tokio::test]
    async fn test_list_filter_limit_offset() {
        let store = MemoryJobStore::new();
        let mut ids = Vec::new();
        for name in ["a.mp4", "b.mp4", "c.mp4", "d.mp4"] {
            ids.push(store.create_job(spec(name)).await.expect("create").id);
        }
        store
            .update_job(&ids[1], JobUpdate::status(JobStatus::Failed))
            .await
            .expect("update");

        let uploaded = store
            .list_jobs(Some(JobStatus::Uploaded), 10, 0)
            .await
            .expect("list");
        assert_eq!(uploaded.len(), 3);

        let page = store
            .list_jobs(Some(JobStatus::Uploaded), 1, 1)
            .await
            .expect("list");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].original_filename, "c.mp4");
    }

    #[tokio::test]
    async fn test_count_jobs() {
        let store = MemoryJobStore::new();
        let job = store.create_job(spec("a.mp4")).await.expect("create");
        store.create_job(spec("b.mp4")).await.expect("create");
        store
            .update_job(&job.id, JobUpdate::status(JobStatus::Completed))
            .await
            .expect("update");

        assert_eq!(store.count_jobs(None).await.expect("count"), 2);
        assert_eq!(
            store
                .count_jobs(Some(JobStatus::Completed))
                .await
                .expect("count"),
            1
        );
        assert_eq!(
            store
                .count_jobs(Some(JobStatus::Processing))
                .await
                .expect("count"),
            0
        );
    }
}
