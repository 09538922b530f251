//! Job records: identity, configuration, lifecycle status, and progress
//! snapshot fields persisted through the [`crate::store::JobStore`].

use crate::engines::{SttEngineId, TranslationEngineId, TtsEngineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque unique job identifier (UUID v4 string).
pub type JobId = String;

/// Lifecycle status of a job.
///
/// Transitions are monotonic through
/// `uploaded -> processing -> {completed | failed | cancelled}`;
/// a job never re-enters `processing` after a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for an execution slot.
    Uploaded,
    /// A pipeline is currently running for this job.
    Processing,
    /// Pipeline finished and produced output files.
    Completed,
    /// Pipeline terminated with an error.
    Failed,
    /// Cancellation was requested and honored.
    Cancelled,
}

impl JobStatus {
    /// Returns true once the job can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Engines chosen for one job at submission time.
///
/// Diarization is fixed per process and therefore not part of the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EngineSelection {
    pub stt: SttEngineId,
    pub translation: TranslationEngineId,
    pub tts: TtsEngineId,
}

/// Everything needed to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub original_filename: String,
    pub input_file_path: PathBuf,
    pub input_file_size: u64,
    /// Source language code; auto-detected during transcription when absent.
    pub source_language: Option<String>,
    pub target_language: String,
    #[serde(default)]
    pub engines: EngineSelection,
}

/// Complete persisted job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub original_filename: String,
    pub source_language: Option<String>,
    pub target_language: String,
    pub status: JobStatus,

    pub input_file_path: PathBuf,
    pub output_file_path: Option<PathBuf>,
    pub input_file_size: u64,
    pub output_file_size: Option<u64>,

    pub engines: EngineSelection,

    // Latest progress snapshot, updated at every stage checkpoint so late
    // subscribers can resynchronize without having seen earlier live events.
    pub progress_stage: Option<String>,
    pub progress_percentage: Option<f32>,

    pub processing_time_seconds: Option<u64>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a fresh `uploaded` job from a spec.
    pub fn from_spec(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_filename: spec.original_filename,
            source_language: spec.source_language,
            target_language: spec.target_language,
            status: JobStatus::Uploaded,
            input_file_path: spec.input_file_path,
            output_file_path: None,
            input_file_size: spec.input_file_size,
            output_file_size: None,
            engines: spec.engines,
            progress_stage: None,
            progress_percentage: None,
            processing_time_seconds: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Partial update applied to a job record. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub source_language: Option<String>,
    pub output_file_path: Option<PathBuf>,
    pub output_file_size: Option<u64>,
    pub progress_stage: Option<String>,
    pub progress_percentage: Option<f32>,
    pub processing_time_seconds: Option<u64>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// Shorthand for a status-only update.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
