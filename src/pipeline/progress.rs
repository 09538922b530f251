//! Progress reporting: the stage ladder and the events emitted at stage
//! boundaries.

use crate::job::{JobId, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stages in execution order. Each stage maps to the percentage at
/// which it begins, so progress is driven by real checkpoints rather than
/// timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocessing,
    Diarizing,
    Transcribing,
    Translating,
    VoiceAssignment,
    Synthesizing,
    Reassembling,
    Done,
}

impl Stage {
    /// Percentage of the job completed when this stage begins.
    pub fn percentage(self) -> u8 {
        match self {
            Stage::Preprocessing => 0,
            Stage::Diarizing => 10,
            Stage::Transcribing => 20,
            Stage::Translating => 45,
            Stage::VoiceAssignment => 60,
            Stage::Synthesizing => 65,
            Stage::Reassembling => 85,
            Stage::Done => 100,
        }
    }

    /// Inverse of [`Stage::name`], used to rebuild a stage from the
    /// persisted progress snapshot.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "preprocessing" => Some(Stage::Preprocessing),
            "diarizing" => Some(Stage::Diarizing),
            "transcribing" => Some(Stage::Transcribing),
            "translating" => Some(Stage::Translating),
            "voice_assignment" => Some(Stage::VoiceAssignment),
            "synthesizing" => Some(Stage::Synthesizing),
            "reassembling" => Some(Stage::Reassembling),
            "done" => Some(Stage::Done),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Preprocessing => "preprocessing",
            Stage::Diarizing => "diarizing",
            Stage::Transcribing => "transcribing",
            Stage::Translating => "translating",
            Stage::VoiceAssignment => "voice_assignment",
            Stage::Synthesizing => "synthesizing",
            Stage::Reassembling => "reassembling",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One progress update for a job, published at stage boundaries and on
/// terminal transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub stage: Stage,
    pub percentage: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl ProgressEvent {
    pub fn stage_started(job_id: &str, stage: Stage) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Processing,
            stage,
            percentage: stage.percentage(),
            message: format!("{stage} started"),
            timestamp: Utc::now(),
            estimated_completion: None,
            error_details: None,
        }
    }

    pub fn completed(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Completed,
            stage: Stage::Done,
            percentage: 100,
            message: "dubbing completed".to_string(),
            timestamp: Utc::now(),
            estimated_completion: None,
            error_details: None,
        }
    }

    pub fn failed(job_id: &str, stage: Stage, error: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Failed,
            stage,
            percentage: stage.percentage(),
            message: "dubbing failed".to_string(),
            timestamp: Utc::now(),
            estimated_completion: None,
            error_details: Some(error.to_string()),
        }
    }

    pub fn cancelled(job_id: &str, stage: Stage) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Cancelled,
            stage,
            percentage: stage.percentage(),
            message: "dubbing cancelled".to_string(),
            timestamp: Utc::now(),
            estimated_completion: None,
            error_details: None,
        }
    }
}
