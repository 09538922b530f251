//! Error types for redub.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DubError {
    // Fatal media errors
    #[error("Invalid or unsupported media file {path}: {message}")]
    InvalidMedia { path: String, message: String },

    #[error("A video track must be present in the input file")]
    MissingVideoTrack,

    #[error("Audio processing failed: {message}")]
    Audio { message: String },

    // Engine errors
    #[error("Engine '{engine}' unavailable: {message}")]
    EngineUnavailable { engine: String, message: String },

    #[error("Engine '{engine}' does not support language '{language}'")]
    UnsupportedLanguage { engine: String, language: String },

    #[error("Translation pair {source_language} -> {target_language} is not supported")]
    UnsupportedPair {
        source_language: String,
        target_language: String,
    },

    #[error("No synthetic voice available for language '{language}'")]
    NoVoiceAvailable { language: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // Pipeline errors
    #[error("Translated script segment count mismatch: expected {expected}, got {actual}")]
    AlignmentMismatch { expected: usize, actual: usize },

    #[error("Job was cancelled")]
    Cancelled,

    // Scheduler / store errors
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Job store error: {message}")]
    Store { message: String },

    // General I/O and serialization errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, DubError>;

impl DubError {
    /// True for the operational cancellation outcome, which maps to the
    /// `cancelled` job status rather than `failed`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DubError::Cancelled)
    }
}
