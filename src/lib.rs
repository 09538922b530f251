//! redub - offline video re-dubbing
//!
//! Takes a video file and produces a re-dubbed version in a target language:
//! diarize, transcribe, translate, assign voices, synthesize, reassemble.
//! The scheduler admits jobs, bounds concurrency, and reports progress; the
//! pipeline runs each job through the stage sequence.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod cli;
pub mod config;
pub mod defaults;
pub mod engines;
pub mod error;
pub mod job;
pub mod media;
pub mod pipeline;
pub mod scheduler;
pub mod store;
pub mod utterance;

// Capability traits
pub use engines::{Diarizer, EngineRegistry, EngineSet, SpeechToText, TextToSpeech, Translator};

// Pipeline
pub use pipeline::progress::{ProgressEvent, Stage};
pub use pipeline::{DubOutcome, Dubber, DubberConfig};

// Scheduler
pub use scheduler::{QueueService, QueueStatus, SchedulerConfig, SubscriptionHandle};

// Data model
pub use job::{EngineSelection, Job, JobId, JobSpec, JobStatus, JobUpdate};
pub use store::{JobStore, MemoryJobStore};
pub use utterance::{Utterance, UtteranceMetadata};

// Error handling
pub use error::{DubError, Result};

// Config
pub use config::Config;
