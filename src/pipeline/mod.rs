//! The dubbing pipeline: a strictly ordered state machine that carries one
//! job from input video to re-dubbed output.
//!
//! Every stage transition is a checkpoint: the cancellation token is checked
//! and a progress event is emitted. Cancellation is honored only at these
//! boundaries, so a stage always runs to completion once entered.

pub mod progress;
pub mod script;

use crate::engines::EngineSet;
use crate::error::{DubError, Result};
use crate::job::{Job, JobId};
use crate::media::{align_to_video, build_dubbed_track, AudioTrack, SplitMedia, VideoProcessor};
use crate::pipeline::progress::{ProgressEvent, Stage};
use crate::utterance::{drop_empty_transcripts, Utterance, UtteranceMetadata};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-run configuration. `output_directory` is the job's private working
/// directory; the run owns every file beneath it.
#[derive(Debug, Clone)]
pub struct DubberConfig {
    pub output_directory: PathBuf,
    pub clean_intermediate_files: bool,
}

/// Final artifacts of a successful run.
#[derive(Debug, Clone)]
pub struct DubbedArtifacts {
    pub audio_file: PathBuf,
    pub video_file: PathBuf,
}

/// What a successful run reports back to the scheduler.
#[derive(Debug, Clone)]
pub struct DubOutcome {
    pub artifacts: DubbedArtifacts,
    /// Resolved source language (job-provided or detected).
    pub source_language: String,
}

/// One pipeline run for one job. Constructed by the scheduler with the
/// engines resolved at admission time.
pub struct Dubber {
    job_id: JobId,
    input: PathBuf,
    source_language: Option<String>,
    target_language: String,
    engines: EngineSet,
    video: Arc<dyn VideoProcessor>,
    config: DubberConfig,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ProgressEvent>,
    stage: Stage,
}

impl Dubber {
    pub fn new(
        job: &Job,
        engines: EngineSet,
        video: Arc<dyn VideoProcessor>,
        config: DubberConfig,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            input: job.input_file_path.clone(),
            source_language: job.source_language.clone(),
            target_language: job.target_language.clone(),
            engines,
            video,
            config,
            cancel,
            events,
            stage: Stage::Preprocessing,
        }
    }

    /// Stage the run last entered; on failure this is where it stopped.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs the pipeline to completion.
    pub async fn run(&mut self) -> Result<DubOutcome> {
        self.checkpoint(Stage::Preprocessing)?;
        tokio::fs::create_dir_all(&self.config.output_directory).await?;
        let split = self
            .video
            .split_audio_video(&self.input, &self.config.output_directory)
            .await?;
        let original = AudioTrack::from_wav(&split.audio_file)?;

        self.checkpoint(Stage::Diarizing)?;
        let mut utterances = self.diarize(&split, &original).await?;

        self.checkpoint(Stage::Transcribing)?;
        let source_language = self.transcribe(&mut utterances, &split).await?;

        self.checkpoint(Stage::Translating)?;
        let mut utterances = drop_empty_transcripts(utterances);
        self.translate(&mut utterances, &source_language).await?;

        self.checkpoint(Stage::VoiceAssignment)?;
        self.assign_voices(&mut utterances).await?;

        self.checkpoint(Stage::Synthesizing)?;
        self.synthesize(&mut utterances).await;

        self.checkpoint(Stage::Reassembling)?;
        let artifacts = self.reassemble(&utterances, &original, &split).await?;

        let metadata = UtteranceMetadata {
            source_language: source_language.clone(),
            target_language: self.target_language.clone(),
            utterances,
        };
        metadata.save(&self.config.output_directory)?;

        if self.config.clean_intermediate_files {
            self.clean_intermediates(&metadata.utterances);
        }

        Ok(DubOutcome {
            artifacts,
            source_language,
        })
    }

    /// Stage boundary: honor cancellation, then announce the stage.
    fn checkpoint(&mut self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(job_id = %self.job_id, stage = %self.stage, "cancelled at stage boundary");
            return Err(DubError::Cancelled);
        }
        self.stage = stage;
        debug!(job_id = %self.job_id, %stage, percentage = stage.percentage(), "entering stage");
        self.events
            .send(ProgressEvent::stage_started(&self.job_id, stage))
            .ok();
        Ok(())
    }

    /// Diarizes the audio track and cuts one original-audio chunk per
    /// segment. Segments with non-positive duration are dropped.
    async fn diarize(&self, split: &SplitMedia, original: &AudioTrack) -> Result<Vec<Utterance>> {
        let mut segments = self.engines.diarizer.diarize(&split.audio_file).await?;
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut utterances = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            if segment.end <= segment.start {
                warn!(
                    job_id = %self.job_id,
                    start = segment.start,
                    end = segment.end,
                    "dropping diarized segment with non-positive duration"
                );
                continue;
            }
            let mut utterance = Utterance::new(segment.start, segment.end, segment.speaker);
            let chunk_path = self
                .config
                .output_directory
                .join(format!("chunk_{index:03}.wav"));
            original
                .slice(utterance.start, utterance.end)
                .to_wav(&chunk_path)?;
            utterance.path = Some(chunk_path);
            utterances.push(utterance);
        }
        info!(job_id = %self.job_id, count = utterances.len(), "diarization produced utterances");
        Ok(utterances)
    }

    /// Transcribes every chunk; resolves the source language, detecting it
    /// from the full track when the job did not provide one.
    async fn transcribe(
        &self,
        utterances: &mut [Utterance],
        split: &SplitMedia,
    ) -> Result<String> {
        let language = match &self.source_language {
            Some(code) => code.clone(),
            None => {
                let detected = self.engines.stt.detect_language(&split.audio_file).await?;
                info!(job_id = %self.job_id, language = %detected, "detected source language");
                detected
            }
        };

        let supported = self.engines.stt.supported_languages().await?;
        if !supported.is_empty() && !supported.iter().any(|l| l == &language) {
            return Err(DubError::UnsupportedLanguage {
                engine: "stt".to_string(),
                language,
            });
        }

        for utterance in utterances.iter_mut() {
            let chunk = utterance
                .path
                .as_deref()
                .ok_or_else(|| DubError::Other("utterance chunk path missing".to_string()))?;
            utterance.text = Some(self.engines.stt.transcribe(chunk, &language).await?);
        }
        Ok(language)
    }

    /// Translates all transcripts in one batched round trip. Empty
    /// translations leave the utterance ineligible for dubbing.
    async fn translate(&self, utterances: &mut [Utterance], source: &str) -> Result<()> {
        let pairs = self.engines.translator.supported_pairs().await?;
        if !pairs.is_empty()
            && !pairs
                .iter()
                .any(|(s, t)| s == source && t == &self.target_language)
        {
            return Err(DubError::UnsupportedPair {
                source_language: source.to_string(),
                target_language: self.target_language.clone(),
            });
        }

        let transcripts: Vec<String> = utterances
            .iter()
            .map(|u| u.text.clone().unwrap_or_default())
            .collect();
        let script = script::build_script(&transcripts);
        let translated = self
            .engines
            .translator
            .translate(&script, source, &self.target_language)
            .await?;
        let segments = script::split_translated_script(&translated, utterances.len())?;

        for (utterance, segment) in utterances.iter_mut().zip(segments) {
            utterance.for_dubbing = !segment.is_empty();
            if segment.is_empty() {
                debug!(
                    job_id = %self.job_id,
                    start = utterance.start,
                    "empty translation, keeping original audio for segment"
                );
            }
            utterance.translated_text = Some(segment);
        }
        Ok(())
    }

    /// Maps each distinct speaker, in order of first appearance, to a voice
    /// for the target language round-robin. Deterministic within a job.
    async fn assign_voices(&self, utterances: &mut [Utterance]) -> Result<()> {
        let mut speakers: Vec<String> = Vec::new();
        for utterance in utterances.iter() {
            if !speakers.contains(&utterance.speaker_id) {
                speakers.push(utterance.speaker_id.clone());
            }
        }
        if speakers.is_empty() {
            return Ok(());
        }

        let voices = self
            .engines
            .tts
            .available_voices(&self.target_language)
            .await?;
        if voices.is_empty() {
            return Err(DubError::NoVoiceAvailable {
                language: self.target_language.clone(),
            });
        }

        for utterance in utterances.iter_mut() {
            let index = speakers
                .iter()
                .position(|s| s == &utterance.speaker_id)
                .unwrap_or(0);
            utterance.assigned_voice = Some(voices[index % voices.len()].name.clone());
        }
        Ok(())
    }

    /// Synthesizes every eligible utterance. A per-utterance failure demotes
    /// that utterance to the original-audio fallback and never aborts the
    /// run.
    async fn synthesize(&self, utterances: &mut [Utterance]) {
        for (index, utterance) in utterances.iter_mut().enumerate() {
            if !utterance.for_dubbing {
                continue;
            }
            let text = utterance.translated_text.clone().unwrap_or_default();
            let voice = utterance.assigned_voice.clone().unwrap_or_default();
            let output = self
                .config
                .output_directory
                .join(format!("dubbed_chunk_{index:03}.wav"));
            match self
                .engines
                .tts
                .synthesize(&text, &voice, Some(utterance.duration()), &output)
                .await
            {
                Ok(path) => utterance.dubbed_path = Some(path),
                Err(e) => {
                    warn!(
                        job_id = %self.job_id,
                        start = utterance.start,
                        error = %e,
                        "synthesis failed, falling back to original audio for segment"
                    );
                    utterance.for_dubbing = false;
                }
            }
        }
    }

    /// Mixes the dubbed track, aligns it to the video duration and muxes the
    /// final output.
    async fn reassemble(
        &self,
        utterances: &[Utterance],
        original: &AudioTrack,
        split: &SplitMedia,
    ) -> Result<DubbedArtifacts> {
        let video_file = split
            .video_file
            .as_deref()
            .ok_or(DubError::MissingVideoTrack)?;

        let mut dubbed = build_dubbed_track(utterances, original);
        let video_duration = self.video.probe_duration(video_file).await?;
        align_to_video(&mut dubbed, video_duration);

        let lang = self.target_language.replace('-', "_").to_lowercase();
        let audio_file = self
            .config
            .output_directory
            .join(format!("dubbed_audio_{lang}.wav"));
        dubbed.to_wav(&audio_file)?;

        let output_file = self
            .config
            .output_directory
            .join(format!("dubbed_video_{lang}.mp4"));
        self.video
            .combine_audio_video(video_file, &audio_file, &output_file)
            .await?;

        info!(job_id = %self.job_id, output = %output_file.display(), "reassembly finished");
        Ok(DubbedArtifacts {
            audio_file,
            video_file: output_file,
        })
    }

    /// Deletes per-utterance chunk files after a successful run.
    fn clean_intermediates(&self, utterances: &[Utterance]) {
        for utterance in utterances {
            for path in [utterance.path.as_deref(), utterance.dubbed_path.as_deref()]
                .into_iter()
                .flatten()
            {
                if let Err(e) = std::fs::remove_file(path) {
                    debug!(path = %path.display(), "could not remove intermediate file: {e}");
                }
            }
        }
    }
}
