//! The utterance model: one diarized speech segment, progressively enriched
//! by each pipeline stage.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One diarized speech segment.
///
/// Created at diarization time with timing and speaker only, then enriched
/// stage by stage: chunk path, source text, translated text, assigned voice,
/// dubbed chunk path. The sequence for a job is ordered by start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    /// Start offset in seconds from the beginning of the audio track.
    pub start: f64,
    /// End offset in seconds; always greater than `start`.
    pub end: f64,
    /// Speaker label produced by diarization (e.g. "SPEAKER_00").
    pub speaker_id: String,
    /// Path to the cut original-audio chunk for this segment.
    pub path: Option<PathBuf>,
    /// Transcribed source text; `None` until the transcription stage.
    pub text: Option<String>,
    /// Translated text; `None` until the translation stage.
    pub translated_text: Option<String>,
    /// Whether this segment gets synthesized speech. Segments with empty or
    /// unusable translations fall back to the original audio in reassembly.
    pub for_dubbing: bool,
    /// Synthetic voice assigned to this segment's speaker.
    pub assigned_voice: Option<String>,
    /// Path to the synthesized audio chunk; `None` until synthesis.
    pub dubbed_path: Option<PathBuf>,
}

impl Utterance {
    pub fn new(start: f64, end: f64, speaker_id: impl Into<String>) -> Self {
        Self {
            start,
            end,
            speaker_id: speaker_id.into(),
            path: None,
            text: None,
            translated_text: None,
            for_dubbing: false,
            assigned_voice: None,
            dubbed_path: None,
        }
    }

    /// Duration of the original segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True when the transcript exists and is not only whitespace.
    pub fn has_transcript(&self) -> bool {
        self.text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

/// Drops utterances with empty transcripts before translation.
///
/// This is the only point after diarization where the sequence shrinks;
/// spans belonging to dropped segments simply keep their original audio
/// absent from the overlay pass.
pub fn drop_empty_transcripts(utterances: Vec<Utterance>) -> Vec<Utterance> {
    utterances
        .into_iter()
        .filter(Utterance::has_transcript)
        .collect()
}

/// Wrapper persisted as `utterance_metadata_<lang>.json` in the job's output
/// directory after a successful run.
#[derive(Debug, Serialize, Deserialize)]
pub struct UtteranceMetadata {
    pub source_language: String,
    pub target_language: String,
    pub utterances: Vec<Utterance>,
}

impl UtteranceMetadata {
    /// File name for a given target language, e.g.
    /// `utterance_metadata_pt_br.json` for `pt-BR`.
    pub fn file_name(target_language: &str) -> String {
        format!(
            "utterance_metadata_{}.json",
            target_language.replace('-', "_").to_lowercase()
        )
    }

    /// Writes the metadata atomically (temp file + rename in the same
    /// directory).
    pub fn save(&self, output_directory: &Path) -> Result<PathBuf> {
        let path = output_directory.join(Self::file_name(&self.target_language));
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
