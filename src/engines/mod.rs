//! Capability boundaries to the AI engines the pipeline consumes.
//!
//! The pipeline never depends on which concrete engine backs these traits;
//! every call is treated as potentially slow and potentially failing. Mock
//! implementations live beside each trait so tests can substitute them.

pub mod remote;

use crate::error::{DubError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// One diarized span: timing plus an opaque speaker label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// A synthetic voice offered by a text-to-speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub gender: Option<String>,
}

/// Speaker diarization: partitions an audio track into ordered,
/// speaker-attributed segments.
#[async_trait::async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, audio: &Path) -> Result<Vec<SpeechSegment>>;
}

/// Speech-to-text transcription.
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribes one audio chunk in the given source language.
    async fn transcribe(&self, chunk: &Path, language: &str) -> Result<String>;

    /// Detects the dominant language of an audio track.
    async fn detect_language(&self, audio: &Path) -> Result<String>;

    /// Language codes this engine accepts. An empty list means the engine
    /// does not advertise its coverage.
    async fn supported_languages(&self) -> Result<Vec<String>>;
}

/// Machine translation. Must preserve segment count under the batched-script
/// protocol (see [`crate::pipeline::script`]).
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    /// Advertised language pairs. An empty list means the engine does not
    /// advertise its coverage.
    async fn supported_pairs(&self) -> Result<Vec<(String, String)>>;
}

/// Text-to-speech synthesis.
#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn available_voices(&self, language: &str) -> Result<Vec<Voice>>;

    /// Synthesizes `text` with the given voice into `output` (WAV) and
    /// returns the written path. `duration_hint` is the original segment
    /// duration in seconds.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        duration_hint: Option<f64>,
        output: &Path,
    ) -> Result<PathBuf>;
}

// ── Engine identifiers ────────────────────────────────────────────────────

/// Selectable speech-to-text engines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SttEngineId {
    #[default]
    FasterWhisper,
    Transformers,
}

/// Selectable translation engines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TranslationEngineId {
    #[default]
    Nllb,
}

/// Selectable text-to-speech engines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TtsEngineId {
    #[default]
    Mms,
    OpenAi,
}

// ── Registry ──────────────────────────────────────────────────────────────

/// Explicit, dependency-injected registry of engine implementations.
///
/// Constructed once at process startup and handed to the scheduler; the
/// engines for a job are resolved exactly once at admission, never per call.
/// Diarization is a fixed slot, the other capabilities map selectable ids to
/// implementations.
pub struct EngineRegistry {
    diarizer: Arc<dyn Diarizer>,
    stt: HashMap<SttEngineId, Arc<dyn SpeechToText>>,
    translators: HashMap<TranslationEngineId, Arc<dyn Translator>>,
    tts: HashMap<TtsEngineId, Arc<dyn TextToSpeech>>,
}

/// The resolved engines for one job.
#[derive(Clone)]
pub struct EngineSet {
    pub diarizer: Arc<dyn Diarizer>,
    pub stt: Arc<dyn SpeechToText>,
    pub translator: Arc<dyn Translator>,
    pub tts: Arc<dyn TextToSpeech>,
}

impl EngineRegistry {
    pub fn new(diarizer: Arc<dyn Diarizer>) -> Self {
        Self {
            diarizer,
            stt: HashMap::new(),
            translators: HashMap::new(),
            tts: HashMap::new(),
        }
    }

    pub fn register_stt(mut self, id: SttEngineId, engine: Arc<dyn SpeechToText>) -> Self {
        self.stt.insert(id, engine);
        self
    }

    pub fn register_translator(
        mut self,
        id: TranslationEngineId,
        engine: Arc<dyn Translator>,
    ) -> Self {
        self.translators.insert(id, engine);
        self
    }

    pub fn register_tts(mut self, id: TtsEngineId, engine: Arc<dyn TextToSpeech>) -> Self {
        self.tts.insert(id, engine);
        self
    }

    /// Resolves a job's engine selection to concrete implementations.
    pub fn resolve(&self, selection: &crate::job::EngineSelection) -> Result<EngineSet> {
        let stt = self
            .stt
            .get(&selection.stt)
            .cloned()
            .ok_or_else(|| DubError::EngineUnavailable {
                engine: format!("stt/{:?}", selection.stt),
                message: "no implementation registered".to_string(),
            })?;
        let translator = self
            .translators
            .get(&selection.translation)
            .cloned()
            .ok_or_else(|| DubError::EngineUnavailable {
                engine: format!("translation/{:?}", selection.translation),
                message: "no implementation registered".to_string(),
            })?;
        let tts = self
            .tts
            .get(&selection.tts)
            .cloned()
            .ok_or_else(|| DubError::EngineUnavailable {
                engine: format!("tts/{:?}", selection.tts),
                message: "no implementation registered".to_string(),
            })?;
        Ok(EngineSet {
            diarizer: self.diarizer.clone(),
            stt,
            translator,
            tts,
        })
    }
}

// ── Mock implementations for tests ────────────────────────────────────────

/// Mock diarizer returning a configured segment list.
#[derive(Debug, Clone, Default)]
pub struct MockDiarizer {
    segments: Vec<SpeechSegment>,
    should_fail: bool,
}

impl MockDiarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, start: f64, end: f64, speaker: &str) -> Self {
        self.segments.push(SpeechSegment {
            start,
            end,
            speaker: speaker.to_string(),
        });
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

#[async_trait::async_trait]
impl Diarizer for MockDiarizer {
    async fn diarize(&self, _audio: &Path) -> Result<Vec<SpeechSegment>> {
        if self.should_fail {
            return Err(DubError::EngineUnavailable {
                engine: "diarization/mock".to_string(),
                message: "mock diarization failure".to_string(),
            });
        }
        Ok(self.segments.clone())
    }
}

/// Mock speech-to-text. Responses are consumed in order; once exhausted the
/// fixed fallback response is returned.
pub struct MockSpeechToText {
    responses: Mutex<Vec<String>>,
    fallback: String,
    detected_language: String,
    languages: Vec<String>,
    delay: Option<Duration>,
    should_fail: bool,
}

impl MockSpeechToText {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback: "mock transcription".to_string(),
            detected_language: "en".to_string(),
            languages: vec!["en".to_string(), "ca".to_string(), "de".to_string()],
            delay: None,
            should_fail: false,
        }
    }

    /// Queue per-chunk responses, consumed front to back.
    pub fn with_responses(self, responses: &[&str]) -> Self {
        let mut queue = responses.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        queue.reverse();
        *self.responses.lock().expect("lock") = queue;
        self
    }

    pub fn with_fallback(mut self, response: &str) -> Self {
        self.fallback = response.to_string();
        self
    }

    pub fn with_detected_language(mut self, language: &str) -> Self {
        self.detected_language = language.to_string();
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Adds an artificial per-call delay, for concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Default for MockSpeechToText {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(&self, _chunk: &Path, _language: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(DubError::EngineUnavailable {
                engine: "stt/mock".to_string(),
                message: "mock transcription failure".to_string(),
            });
        }
        let next = self.responses.lock().expect("lock").pop();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn detect_language(&self, _audio: &Path) -> Result<String> {
        Ok(self.detected_language.clone())
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        Ok(self.languages.clone())
    }
}

/// Mock translator. By default it echoes the input script unchanged, which
/// preserves segment alignment; a fixed script response can be injected to
/// exercise mismatch handling.
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    script_response: Option<String>,
    pairs: Vec<(String, String)>,
    should_fail: bool,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the returned script verbatim.
    pub fn with_script_response(mut self, response: &str) -> Self {
        self.script_response = Some(response.to_string());
        self
    }

    /// Advertises explicit language pairs; the default empty list means
    /// unconstrained coverage.
    pub fn with_pairs(mut self, pairs: &[(&str, &str)]) -> Self {
        self.pairs = pairs
            .iter()
            .map(|(s, t)| (s.to_string(), t.to_string()))
            .collect();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

#[async_trait::async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
        if self.should_fail {
            return Err(DubError::EngineUnavailable {
                engine: "translation/mock".to_string(),
                message: "mock translation failure".to_string(),
            });
        }
        Ok(self
            .script_response
            .clone()
            .unwrap_or_else(|| text.to_string()))
    }

    async fn supported_pairs(&self) -> Result<Vec<(String, String)>> {
        Ok(self.pairs.clone())
    }
}

/// Mock text-to-speech: writes a constant-amplitude WAV chunk of the hinted
/// duration so reassembly output is observable in tests.
pub struct MockTextToSpeech {
    voices: Vec<Voice>,
    amplitude: i16,
    sample_rate: u32,
    failing_text: Option<String>,
}

impl MockTextToSpeech {
    pub fn new() -> Self {
        Self {
            voices: vec![Voice {
                name: "voice_0".to_string(),
                gender: None,
            }],
            amplitude: 500,
            sample_rate: crate::defaults::SAMPLE_RATE,
            failing_text: None,
        }
    }

    pub fn with_voices(mut self, names: &[&str]) -> Self {
        self.voices = names
            .iter()
            .map(|name| Voice {
                name: name.to_string(),
                gender: None,
            })
            .collect();
        self
    }

    pub fn with_no_voices(mut self) -> Self {
        self.voices.clear();
        self
    }

    pub fn with_amplitude(mut self, amplitude: i16) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Synthesis fails for any text containing this marker.
    pub fn with_failing_text(mut self, marker: &str) -> Self {
        self.failing_text = Some(marker.to_string());
        self
    }
}

impl Default for MockTextToSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TextToSpeech for MockTextToSpeech {
    async fn available_voices(&self, _language: &str) -> Result<Vec<Voice>> {
        Ok(self.voices.clone())
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        duration_hint: Option<f64>,
        output: &Path,
    ) -> Result<PathBuf> {
        if let Some(marker) = &self.failing_text {
            if text.contains(marker.as_str()) {
                return Err(DubError::Synthesis {
                    message: format!("mock synthesis failure for '{text}'"),
                });
            }
        }
        let duration = duration_hint.unwrap_or(1.0);
        let len = (duration * self.sample_rate as f64).round() as usize;
        let track =
            crate::media::AudioTrack::from_samples(vec![self.amplitude; len], self.sample_rate);
        track.to_wav(output)?;
        Ok(output.to_path_buf())
    }
}
