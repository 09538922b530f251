//! HTTP-backed engine implementations.
//!
//! Each engine talks to a co-located inference server over a small JSON/bytes
//! protocol. Transport or protocol failures surface as
//! [`DubError::EngineUnavailable`] so the pipeline treats a dead server the
//! same as an unregistered engine.

use crate::engines::{Diarizer, SpeechSegment, SpeechToText, TextToSpeech, Translator, Voice};
use crate::error::{DubError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

fn unavailable(engine: &str, message: impl std::fmt::Display) -> DubError {
    DubError::EngineUnavailable {
        engine: engine.to_string(),
        message: message.to_string(),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

async fn read_audio(engine: &str, path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| unavailable(engine, format!("cannot read {}: {e}", path.display())))
}

/// Diarization served over HTTP.
pub struct RemoteDiarizer {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteDiarizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Diarizer for RemoteDiarizer {
    async fn diarize(&self, audio: &Path) -> Result<Vec<SpeechSegment>> {
        const ENGINE: &str = "diarization/remote";
        let body = read_audio(ENGINE, audio).await?;
        let url = join_url(&self.base_url, "diarize");
        debug!(url, bytes = body.len(), "requesting diarization");
        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        response
            .json::<Vec<SpeechSegment>>()
            .await
            .map_err(|e| unavailable(ENGINE, e))
    }
}

/// Speech-to-text served over HTTP.
pub struct RemoteSpeechToText {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Deserialize)]
struct LanguageResponse {
    language: String,
}

impl RemoteSpeechToText {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl SpeechToText for RemoteSpeechToText {
    async fn transcribe(&self, chunk: &Path, language: &str) -> Result<String> {
        const ENGINE: &str = "stt/remote";
        let body = read_audio(ENGINE, chunk).await?;
        let url = join_url(&self.base_url, "transcribe");
        let response = self
            .client
            .post(&url)
            .query(&[("language", language)])
            .body(body)
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        let parsed: TextResponse = response.json().await.map_err(|e| unavailable(ENGINE, e))?;
        Ok(parsed.text)
    }

    async fn detect_language(&self, audio: &Path) -> Result<String> {
        const ENGINE: &str = "stt/remote";
        let body = read_audio(ENGINE, audio).await?;
        let url = join_url(&self.base_url, "detect_language");
        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        let parsed: LanguageResponse =
            response.json().await.map_err(|e| unavailable(ENGINE, e))?;
        Ok(parsed.language)
    }

    async fn supported_languages(&self) -> Result<Vec<String>> {
        const ENGINE: &str = "stt/remote";
        let url = join_url(&self.base_url, "languages");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        response
            .json::<Vec<String>>()
            .await
            .map_err(|e| unavailable(ENGINE, e))
    }
}

/// Translation served over HTTP.
pub struct RemoteTranslator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source: &'a str,
    target: &'a str,
}

impl RemoteTranslator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Translator for RemoteTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        const ENGINE: &str = "translation/remote";
        let url = join_url(&self.base_url, "translate");
        debug!(url, source, target, chars = text.len(), "requesting translation");
        let response = self
            .client
            .post(&url)
            .json(&TranslateRequest {
                text,
                source,
                target,
            })
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        let parsed: TextResponse = response.json().await.map_err(|e| unavailable(ENGINE, e))?;
        Ok(parsed.text)
    }

    async fn supported_pairs(&self) -> Result<Vec<(String, String)>> {
        const ENGINE: &str = "translation/remote";
        let url = join_url(&self.base_url, "pairs");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        response
            .json::<Vec<(String, String)>>()
            .await
            .map_err(|e| unavailable(ENGINE, e))
    }
}

/// Text-to-speech served over HTTP. Voices are listed via `GET /voices`,
/// synthesis streams raw WAV bytes back from `GET /speak`.
pub struct RemoteTextToSpeech {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTextToSpeech {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TextToSpeech for RemoteTextToSpeech {
    async fn available_voices(&self, language: &str) -> Result<Vec<Voice>> {
        const ENGINE: &str = "tts/remote";
        let url = join_url(&self.base_url, "voices");
        let response = self
            .client
            .get(&url)
            .query(&[("language", language)])
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        response
            .json::<Vec<Voice>>()
            .await
            .map_err(|e| unavailable(ENGINE, e))
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        _duration_hint: Option<f64>,
        output: &Path,
    ) -> Result<PathBuf> {
        const ENGINE: &str = "tts/remote";
        let url = join_url(&self.base_url, "speak");
        let response = self
            .client
            .get(&url)
            .query(&[("voice", voice), ("text", text)])
            .send()
            .await
            .map_err(|e| unavailable(ENGINE, e))?
            .error_for_status()
            .map_err(|e| unavailable(ENGINE, e))?;
        let bytes = response.bytes().await.map_err(|e| unavailable(ENGINE, e))?;
        tokio::fs::write(output, &bytes)
            .await
            .map_err(|e| unavailable(ENGINE, format!("cannot write {}: {e}", output.display())))?;
        Ok(output.to_path_buf())
    }
}
