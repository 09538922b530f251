use crate::defaults::{DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_OUTPUT_DIRECTORY};
use crate::engines::{SttEngineId, TranslationEngineId, TtsEngineId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub output: OutputConfig,
    pub engines: EnginesConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub max_concurrent_jobs: usize,
}

/// Output handling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub clean_intermediate_files: bool,
}

/// Engine selection defaults and remote endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnginesConfig {
    pub stt: SttEngineId,
    pub translation: TranslationEngineId,
    pub tts: TtsEngineId,
    /// Base URLs for the HTTP-backed engines; `None` means the capability is
    /// expected to be registered in-process.
    pub diarization_url: Option<String>,
    pub stt_url: Option<String>,
    pub translation_url: Option<String>,
    pub tts_url: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            clean_intermediate_files: false,
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            stt: SttEngineId::FasterWhisper,
            translation: TranslationEngineId::Nllb,
            tts: TtsEngineId::Mms,
            diarization_url: None,
            stt_url: None,
            translation_url: None,
            tts_url: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("failed to load config from {}", path.display()))),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.queue.max_concurrent_jobs == 0 {
            anyhow::bail!("queue.max_concurrent_jobs must be at least 1");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - REDUB_MAX_CONCURRENT_JOBS → queue.max_concurrent_jobs
    /// - REDUB_OUTPUT_DIRECTORY → output.directory
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("REDUB_MAX_CONCURRENT_JOBS")
            && let Ok(parsed) = value.parse::<usize>()
            && parsed > 0
        {
            self.queue.max_concurrent_jobs = parsed;
        }

        if let Ok(directory) = std::env::var("REDUB_OUTPUT_DIRECTORY")
            && !directory.is_empty()
        {
            self.output.directory = PathBuf::from(directory);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/redub/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("redub")
            .join("config.toml")
    }
}
