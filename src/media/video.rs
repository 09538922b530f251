//! Video track handling: splitting input into silent video + audio, probing
//! duration, and muxing the dubbed audio back in.
//!
//! Container work is delegated to ffmpeg; the trait exists so the pipeline
//! and its tests never depend on an ffmpeg binary being present.

use crate::defaults::SAMPLE_RATE;
use crate::error::{DubError, Result};
use crate::media::track::AudioTrack;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Intermediate artifacts produced by splitting the input file.
#[derive(Debug, Clone)]
pub struct SplitMedia {
    /// Silent video track; `None` when the container carried no video.
    pub video_file: Option<PathBuf>,
    /// Mono 16 kHz WAV audio track.
    pub audio_file: PathBuf,
}

/// Container-level operations the pipeline consumes.
#[async_trait::async_trait]
pub trait VideoProcessor: Send + Sync {
    /// Splits the input into a silent video track and a mono WAV audio track.
    async fn split_audio_video(&self, input: &Path, output_dir: &Path) -> Result<SplitMedia>;

    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Muxes the dubbed audio with the silent video track into `output`.
    async fn combine_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<()>;
}

/// ffmpeg-backed implementation.
pub struct FfmpegVideoProcessor;

impl FfmpegVideoProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Checks that both `ffmpeg` and `ffprobe` can be executed.
    pub async fn is_installed() -> bool {
        for binary in ["ffmpeg", "ffprobe"] {
            let status = Command::new(binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if !status.map(|s| s.success()).unwrap_or(false) {
                return false;
            }
        }
        true
    }

    async fn run(&self, program: &str, args: &[&str], input: &Path) -> Result<String> {
        debug!(program, ?args, "running media command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DubError::InvalidMedia {
                path: input.display().to_string(),
                message: format!("failed to run {program}: {e}"),
            })?;
        if !output.status.success() {
            return Err(DubError::InvalidMedia {
                path: input.display().to_string(),
                message: format!(
                    "{program} exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for FfmpegVideoProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl VideoProcessor for FfmpegVideoProcessor {
    async fn split_audio_video(&self, input: &Path, output_dir: &Path) -> Result<SplitMedia> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let audio_file = output_dir.join(format!("{stem}_audio.wav"));
        let video_file = output_dir.join(format!("{stem}_video.mp4"));

        let sample_rate = SAMPLE_RATE.to_string();
        self.run(
            "ffmpeg",
            &[
                "-hide_banner",
                "-y",
                "-i",
                &input.to_string_lossy(),
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ar",
                &sample_rate,
                "-ac",
                "1",
                &audio_file.to_string_lossy(),
            ],
            input,
        )
        .await?;

        self.run(
            "ffmpeg",
            &[
                "-hide_banner",
                "-y",
                "-i",
                &input.to_string_lossy(),
                "-an",
                "-c:v",
                "copy",
                &video_file.to_string_lossy(),
            ],
            input,
        )
        .await?;

        Ok(SplitMedia {
            video_file: Some(video_file),
            audio_file,
        })
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let stdout = self
            .run(
                "ffprobe",
                &[
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                    &path.to_string_lossy(),
                ],
                path,
            )
            .await?;
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|e| DubError::InvalidMedia {
                path: path.display().to_string(),
                message: format!("unparseable duration '{}': {e}", stdout.trim()),
            })
    }

    async fn combine_audio_video(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<()> {
        self.run(
            "ffmpeg",
            &[
                "-hide_banner",
                "-y",
                "-i",
                &video.to_string_lossy(),
                "-i",
                &audio.to_string_lossy(),
                "-map",
                "0:v",
                "-map",
                "1:a",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                &output.to_string_lossy(),
            ],
            video,
        )
        .await?;
        Ok(())
    }
}

/// Mock video processor for tests: treats the input file itself as the audio
/// track (it must be a WAV) and fabricates a placeholder video file.
pub struct MockVideoProcessor {
    video_duration: Option<f64>,
    no_video_track: bool,
    fail_split: bool,
}

impl MockVideoProcessor {
    pub fn new() -> Self {
        Self {
            video_duration: None,
            no_video_track: false,
            fail_split: false,
        }
    }

    /// Overrides the duration reported for the video track; defaults to the
    /// audio track's duration.
    pub fn with_video_duration(mut self, seconds: f64) -> Self {
        self.video_duration = Some(seconds);
        self
    }

    /// Makes the split report an input without a video track.
    pub fn without_video_track(mut self) -> Self {
        self.no_video_track = true;
        self
    }

    /// Makes the split fail, simulating a corrupt container.
    pub fn with_split_failure(mut self) -> Self {
        self.fail_split = true;
        self
    }
}

impl Default for MockVideoProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl VideoProcessor for MockVideoProcessor {
    async fn split_audio_video(&self, input: &Path, output_dir: &Path) -> Result<SplitMedia> {
        if self.fail_split {
            return Err(DubError::InvalidMedia {
                path: input.display().to_string(),
                message: "mock split failure".to_string(),
            });
        }

        let audio_file = output_dir.join("split_audio.wav");
        std::fs::copy(input, &audio_file)?;

        let video_file = if self.no_video_track {
            None
        } else {
            let path = output_dir.join("split_video.mp4");
            std::fs::write(&path, b"mock video track")?;
            Some(path)
        };

        Ok(SplitMedia {
            video_file,
            audio_file,
        })
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        if let Some(duration) = self.video_duration {
            return Ok(duration);
        }
        // Fall back to the audio duration recorded at split time.
        let audio = path.parent().map(|dir| dir.join("split_audio.wav"));
        match audio {
            Some(audio_path) if audio_path.exists() => {
                Ok(AudioTrack::from_wav(&audio_path)?.duration())
            }
            _ => Ok(AudioTrack::from_wav(path)?.duration()),
        }
    }

    async fn combine_audio_video(
        &self,
        _video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<()> {
        std::fs::copy(audio, output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(dir: &Path, name: &str, secs: f64) -> PathBuf {
        let path = dir.join(name);
        AudioTrack::silence(secs, 16_000)
            .to_wav(&path)
            .expect("write wav");
        path
    }

    #[tokio::test]
    async fn test_mock_split_produces_audio_and_video() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_wav(dir.path(), "input.wav", 2.0);

        let split = MockVideoProcessor::new()
            .split_audio_video(&input, dir.path())
            .await
            .expect("split");

        assert!(split.audio_file.exists());
        assert!(split.video_file.as_deref().is_some_and(Path::exists));
    }

    #[tokio::test]
    async fn test_mock_split_without_video_track() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_wav(dir.path(), "input.wav", 1.0);

        let split = MockVideoProcessor::new()
            .without_video_track()
            .split_audio_video(&input, dir.path())
            .await
            .expect("split");
        assert!(split.video_file.is_none());
    }

    #[tokio::test]
    async fn test_mock_split_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_wav(dir.path(), "input.wav", 1.0);

        let result = MockVideoProcessor::new()
            .with_split_failure()
            .split_audio_video(&input, dir.path())
            .await;
        assert!(matches!(result, Err(DubError::InvalidMedia { .. })));
    }

    #[tokio::test]
    async fn test_mock_probe_uses_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write_wav(dir.path(), "input.wav", 2.0);
        let processor = MockVideoProcessor::new().with_video_duration(12.0);
        let split = processor
            .split_audio_video(&input, dir.path())
            .await
            .expect("split");

        let duration = processor
            .probe_duration(split.video_file.as_deref().expect("video"))
            .await
            .expect("probe");
        assert!((duration - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mock_combine_writes_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let audio = write_wav(dir.path(), "dubbed.wav", 1.0);
        let video = dir.path().join("video.mp4");
        std::fs::write(&video, b"v").expect("write");
        let output = dir.path().join("out.mp4");

        MockVideoProcessor::new()
            .combine_audio_video(&video, &audio, &output)
            .await
            .expect("combine");
        assert!(output.exists());
    }
}
