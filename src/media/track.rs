//! In-memory mono audio track with the pure cut/overlay/align operations the
//! reassembly algorithm is built from.

use crate::error::{DubError, Result};
use std::path::Path;

/// Mono 16-bit PCM audio held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioTrack {
    /// Creates a track from raw samples.
    pub fn from_samples(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Creates a silent track of the given duration.
    pub fn silence(duration_secs: f64, sample_rate: u32) -> Self {
        let len = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self {
            samples: vec![0; len],
            sample_rate,
        }
    }

    /// Reads a WAV file. Multi-channel input is downmixed to mono by
    /// averaging channels.
    pub fn from_wav(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(|e| DubError::Audio {
            message: format!("failed to open {}: {e}", path.display()),
        })?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(DubError::Audio {
                message: format!(
                    "{}: expected 16-bit PCM, got {:?}/{} bits",
                    path.display(),
                    spec.sample_format,
                    spec.bits_per_sample
                ),
            });
        }
        let channels = spec.channels.max(1) as usize;
        let interleaved: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| DubError::Audio {
                message: format!("failed to decode {}: {e}", path.display()),
            })?;

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Writes the track as a mono 16-bit PCM WAV file.
    pub fn to_wav(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).map_err(|e| DubError::Audio {
            message: format!("failed to create {}: {e}", path.display()),
        })?;
        for &sample in &self.samples {
            writer.write_sample(sample).map_err(|e| DubError::Audio {
                message: format!("failed to write {}: {e}", path.display()),
            })?;
        }
        writer.finalize().map_err(|e| DubError::Audio {
            message: format!("failed to finalize {}: {e}", path.display()),
        })?;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    fn index_at(&self, seconds: f64) -> usize {
        ((seconds.max(0.0) * self.sample_rate as f64).round() as usize).min(self.samples.len())
    }

    /// Copies out the `[start, end)` span in seconds, clamped to the track.
    pub fn slice(&self, start: f64, end: f64) -> AudioTrack {
        let from = self.index_at(start);
        let to = self.index_at(end).max(from);
        AudioTrack {
            samples: self.samples[from..to].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    /// Mixes `chunk` into this track starting at `position` seconds, using
    /// saturating addition. Samples that would fall past the end of this
    /// track are dropped; the base track never grows.
    pub fn overlay(&mut self, chunk: &AudioTrack, position: f64) {
        let offset = self.index_at(position);
        for (i, &sample) in chunk.samples.iter().enumerate() {
            let Some(slot) = self.samples.get_mut(offset + i) else {
                break;
            };
            *slot = slot.saturating_add(sample);
        }
    }

    /// Pads with trailing silence or truncates so the track lasts exactly
    /// `duration` seconds.
    pub fn align_to(&mut self, duration: f64) {
        let target = (duration.max(0.0) * self.sample_rate as f64).round() as usize;
        self.samples.resize(target, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_has_requested_duration() {
        let track = AudioTrack::silence(2.5, 16_000);
        assert_eq!(track.len(), 40_000);
        assert!((track.duration() - 2.5).abs() < 1e-9);
        assert!(track.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_slice_is_clamped() {
        let track = AudioTrack::from_samples(vec![7; 16_000], 16_000);
        let cut = track.slice(0.5, 10.0);
        assert_eq!(cut.len(), 8_000);
        assert!(cut.samples().iter().all(|&s| s == 7));

        let empty = track.slice(5.0, 6.0);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_slice_inverted_range_is_empty() {
        let track = AudioTrack::from_samples(vec![1; 16_000], 16_000);
        assert!(track.slice(0.8, 0.2).is_empty());
    }

    #[test]
    fn test_overlay_mixes_at_position() {
        let mut base = AudioTrack::silence(1.0, 1_000);
        let chunk = AudioTrack::from_samples(vec![100; 200], 1_000);
        base.overlay(&chunk, 0.5);

        assert_eq!(base.samples()[499], 0);
        assert_eq!(base.samples()[500], 100);
        assert_eq!(base.samples()[699], 100);
        assert_eq!(base.samples()[700], 0);
        // Base length unchanged
        assert_eq!(base.len(), 1_000);
    }

    #[test]
    fn test_overlay_saturates_and_never_grows() {
        let mut base = AudioTrack::from_samples(vec![i16::MAX; 100], 1_000);
        let chunk = AudioTrack::from_samples(vec![1_000; 500], 1_000);
        base.overlay(&chunk, 0.05);

        assert_eq!(base.len(), 100);
        assert!(base.samples()[50..].iter().all(|&s| s == i16::MAX));
    }

    #[test]
    fn test_align_to_pads_with_silence() {
        let mut track = AudioTrack::from_samples(vec![5; 1_000], 1_000);
        track.align_to(1.5);
        assert_eq!(track.len(), 1_500);
        assert!(track.samples()[1_000..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_align_to_truncates() {
        let mut track = AudioTrack::from_samples(vec![5; 2_000], 1_000);
        track.align_to(0.75);
        assert_eq!(track.len(), 750);
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..16_000).map(|i| ((i % 100) * 50) as i16).collect();
        let track = AudioTrack::from_samples(samples.clone(), 16_000);
        track.to_wav(&path).expect("write");

        let loaded = AudioTrack::from_wav(&path).expect("read");
        assert_eq!(loaded.sample_rate(), 16_000);
        assert_eq!(loaded.samples(), samples.as_slice());
    }

    #[test]
    fn test_from_wav_missing_file_is_audio_error() {
        let result = AudioTrack::from_wav(Path::new("/nonexistent/nope.wav"));
        match result {
            Err(DubError::Audio { message }) => {
                assert!(message.contains("nope.wav"));
            }
            other => panic!("expected Audio error, got {other:?}"),
        }
    }
}
