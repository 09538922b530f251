//! Reassembly: rebuild a full-duration audio track from per-segment dubbed
//! or original audio, then align it to the video duration.

use crate::media::track::AudioTrack;
use crate::utterance::Utterance;
use tracing::{debug, warn};

/// Builds the dubbed track for a job.
///
/// Starts from silence matching the original track's duration, then overlays,
/// in order: the synthesized chunk for every utterance eligible for dubbing,
/// or the original audio slice for the same span otherwise. A failure on a
/// single utterance is logged and skipped; it never fails the whole job.
pub fn build_dubbed_track(utterances: &[Utterance], original: &AudioTrack) -> AudioTrack {
    let mut dubbed = AudioTrack::silence(original.duration(), original.sample_rate());

    for utterance in utterances {
        if let Err(message) = overlay_utterance(&mut dubbed, utterance, original) {
            warn!(
                start = utterance.start,
                end = utterance.end,
                speaker = %utterance.speaker_id,
                "skipping segment during reassembly: {message}"
            );
        }
    }

    dubbed
}

fn overlay_utterance(
    dubbed: &mut AudioTrack,
    utterance: &Utterance,
    original: &AudioTrack,
) -> Result<(), String> {
    if utterance.for_dubbing {
        let path = utterance
            .dubbed_path
            .as_deref()
            .ok_or("eligible utterance has no synthesized chunk")?;
        let chunk = AudioTrack::from_wav(path).map_err(|e| e.to_string())?;
        debug!(
            path = %path.display(),
            position = utterance.start,
            "overlaying synthesized chunk"
        );
        dubbed.overlay(&chunk, utterance.start);
    } else {
        let chunk = original.slice(utterance.start, utterance.end);
        dubbed.overlay(&chunk, utterance.start);
    }
    Ok(())
}

/// Aligns the dubbed track to the video duration: pads with trailing silence
/// when shorter, truncates when longer.
pub fn align_to_video(track: &mut AudioTrack, video_duration: f64) {
    let before = track.duration();
    track.align_to(video_duration);
    if (before - video_duration).abs() > 1e-6 {
        debug!(
            audio_secs = before,
            video_secs = video_duration,
            "aligned dubbed track to video duration"
        );
    }
}
