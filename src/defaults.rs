//! Shared defaults used across configuration and the pipeline.

/// Maximum number of concurrently executing pipeline jobs.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Sample rate all extracted audio tracks and synthesized chunks use.
pub const SAMPLE_RATE: u32 = 16_000;

/// Directory final and intermediate files are written to.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "output";

/// Sentinel used to join utterance texts into one translatable script.
/// Must never appear in normal transcribed text.
pub const SCRIPT_BREAK_MARKER: &str = "<BREAK>";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_marker_is_not_plain_text() {
        assert!(SCRIPT_BREAK_MARKER.starts_with('<'));
        assert!(SCRIPT_BREAK_MARKER.ends_with('>'));
    }

    #[test]
    fn test_sample_rate() {
        assert_eq!(SAMPLE_RATE, 16_000);
    }
}
