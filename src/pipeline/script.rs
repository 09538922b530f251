//! Batched-script translation protocol.
//!
//! All transcripts of a job travel to the translation engine in one round
//! trip, joined by a sentinel marker the engine is expected to pass through
//! unchanged. Splitting the response back must yield exactly as many
//! segments as went in; anything else means the engine mangled the script
//! and the job cannot proceed.

use crate::defaults::SCRIPT_BREAK_MARKER;
use crate::error::{DubError, Result};

/// Joins transcripts into one translation script:
/// `<BREAK>text1<BREAK>text2<BREAK>`.
pub fn build_script(transcripts: &[String]) -> String {
    let mut script = String::from(SCRIPT_BREAK_MARKER);
    for text in transcripts {
        script.push_str(text);
        script.push_str(SCRIPT_BREAK_MARKER);
    }
    script
}

/// Splits a translated script back into per-utterance segments, trimming
/// surrounding whitespace.
///
/// Fails with [`DubError::AlignmentMismatch`] when the segment count differs
/// from `expected`.
pub fn split_translated_script(script: &str, expected: usize) -> Result<Vec<String>> {
    let stripped = script.strip_prefix(SCRIPT_BREAK_MARKER).unwrap_or(script);
    let inner = stripped.strip_suffix(SCRIPT_BREAK_MARKER).unwrap_or(stripped);

    let segments: Vec<String> = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner
            .split(SCRIPT_BREAK_MARKER)
            .map(|s| s.trim().to_string())
            .collect()
    };

    if segments.len() != expected {
        return Err(DubError::AlignmentMismatch {
            expected,
            actual: segments.len(),
        });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_roundtrip_preserves_order() {
        let transcripts = vec![
            "good morning".to_string(),
            "how are you".to_string(),
            "goodbye".to_string(),
        ];
        let script = build_script(&transcripts);
        assert_eq!(script, "<BREAK>good morning<BREAK>how are you<BREAK>goodbye<BREAK>");

        let segments = split_translated_script(&script, 3).expect("split");
        assert_eq!(segments, transcripts);
    }

    #[test]
    fn test_split_trims_whitespace() {
        let segments =
            split_translated_script("<BREAK> bon dia <BREAK>adeu \n<BREAK>", 2).expect("split");
        assert_eq!(segments, vec!["bon dia".to_string(), "adeu".to_string()]);
    }

    #[test]
    fn test_split_keeps_empty_segments() {
        // An engine may translate a segment to nothing; the slot must survive
        // so alignment holds.
        let segments = split_translated_script("<BREAK>hola<BREAK><BREAK>adeu<BREAK>", 3)
            .expect("split");
        assert_eq!(segments[1], "");
    }

    #[test]
    fn test_count_mismatch_is_fatal() {
        let result = split_translated_script("<BREAK>only one<BREAK>", 2);
        match result {
            Err(DubError::AlignmentMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected AlignmentMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_trailing_marker_still_aligns() {
        // Engines occasionally drop the final sentinel; the leading strip
        // must not undo itself when the trailing strip finds nothing.
        let segments = split_translated_script("<BREAK>bon dia<BREAK>adeu", 2).expect("split");
        assert_eq!(segments, vec!["bon dia".to_string(), "adeu".to_string()]);
    }

    #[test]
    fn test_missing_leading_marker_still_aligns() {
        let segments = split_translated_script("bon dia<BREAK>adeu<BREAK>", 2).expect("split");
        assert_eq!(segments, vec!["bon dia".to_string(), "adeu".to_string()]);
    }

    #[test]
    fn test_empty_input_builds_bare_marker() {
        let script = build_script(&[]);
        assert_eq!(script, "<BREAK>");
        let segments = split_translated_script(&script, 0).expect("split");
        assert!(segments.is_empty());
    }
}
