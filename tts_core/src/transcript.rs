//! Speaker-tagged transcript parsing.
//!
//! A transcript is plain text with one turn per line, `label: text`. Lines
//! without a separator or with nothing after it are dropped, never rejected;
//! the number of dropped lines is reported alongside the utterances.

use serde::Serialize;

use crate::error::PipelineError;

/// Separator between the speaker label and the spoken text.
pub const SPEAKER_SEPARATOR: char = ':';

/// One speaker's line of dialogue and its position in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    pub speaker_label: String,
    pub text: String,
    pub sequence_index: usize,
}

/// Result of parsing a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTranscript {
    pub utterances: Vec<Utterance>,
    /// Non-blank lines that were skipped (no separator, or empty text).
    pub dropped_lines: usize,
}

impl ParsedTranscript {
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Distinct speaker labels in order of first appearance.
    pub fn speakers(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for u in &self.utterances {
            if !out.contains(&u.speaker_label.as_str()) {
                out.push(&u.speaker_label);
            }
        }
        out
    }

    /// Re-join the utterances as `label: text` lines.
    pub fn to_script(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}{} {}", u.speaker_label, SPEAKER_SEPARATOR, u.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split a raw transcript into ordered utterances.
///
/// `sequence_index` is assigned to surviving utterances only, so it is dense
/// and strictly increasing in line order.
pub fn parse_transcript(raw: &str) -> Result<ParsedTranscript, PipelineError> {
    let mut utterances = Vec::new();
    let mut dropped_lines = 0usize;

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((label, text)) = line.split_once(SPEAKER_SEPARATOR) else {
            dropped_lines += 1;
            continue;
        };
        let text = text.trim();
        if text.is_empty() {
            dropped_lines += 1;
            continue;
        }
        utterances.push(Utterance {
            speaker_label: label.trim().to_string(),
            text: text.to_string(),
            sequence_index: utterances.len(),
        });
    }

    if utterances.is_empty() {
        return Err(PipelineError::EmptyInput { dropped_lines });
    }

    if dropped_lines > 0 {
        tracing::debug!(
            dropped_lines,
            kept = utterances.len(),
            "dropped transcript lines without speaker tag or text"
        );
    }

    Ok(ParsedTranscript {
        utterances,
        dropped_lines,
    })
}
