//! Turning a parsed transcript into synthesis requests.
//!
//! Two strategies exist and exactly one is chosen per run:
//! a single multi-speaker batch request when the backend can assign voices
//! per speaker tag itself, otherwise one request per utterance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transcript::ParsedTranscript;
use crate::voice::VoiceAssignment;
use crate::wav::AudioFormat;

/// Longest utterance text (in characters) sent in per-utterance mode.
pub const MAX_UTTERANCE_CHARS: usize = 200;
/// Appended to utterance text cut at [`MAX_UTTERANCE_CHARS`].
pub const TRUNCATION_MARKER: &str = "...";

/// What a synthesis backend can render natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisCapabilities {
    pub multi_speaker: bool,
    /// Upper bound on distinct speakers in one multi-speaker request.
    pub max_speakers: usize,
}

impl SynthesisCapabilities {
    pub const SINGLE_SPEAKER: Self = Self {
        multi_speaker: false,
        max_speakers: 1,
    };

    pub fn multi_speaker(max_speakers: usize) -> Self {
        Self {
            multi_speaker: true,
            max_speakers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    Batch,
    PerUtterance,
}

impl std::fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthesisMode::Batch => f.write_str("batch"),
            SynthesisMode::PerUtterance => f.write_str("per_utterance"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerVoice {
    pub speaker: String,
    pub voice: String,
}

/// Whole transcript in one call; the backend assigns voices by speaker tag.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Normalised `label: text` lines.
    pub transcript: String,
    /// Voice per distinct speaker label, in order of first appearance.
    pub speakers: Vec<SpeakerVoice>,
    pub utterance_count: usize,
    pub format: AudioFormat,
    pub timeout: Duration,
}

/// One utterance rendered with one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRequest {
    pub sequence_index: usize,
    pub speaker_label: String,
    pub text: String,
    pub voice: String,
    pub truncated: bool,
    pub format: AudioFormat,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisPlan {
    Batch(BatchRequest),
    PerUtterance(Vec<UtteranceRequest>),
}

impl SynthesisPlan {
    pub fn mode(&self) -> SynthesisMode {
        match self {
            SynthesisPlan::Batch(_) => SynthesisMode::Batch,
            SynthesisPlan::PerUtterance(_) => SynthesisMode::PerUtterance,
        }
    }

    pub fn request_count(&self) -> usize {
        match self {
            SynthesisPlan::Batch(_) => 1,
            SynthesisPlan::PerUtterance(reqs) => reqs.len(),
        }
    }
}

/// Cut `text` to [`MAX_UTTERANCE_CHARS`] characters plus a marker.
///
/// Counts Unicode scalar values, not bytes. Returns whether it was cut.
pub fn truncate_utterance(text: &str) -> (String, bool) {
    match text.char_indices().nth(MAX_UTTERANCE_CHARS) {
        Some((byte_end, _)) => {
            let mut cut = String::with_capacity(byte_end + TRUNCATION_MARKER.len());
            cut.push_str(&text[..byte_end]);
            cut.push_str(TRUNCATION_MARKER);
            (cut, true)
        }
        None => (text.to_string(), false),
    }
}

/// Choose a strategy for `transcript` and build its requests.
pub fn build_plan(
    transcript: &ParsedTranscript,
    voices: &VoiceAssignment,
    capabilities: SynthesisCapabilities,
    format: AudioFormat,
    timeout: Duration,
) -> SynthesisPlan {
    let speakers = transcript.speakers();

    if capabilities.multi_speaker {
        if speakers.len() <= capabilities.max_speakers {
            return SynthesisPlan::Batch(BatchRequest {
                transcript: transcript.to_script(),
                speakers: speakers
                    .iter()
                    .map(|s| SpeakerVoice {
                        speaker: s.to_string(),
                        voice: voices.resolve(s).to_string(),
                    })
                    .collect(),
                utterance_count: transcript.len(),
                format,
                timeout,
            });
        }
        tracing::warn!(
            speakers = speakers.len(),
            max_speakers = capabilities.max_speakers,
            "too many distinct speakers for one multi-speaker request, synthesizing per utterance"
        );
    }

    let requests = transcript
        .utterances
        .iter()
        .map(|u| {
            let (text, truncated) = truncate_utterance(&u.text);
            if truncated {
                tracing::debug!(sequence_index = u.sequence_index, "utterance text truncated");
            }
            UtteranceRequest {
                sequence_index: u.sequence_index,
                speaker_label: u.speaker_label.clone(),
                text,
                voice: voices.resolve(&u.speaker_label).to_string(),
                truncated,
                format,
                timeout,
            }
        })
        .collect();

    SynthesisPlan::PerUtterance(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::parse_transcript;

    fn plan(raw: &str, caps: SynthesisCapabilities) -> SynthesisPlan {
        build_plan(
            &parse_transcript(raw).unwrap(),
            &VoiceAssignment::new("kore", "charon"),
            caps,
            AudioFormat::default(),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_truncation_boundary() {
        let exact = "あ".repeat(200);
        let (out, cut) = truncate_utterance(&exact);
        assert!(!cut);
        assert_eq!(out, exact);

        let over = "a".repeat(201);
        let (out, cut) = truncate_utterance(&over);
        assert!(cut);
        assert_eq!(out, format!("{}{}", "a".repeat(200), TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), 200 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_truncation_respects_multibyte_chars() {
        let over = "ね".repeat(250);
        let (out, cut) = truncate_utterance(&over);
        assert!(cut);
        assert!(out.starts_with(&"ね".repeat(200)));
        assert!(!out.starts_with(&"ね".repeat(201)));
    }

    #[test]
    fn test_per_utterance_plan_resolves_voices() {
        let p = plan(
            "Speaker1: こんにちは\nSpeaker2: よろしく",
            SynthesisCapabilities::SINGLE_SPEAKER,
        );
        let SynthesisPlan::PerUtterance(reqs) = p else {
            panic!("expected per-utterance plan");
        };
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].voice, "kore");
        assert_eq!(reqs[0].text, "こんにちは");
        assert_eq!(reqs[1].voice, "charon");
        assert_eq!(reqs[1].sequence_index, 1);
        assert_eq!(reqs[1].timeout, Duration::from_secs(30));
        assert_eq!(reqs[1].format, AudioFormat::default());
    }

    #[test]
    fn test_per_utterance_plan_truncates_long_text() {
        let raw = format!("Speaker1: {}\nSpeaker2: short", "x".repeat(300));
        let SynthesisPlan::PerUtterance(reqs) = plan(&raw, SynthesisCapabilities::SINGLE_SPEAKER)
        else {
            panic!("expected per-utterance plan");
        };
        assert!(reqs[0].truncated);
        assert!(reqs[0].text.ends_with(TRUNCATION_MARKER));
        assert!(!reqs[1].truncated);
    }

    #[test]
    fn test_batch_plan_carries_voice_map() {
        let p = plan(
            "Speaker1: hello\nSpeaker2: hi\nSpeaker1: bye",
            SynthesisCapabilities::multi_speaker(2),
        );
        assert_eq!(p.mode(), SynthesisMode::Batch);
        assert_eq!(p.request_count(), 1);
        let SynthesisPlan::Batch(batch) = p else {
            unreachable!()
        };
        assert_eq!(batch.transcript, "Speaker1: hello\nSpeaker2: hi\nSpeaker1: bye");
        assert_eq!(batch.utterance_count, 3);
        assert_eq!(
            batch.speakers,
            vec![
                SpeakerVoice {
                    speaker: "Speaker1".into(),
                    voice: "kore".into()
                },
                SpeakerVoice {
                    speaker: "Speaker2".into(),
                    voice: "charon".into()
                },
            ]
        );
    }

    #[test]
    fn test_batch_does_not_truncate() {
        let raw = format!("Speaker1: {}", "y".repeat(500));
        let SynthesisPlan::Batch(batch) = plan(&raw, SynthesisCapabilities::multi_speaker(2))
        else {
            panic!("expected batch plan");
        };
        assert!(batch.transcript.ends_with(&"y".repeat(500)));
    }

    #[test]
    fn test_too_many_speakers_falls_back_to_per_utterance() {
        let p = plan(
            "A: one\nB: two\nC: three",
            SynthesisCapabilities::multi_speaker(2),
        );
        assert_eq!(p.mode(), SynthesisMode::PerUtterance);
        assert_eq!(p.request_count(), 3);
    }
}
