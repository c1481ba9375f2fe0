use serde::{Deserialize, Serialize};

/// Voice used for the first speaker when the caller does not pick one.
pub const DEFAULT_PRIMARY_VOICE: &str = "aoede";
/// Voice used for the second speaker when the caller does not pick one.
pub const DEFAULT_SECONDARY_VOICE: &str = "charon";

/// Substrings identifying the first speaker, checked before the secondary ones.
pub const PRIMARY_MARKERS: &[&str] = &["Speaker1", "1"];
/// Substrings identifying the second speaker.
pub const SECONDARY_MARKERS: &[&str] = &["Speaker2", "2"];

/// Two-slot speaker to voice assignment for one run.
///
/// Labels that match neither slot fall back to the primary voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAssignment {
    pub primary: String,
    pub secondary: String,
}

impl Default for VoiceAssignment {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY_VOICE, DEFAULT_SECONDARY_VOICE)
    }
}

impl VoiceAssignment {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Build from optional caller input, filling blanks with the defaults.
    pub fn from_request(primary: Option<&str>, secondary: Option<&str>) -> Self {
        let pick = |v: Option<&str>, default: &str| {
            v.map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            primary: pick(primary, DEFAULT_PRIMARY_VOICE),
            secondary: pick(secondary, DEFAULT_SECONDARY_VOICE),
        }
    }

    /// Resolve the voice for a speaker label. Total: never fails.
    pub fn resolve(&self, speaker_label: &str) -> &str {
        resolve_voice(speaker_label, self)
    }
}

/// Which slot a speaker label falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerSlot {
    Primary,
    Secondary,
    Fallback,
}

pub fn speaker_slot(speaker_label: &str) -> SpeakerSlot {
    if PRIMARY_MARKERS.iter().any(|m| speaker_label.contains(m)) {
        SpeakerSlot::Primary
    } else if SECONDARY_MARKERS.iter().any(|m| speaker_label.contains(m)) {
        SpeakerSlot::Secondary
    } else {
        SpeakerSlot::Fallback
    }
}

/// Map a speaker label to exactly one voice identifier.
pub fn resolve_voice<'a>(speaker_label: &str, voices: &'a VoiceAssignment) -> &'a str {
    match speaker_slot(speaker_label) {
        SpeakerSlot::Primary | SpeakerSlot::Fallback => &voices.primary,
        SpeakerSlot::Secondary => &voices.secondary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_voice_table() {
        let voices = VoiceAssignment::new("kore", "charon");
        let cases = [
            ("Speaker1", "kore", SpeakerSlot::Primary),
            ("Speaker2", "charon", SpeakerSlot::Secondary),
            ("Host 1", "kore", SpeakerSlot::Primary),
            ("Guest 2", "charon", SpeakerSlot::Secondary),
            // primary marker is checked first
            ("Speaker12", "kore", SpeakerSlot::Primary),
            ("Speaker21", "kore", SpeakerSlot::Primary),
            ("Interviewer", "kore", SpeakerSlot::Fallback),
            ("", "kore", SpeakerSlot::Fallback),
            ("speaker2", "charon", SpeakerSlot::Secondary),
            ("Speaker3", "kore", SpeakerSlot::Fallback),
        ];
        for (label, voice, slot) in cases {
            assert_eq!(resolve_voice(label, &voices), voice, "label {label:?}");
            assert_eq!(speaker_slot(label), slot, "label {label:?}");
        }
    }

    #[test]
    fn test_resolve_is_pure() {
        let voices = VoiceAssignment::new("kore", "charon");
        let before = voices.clone();
        for _ in 0..3 {
            assert_eq!(voices.resolve("Speaker2"), "charon");
        }
        assert_eq!(voices, before);
    }

    #[test]
    fn test_from_request_defaults() {
        let v = VoiceAssignment::from_request(None, Some("  "));
        assert_eq!(v, VoiceAssignment::default());

        let v = VoiceAssignment::from_request(Some(" kore "), Some("fenrir"));
        assert_eq!(v.primary, "kore");
        assert_eq!(v.secondary, "fenrir");
    }
}
