//! Prebuilt voices offered to clients.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoiceInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub language: &'static str,
}

const fn voice(id: &'static str, name: &'static str) -> VoiceInfo {
    VoiceInfo {
        id,
        name,
        language: "en",
    }
}

pub const VOICES: &[VoiceInfo] = &[
    voice("aoede", "Aoede (英語・女性)"),
    voice("charon", "Charon (英語・男性)"),
    voice("fenrir", "Fenrir (英語・男性)"),
    voice("kore", "Kore (英語・女性)"),
    voice("puck", "Puck (英語・男性)"),
    voice("leda", "Leda (英語・女性)"),
    voice("orus", "Orus (英語・男性)"),
    voice("zephyr", "Zephyr (英語・女性)"),
];

pub fn find(id: &str) -> Option<&'static VoiceInfo> {
    VOICES.iter().find(|v| v.id.eq_ignore_ascii_case(id.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tts_core::voice::{DEFAULT_PRIMARY_VOICE, DEFAULT_SECONDARY_VOICE};

    #[test]
    fn test_catalog_contains_defaults() {
        assert!(find(DEFAULT_PRIMARY_VOICE).is_some());
        assert!(find(DEFAULT_SECONDARY_VOICE).is_some());
        assert_eq!(find(" Kore ").map(|v| v.id), Some("kore"));
        assert!(find("nobody").is_none());
    }
}
