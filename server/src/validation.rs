use tts_core::wav::{OUTPUT_EXTENSION, OUTPUT_PREFIX};

use crate::error::ApiError;

/// Maximum outline length for script generation, in characters
const MAX_OUTLINE_LENGTH: usize = 10_000;
/// Maximum script length for audio generation, in characters
const MAX_SCRIPT_LENGTH: usize = 50_000;
const MAX_VOICE_ID_LENGTH: usize = 32;

/// Validate a script-generation outline
pub fn validate_outline(outline: &str) -> Result<(), ApiError> {
    if outline.trim().is_empty() {
        return Err(ApiError::InvalidInput("Outline cannot be empty".to_string()));
    }
    if outline.chars().count() > MAX_OUTLINE_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Outline too long (max {} characters)",
            MAX_OUTLINE_LENGTH
        )));
    }
    Ok(())
}

/// Validate an audio-generation script.
///
/// Blank scripts are left to the pipeline, which reports them as empty input.
pub fn validate_script(script: &str) -> Result<(), ApiError> {
    if script.chars().count() > MAX_SCRIPT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Script too long (max {} characters)",
            MAX_SCRIPT_LENGTH
        )));
    }
    Ok(())
}

/// Validate a voice id such as `kore` (ASCII letters only)
pub fn validate_voice_id(voice: &str) -> Result<(), ApiError> {
    let voice = voice.trim();
    if voice.is_empty() {
        return Ok(());
    }
    if voice.len() > MAX_VOICE_ID_LENGTH || !voice.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::InvalidInput(format!("Invalid voice id: {}", voice)));
    }
    Ok(())
}

/// Validate a requested audio file name (`interview_<digits>[_<n>].wav`)
pub fn validate_audio_file_name(name: &str) -> Result<(), ApiError> {
    let not_found = || ApiError::NotFound(format!("Audio file not found: {}", name));

    let stem = name
        .strip_prefix(OUTPUT_PREFIX)
        .and_then(|rest| rest.strip_suffix(OUTPUT_EXTENSION))
        .and_then(|rest| rest.strip_suffix('.'))
        .ok_or_else(not_found)?;
    if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return Err(not_found());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_outline() {
        assert!(validate_outline("AIと教育の未来について").is_ok());
        assert!(matches!(validate_outline("  \n"), Err(ApiError::InvalidInput(_))));

        let long = "あ".repeat(MAX_OUTLINE_LENGTH + 1);
        if let Err(ApiError::InvalidInput(msg)) = validate_outline(&long) {
            assert!(msg.contains("too long"));
        } else {
            panic!("expected too long");
        }
    }

    #[test]
    fn test_validate_script_allows_blank() {
        assert!(validate_script("").is_ok());
        assert!(validate_script("Speaker1: hi").is_ok());
        assert!(validate_script(&"x".repeat(MAX_SCRIPT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_voice_id() {
        assert!(validate_voice_id("kore").is_ok());
        assert!(validate_voice_id("Charon").is_ok());
        assert!(validate_voice_id("").is_ok());
        assert!(validate_voice_id("../etc").is_err());
        assert!(validate_voice_id("ko re").is_err());
        assert!(validate_voice_id(&"a".repeat(40)).is_err());
    }

    #[test]
    fn test_validate_audio_file_name() {
        assert!(validate_audio_file_name("interview_1700000000.wav").is_ok());
        assert!(validate_audio_file_name("interview_1700000000_2.wav").is_ok());

        for bad in [
            "",
            "interview_.wav",
            "interview_abc.wav",
            "../interview_1.wav",
            "interview_1.wav/..",
            ".interview_1.wav.part",
            "interview_1.mp3",
            "other_1.wav",
        ] {
            assert!(
                matches!(validate_audio_file_name(bad), Err(ApiError::NotFound(_))),
                "{bad:?}"
            );
        }
    }
}
