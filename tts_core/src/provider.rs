//! Speech-synthesis backend contract and its typed response.

use std::io::Cursor;

use async_trait::async_trait;

use crate::error::SynthesisError;
use crate::request::{BatchRequest, SynthesisCapabilities, UtteranceRequest};
use crate::wav::{AudioFormat, AudioPayload};

/// One inline data part returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AudioChunk {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.trim_start().to_ascii_lowercase().starts_with("audio/")
    }

    /// Decode into raw PCM. Accepts linear PCM (`audio/L16`, `audio/pcm`)
    /// and 16-bit integer WAV; anything else yields `None`.
    fn to_payload(&self) -> Option<AudioPayload> {
        if let Some(format) = AudioFormat::from_mime(&self.mime_type) {
            return Some(AudioPayload {
                format,
                pcm: self.data.clone(),
            });
        }

        let essence = self.mime_type.split(';').next()?.trim().to_ascii_lowercase();
        if essence != "audio/wav" && essence != "audio/x-wav" && essence != "audio/wave" {
            return None;
        }
        let reader = hound::WavReader::new(Cursor::new(&self.data)).ok()?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return None;
        }
        let mut pcm = Vec::with_capacity(reader.len() as usize * 2);
        for sample in reader.into_samples::<i16>() {
            pcm.extend_from_slice(&sample.ok()?.to_le_bytes());
        }
        Some(AudioPayload {
            format: AudioFormat {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                bits_per_sample: spec.bits_per_sample,
            },
            pcm,
        })
    }
}

/// Everything a backend returned for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisResponse {
    pub chunks: Vec<AudioChunk>,
}

impl SynthesisResponse {
    pub fn new(chunks: Vec<AudioChunk>) -> Self {
        Self { chunks }
    }

    /// Pull the sample payload out of the response.
    ///
    /// Non-audio parts are ignored. Audio parts are concatenated in order as
    /// long as they share the format of the first decodable one. Fails with
    /// `MalformedResponse` when no audio survives.
    pub fn extract_payload(&self) -> Result<AudioPayload, SynthesisError> {
        let mut merged: Option<AudioPayload> = None;

        for chunk in self.chunks.iter().filter(|c| c.is_audio()) {
            let Some(payload) = chunk.to_payload() else {
                tracing::warn!(mime_type = %chunk.mime_type, "ignoring undecodable audio part");
                continue;
            };
            if payload.pcm.is_empty() {
                continue;
            }
            match merged.as_mut() {
                None => merged = Some(payload),
                Some(acc) if acc.format == payload.format => acc.pcm.extend_from_slice(&payload.pcm),
                Some(acc) => tracing::warn!(
                    expected_rate = acc.format.sample_rate,
                    got_rate = payload.format.sample_rate,
                    "ignoring audio part in a different format"
                ),
            }
        }

        merged.ok_or_else(|| {
            SynthesisError::MalformedResponse(format!(
                "no usable audio among {} part(s)",
                self.chunks.len()
            ))
        })
    }
}

/// A speech-synthesis backend.
///
/// Implementations own their connection state; one instance is shared by
/// all pipeline runs.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> SynthesisCapabilities;

    /// Render a whole multi-speaker transcript in one call.
    async fn synthesize_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<SynthesisResponse, SynthesisError>;

    /// Render a single utterance with a single voice.
    async fn synthesize_utterance(
        &self,
        request: &UtteranceRequest,
    ) -> Result<SynthesisResponse, SynthesisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const L16: &str = "audio/L16;codec=pcm;rate=24000";

    #[test]
    fn test_extract_single_pcm_chunk() {
        let resp = SynthesisResponse::new(vec![AudioChunk::new(L16, vec![1, 0, 2, 0])]);
        let payload = resp.extract_payload().unwrap();
        assert_eq!(payload.format, AudioFormat::default());
        assert_eq!(payload.pcm, vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_extract_skips_text_and_concatenates_audio() {
        let resp = SynthesisResponse::new(vec![
            AudioChunk::new("text/plain", b"hello".to_vec()),
            AudioChunk::new(L16, vec![1, 0]),
            AudioChunk::new("audio/L16;rate=16000", vec![9, 9]),
            AudioChunk::new("AUDIO/L16;codec=pcm;rate=24000", vec![2, 0]),
        ]);
        let payload = resp.extract_payload().unwrap();
        assert_eq!(payload.pcm, vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_extract_decodes_wav_chunk() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            w.write_sample(7i16).unwrap();
            w.write_sample(-7i16).unwrap();
            w.finalize().unwrap();
        }
        let resp = SynthesisResponse::new(vec![AudioChunk::new("audio/wav", cursor.into_inner())]);
        let payload = resp.extract_payload().unwrap();
        assert_eq!(payload.format.sample_rate, 22_050);
        assert_eq!(payload.pcm, [7i16.to_le_bytes(), (-7i16).to_le_bytes()].concat());
    }

    #[test]
    fn test_extract_fails_without_audio() {
        let empty = SynthesisResponse::default();
        assert!(matches!(
            empty.extract_payload(),
            Err(SynthesisError::MalformedResponse(_))
        ));

        let no_audio = SynthesisResponse::new(vec![
            AudioChunk::new("text/plain", b"sorry".to_vec()),
            AudioChunk::new(L16, vec![]),
            AudioChunk::new("audio/mpeg", vec![0xff, 0xfb]),
        ]);
        assert!(matches!(
            no_audio.extract_payload(),
            Err(SynthesisError::MalformedResponse(_))
        ));
    }
}
