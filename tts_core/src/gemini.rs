//! Gemini `generateContent` speech backend.
//!
//! Audio comes back base64-encoded in `candidates[].content.parts[].inlineData`
//! as raw `audio/L16;codec=pcm;rate=24000`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;
use crate::provider::{AudioChunk, SpeechSynthesizer, SynthesisResponse};
use crate::request::{BatchRequest, SpeakerVoice, SynthesisCapabilities, UtteranceRequest};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
/// Gemini renders at most two named speakers per request.
pub const MAX_SPEAKERS: usize = 2;

#[derive(Debug, Clone)]
pub struct GeminiTtsConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Allow one multi-speaker request for the whole transcript.
    pub multi_speaker: bool,
    pub connect_timeout: Duration,
}

impl GeminiTtsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_TTS_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            multi_speaker: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GeminiTts {
    http: reqwest::Client,
    config: GeminiTtsConfig,
}

impl std::fmt::Debug for GeminiTts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTts")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .field("multi_speaker", &self.config.multi_speaker)
            .finish()
    }
}

impl GeminiTts {
    pub fn create(config: GeminiTtsConfig) -> Result<Self, SynthesisError> {
        if config.api_key.trim().is_empty() {
            return Err(SynthesisError::Unavailable("Gemini API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SynthesisError::Unavailable(format!("http client: {e}")))?;
        tracing::info!(model = %config.model, multi_speaker = config.multi_speaker, "Gemini TTS client ready");
        Ok(Self { http, config })
    }

    /// Release the connection pool.
    pub fn close(self) {
        tracing::debug!(model = %self.config.model, "closing Gemini TTS client");
    }

    fn endpoint(&self) -> String {
        let model = self.config.model.trim_start_matches("models/");
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(
        &self,
        body: &GenerateContentRequest<'_>,
        timeout: Duration,
    ) -> Result<SynthesisResponse, SynthesisError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| timeout_or(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(status, &detail));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| timeout_or(e, timeout))?;
        parsed.into_synthesis_response()
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiTts {
    fn name(&self) -> &str {
        "gemini"
    }

    fn capabilities(&self) -> SynthesisCapabilities {
        if self.config.multi_speaker {
            SynthesisCapabilities::multi_speaker(MAX_SPEAKERS)
        } else {
            SynthesisCapabilities::SINGLE_SPEAKER
        }
    }

    async fn synthesize_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<SynthesisResponse, SynthesisError> {
        let prompt = batch_prompt(request);
        let voice_names: Vec<String> = request.speakers.iter().map(|s| api_voice_name(&s.voice)).collect();
        let body = GenerateContentRequest::batch(&prompt, &request.speakers, &voice_names);
        self.generate(&body, request.timeout).await
    }

    async fn synthesize_utterance(
        &self,
        request: &UtteranceRequest,
    ) -> Result<SynthesisResponse, SynthesisError> {
        let voice = api_voice_name(&request.voice);
        let body = GenerateContentRequest::single(&request.text, &voice);
        self.generate(&body, request.timeout).await
    }
}

fn timeout_or(e: reqwest::Error, timeout: Duration) -> SynthesisError {
    if e.is_timeout() {
        SynthesisError::Timeout(timeout)
    } else {
        SynthesisError::from(e)
    }
}

fn status_error(status: reqwest::StatusCode, detail: &str) -> SynthesisError {
    let msg = format!("HTTP {}: {}", status.as_u16(), detail.trim());
    match status.as_u16() {
        401 | 403 => SynthesisError::Unavailable(format!("authentication failed, {msg}")),
        408 | 429 => SynthesisError::Unavailable(msg),
        400..=499 => SynthesisError::Rejected(msg),
        _ => SynthesisError::Unavailable(msg),
    }
}

/// Gemini's prebuilt voices are capitalised (`Kore`, `Charon`).
fn api_voice_name(voice_id: &str) -> String {
    let mut chars = voice_id.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn batch_prompt(request: &BatchRequest) -> String {
    let names: Vec<&str> = request.speakers.iter().map(|s| s.speaker.as_str()).collect();
    match names.as_slice() {
        [a, b] => format!(
            "TTS the following conversation between {a} and {b}:\n{}",
            request.transcript
        ),
        _ => request.transcript.clone(),
    }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_config: Option<VoiceConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multi_speaker_voice_config: Option<MultiSpeakerVoiceConfig<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MultiSpeakerVoiceConfig<'a> {
    speaker_voice_configs: Vec<SpeakerVoiceConfig<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeakerVoiceConfig<'a> {
    speaker: &'a str,
    voice_config: VoiceConfig<'a>,
}

impl<'a> VoiceConfig<'a> {
    fn prebuilt(voice_name: &'a str) -> Self {
        Self {
            prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
        }
    }
}

impl<'a> GenerateContentRequest<'a> {
    fn with_speech(text: &'a str, speech_config: SpeechConfig<'a>) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![TextPart { text }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config,
            },
        }
    }

    fn single(text: &'a str, voice_name: &'a str) -> Self {
        Self::with_speech(
            text,
            SpeechConfig {
                voice_config: Some(VoiceConfig::prebuilt(voice_name)),
                multi_speaker_voice_config: None,
            },
        )
    }

    /// `voice_names[i]` is the API voice for `speakers[i]`. A transcript with
    /// a single speaker is sent with a plain voice config.
    fn batch(text: &'a str, speakers: &'a [SpeakerVoice], voice_names: &'a [String]) -> Self {
        if speakers.len() < 2 {
            let voice = voice_names.first().map(String::as_str).unwrap_or_default();
            return Self::single(text, voice);
        }
        let speaker_voice_configs = speakers
            .iter()
            .zip(voice_names)
            .map(|(s, v)| SpeakerVoiceConfig {
                speaker: &s.speaker,
                voice_config: VoiceConfig::prebuilt(v),
            })
            .collect();
        Self::with_speech(
            text,
            SpeechConfig {
                voice_config: None,
                multi_speaker_voice_config: Some(MultiSpeakerVoiceConfig {
                    speaker_voice_configs,
                }),
            },
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateContentResponse {
    fn into_synthesis_response(self) -> Result<SynthesisResponse, SynthesisError> {
        if self.candidates.is_empty() {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(SynthesisError::MalformedResponse(reason));
        }

        let mut chunks = Vec::new();
        for candidate in self.candidates {
            let Some(content) = candidate.content else {
                tracing::debug!(finish_reason = ?candidate.finish_reason, "candidate without content");
                continue;
            };
            for part in content.parts {
                if let Some(inline) = part.inline_data {
                    let data = base64::engine::general_purpose::STANDARD
                        .decode(inline.data.as_bytes())
                        .map_err(|e| SynthesisError::MalformedResponse(format!("inline data is not base64: {e}")))?;
                    chunks.push(AudioChunk::new(inline.mime_type, data));
                } else if let Some(text) = part.text {
                    chunks.push(AudioChunk::new("text/plain", text.into_bytes()));
                }
            }
        }
        Ok(SynthesisResponse::new(chunks))
    }
}
