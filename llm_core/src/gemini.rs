//! Gemini `generateContent` client for plain text.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{GenerationError, GenerationParams, TextGenerator};

pub const DEFAULT_SCRIPT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiTextConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiTextConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_SCRIPT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct GeminiTextClient {
    http: reqwest::Client,
    config: GeminiTextConfig,
}

impl std::fmt::Debug for GeminiTextClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTextClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl GeminiTextClient {
    pub fn create(config: GeminiTextConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Unavailable("Gemini API key is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(format!("http client: {e}")))?;
        tracing::info!(model = %config.model, "Gemini text client ready");
        Ok(Self { http, config })
    }

    pub fn close(self) {
        tracing::debug!(model = %self.config.model, "closing Gemini text client");
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model.trim_start_matches("models/")
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiTextClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let body = GenerateRequest::new(prompt, params);
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let msg = format!("HTTP {}: {}", status.as_u16(), detail.trim());
            return Err(match status.as_u16() {
                401 | 403 | 408 | 429 | 500..=599 => GenerationError::Unavailable(msg),
                _ => GenerationError::Provider(msg),
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        let text = parsed.into_text()?;
        tracing::debug!(chars = text.chars().count(), "script generated");
        Ok(text)
    }
}

impl GeminiTextClient {
    fn transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.config.timeout)
        } else if e.is_decode() {
            GenerationError::Provider(format!("unreadable response: {e}"))
        } else {
            GenerationError::Unavailable(e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: &'a GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, params: &'a GenerationParams) -> Self {
        Self {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: params,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts joined in order.
    fn into_text(self) -> Result<String, GenerationError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(GenerationError::Provider(format!("prompt blocked: {reason}")));
        };
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let params = GenerationParams::default();
        let body = serde_json::to_value(GenerateRequest::new("hello", &params)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        let top_p = body["generationConfig"]["topP"].as_f64().unwrap();
        assert!((top_p - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_response_joins_parts() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Speaker1: こんにちは\n" }, { "text": "Speaker2: どうも" }] }
            }]
        });
        let resp: GenerateResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.into_text().unwrap(), "Speaker1: こんにちは\nSpeaker2: どうも");
    }

    #[test]
    fn test_blank_output_is_empty_output() {
        let raw = json!({ "candidates": [{ "content": { "parts": [{ "text": "  \n" }] } }] });
        let resp: GenerateResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(resp.into_text(), Err(GenerationError::EmptyOutput)));

        let raw = json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] });
        let resp: GenerateResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(resp.into_text(), Err(GenerationError::EmptyOutput)));
    }

    #[test]
    fn test_blocked_prompt_is_provider_error() {
        let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let resp: GenerateResponse = serde_json::from_value(raw).unwrap();
        match resp.into_text() {
            Err(GenerationError::Provider(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_create_rejects_empty_key() {
        assert!(matches!(
            GeminiTextClient::create(GeminiTextConfig::new("  ")),
            Err(GenerationError::Unavailable(_))
        ));
    }

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let mut config = GeminiTextConfig::new("k");
        config.model = "models/gemini-2.5-flash".into();
        let client = GeminiTextClient::create(config).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
