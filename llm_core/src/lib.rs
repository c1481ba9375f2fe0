//! Text generation for interview scripts.

mod gemini;
mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use gemini::{GeminiTextClient, GeminiTextConfig, DEFAULT_SCRIPT_MODEL};
pub use prompt::interview_prompt;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Service unreachable, unauthenticated, rate limited or failing.
    #[error("text generation service unavailable: {0}")]
    Unavailable(String),

    #[error("text generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Request refused or response not understood.
    #[error("text generation failed: {0}")]
    Provider(String),

    #[error("text generation returned no text")]
    EmptyOutput,
}

/// Sampling settings sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.8,
            max_output_tokens: 2048,
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Complete `prompt`. Returns non-empty text or an error.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}
