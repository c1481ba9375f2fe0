//! Common utilities for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, Response},
    Router,
};
use interview_server::{build_router, config::ServerConfig, AppState};
use llm_core::{GenerationError, GenerationParams, TextGenerator};
use serde_json::Value;
use tts_core::{
    AudioChunk, BatchRequest, Pipeline, SpeechSynthesizer, SynthesisCapabilities, SynthesisError,
    SynthesisResponse, UtteranceRequest,
};

/// Returns a canned script, or an error when `reply` is `None`.
pub struct FakeGenerator {
    pub reply: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(prompt.contains("Speaker1"));
        match &self.reply {
            Some(text) if text.trim().is_empty() => Err(GenerationError::EmptyOutput),
            Some(text) => Ok(text.clone()),
            None => Err(GenerationError::Unavailable("connection refused".into())),
        }
    }
}

/// Per-utterance synthesizer: utterance `i` becomes the single sample `i + 1`,
/// unless its text is `fail`.
pub struct FakeSynth {
    pub calls: AtomicUsize,
}

impl FakeSynth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    fn name(&self) -> &str {
        "fake"
    }

    fn capabilities(&self) -> SynthesisCapabilities {
        SynthesisCapabilities::SINGLE_SPEAKER
    }

    async fn synthesize_batch(&self, _request: &BatchRequest) -> Result<SynthesisResponse, SynthesisError> {
        Err(SynthesisError::Rejected("batch not supported".into()))
    }

    async fn synthesize_utterance(
        &self,
        request: &UtteranceRequest,
    ) -> Result<SynthesisResponse, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.text == "fail" {
            return Err(SynthesisError::Rejected("voice not available".into()));
        }
        let sample = (request.sequence_index as i16 + 1).to_le_bytes().to_vec();
        Ok(SynthesisResponse::new(vec![AudioChunk::new(
            "audio/L16;codec=pcm;rate=24000",
            sample,
        )]))
    }
}

pub fn test_config(audio_dir: &Path) -> ServerConfig {
    ServerConfig {
        audio_dir: audio_dir.to_path_buf(),
        synthesis_timeout_secs: 5,
        pipeline_timeout_secs: 10,
        ..ServerConfig::default()
    }
}

/// Router backed by fakes, writing audio into `audio_dir`.
pub fn create_test_app(
    audio_dir: &Path,
    generator: Option<Arc<FakeGenerator>>,
    synth: Option<Arc<FakeSynth>>,
) -> Router {
    let config = test_config(audio_dir);
    let pipeline = synth.map(|s| Arc::new(Pipeline::new(s, config.pipeline_config())));
    let generator = generator.map(|g| g as Arc<dyn TextGenerator>);
    build_router(AppState::new(config, generator, pipeline))
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
