use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tts_core::{PipelineError, SynthesisMode, VoiceAssignment};

use crate::error::ApiError;
use crate::metrics::{
    DetailedMetricsResponse, EndpointMetrics, EndpointMetricsResponse, SystemMetrics,
};
use crate::validation::{
    validate_audio_file_name, validate_outline, validate_script, validate_voice_id,
};
use crate::voices::{self, VoiceInfo};
use crate::AppState;

#[derive(Deserialize)]
pub struct GenerateScriptRequest {
    #[serde(default, alias = "outline")]
    pub constitution: String,
}

#[derive(Serialize, Deserialize)]
pub struct GenerateScriptResponse {
    pub script: String,
}

#[derive(Deserialize)]
pub struct GenerateAudioRequest {
    #[serde(default)]
    pub script: String,
    pub voice1: Option<String>,
    pub voice2: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct GenerateAudioResponse {
    pub audio_file_name: String,
    pub message: String,
    pub utterances: usize,
    pub dropped_lines: usize,
    pub failed_utterances: usize,
    pub mode: SynthesisMode,
    pub duration_ms: u64,
}

#[derive(Serialize)]
pub struct VoicesResponse {
    pub voices: &'static [VoiceInfo],
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_voices() -> Json<VoicesResponse> {
    Json(VoicesResponse {
        voices: voices::VOICES,
    })
}

fn observe<T>(metrics: &EndpointMetrics, started: Instant, result: &Result<T, ApiError>) {
    metrics.record_request(started.elapsed().as_millis() as u64);
    if result.is_err() {
        metrics.record_error();
    }
}

pub async fn generate_script(
    State(state): State<AppState>,
    Json(req): Json<GenerateScriptRequest>,
) -> Result<Json<GenerateScriptResponse>, ApiError> {
    let started = Instant::now();
    let result: Result<GenerateScriptResponse, ApiError> = async {
        validate_outline(&req.constitution)?;
        let generator = state
            .generator
            .as_ref()
            .ok_or(ApiError::NotConfigured("script generation"))?;

        let prompt = llm_core::interview_prompt(&req.constitution);
        let script = tokio::time::timeout(
            state.config.llm_timeout(),
            generator.generate(&prompt, &state.generation_params),
        )
        .await
        .map_err(|_| llm_core::GenerationError::Timeout(state.config.llm_timeout()))??;

        info!(
            outline_chars = req.constitution.chars().count(),
            script_chars = script.chars().count(),
            "interview script generated"
        );
        Ok(GenerateScriptResponse { script })
    }
    .await;

    observe(&state.metrics.generate_script, started, &result);
    result.map(Json)
}

pub async fn generate_audio(
    State(state): State<AppState>,
    Json(req): Json<GenerateAudioRequest>,
) -> Result<Json<GenerateAudioResponse>, ApiError> {
    let started = Instant::now();
    let result: Result<GenerateAudioResponse, ApiError> = async {
        validate_script(&req.script)?;
        for voice in [&req.voice1, &req.voice2].into_iter().flatten() {
            validate_voice_id(voice)?;
            if !voice.trim().is_empty() && voices::find(voice).is_none() {
                warn!(voice = %voice, "voice is not in the catalog, passing it through");
            }
        }
        if req.script.trim().is_empty() {
            return Err(PipelineError::EmptyInput { dropped_lines: 0 }.into());
        }
        let pipeline = state
            .pipeline
            .as_ref()
            .ok_or(ApiError::NotConfigured("speech synthesis"))?;

        let assignment = VoiceAssignment::from_request(req.voice1.as_deref(), req.voice2.as_deref());
        let outcome = match pipeline.run(&req.script, &assignment).await {
            Ok(outcome) => {
                state.metrics.pipeline.record_success(&outcome);
                outcome
            }
            Err(e) => {
                state.metrics.pipeline.record_failure(&e);
                return Err(e.into());
            }
        };

        Ok(GenerateAudioResponse {
            message: format!(
                "Audio generated from {} of {} utterance(s)",
                outcome.utterances - outcome.failed_utterances,
                outcome.utterances
            ),
            audio_file_name: outcome.file_name,
            utterances: outcome.utterances,
            dropped_lines: outcome.dropped_lines,
            failed_utterances: outcome.failed_utterances,
            mode: outcome.mode,
            duration_ms: outcome.duration_ms,
        })
    }
    .await;

    observe(&state.metrics.generate_audio, started, &result);
    result.map(Json)
}

pub async fn serve_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_audio_file_name(&filename)?;
    let path = state
        .audio
        .path_for(&filename)
        .ok_or_else(|| ApiError::NotFound(format!("Audio file not found: {}", filename)))?;

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "audio/wav")], bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound(format!("Audio file not found: {}", filename)))
        }
        Err(e) => Err(ApiError::InternalError(format!("reading {}: {}", filename, e))),
    }
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<DetailedMetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|l| l.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    Json(DetailedMetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds: state.started.elapsed().as_secs(),
            system_load,
        },
        endpoints: EndpointMetricsResponse {
            generate_script: state.metrics.generate_script.stats(),
            generate_audio: state.metrics.generate_audio.stats(),
        },
        pipeline: state.metrics.pipeline.stats(),
    })
}
