pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod validation;
pub mod voices;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use llm_core::{GenerationParams, TextGenerator};
use tower_http::limit::RequestBodyLimitLayer;
use tts_core::{AudioStore, Pipeline};

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    /// `None` when no API key is configured.
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub pipeline: Option<Arc<Pipeline>>,
    pub audio: AudioStore,
    pub generation_params: GenerationParams,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub started: Instant,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        generator: Option<Arc<dyn TextGenerator>>,
        pipeline: Option<Arc<Pipeline>>,
    ) -> Self {
        Self {
            generator,
            pipeline,
            audio: AudioStore::new(config.audio_dir.clone()),
            generation_params: GenerationParams::default(),
            metrics: AppMetrics::new(),
            request_count: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
            config,
        }
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    request
        .headers_mut()
        .insert("x-request-id", request_id.clone());
    let mut response = next.run(request).await;
    response.headers_mut().insert("x-request-id", request_id);
    response
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    next.run(request).await
}

/// Application routes with request-id and body-limit layers. Rate limiting,
/// timeouts, CORS and tracing are added by the binary.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/healthz", get(routes::health_check))
        .route("/voices", get(routes::list_voices))
        .route("/generate_script", post(routes::generate_script))
        .route("/generate_audio", post(routes::generate_audio))
        // Metrics endpoint - consider adding authentication in production
        .route("/metrics", get(routes::metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .route("/static/audio/{filename}", get(routes::serve_audio))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(middleware::from_fn(add_request_id))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
