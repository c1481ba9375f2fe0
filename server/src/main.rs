use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use interview_server::config::ServerConfig;
use interview_server::{build_router, AppState};
use llm_core::{GeminiTextClient, GeminiTextConfig, TextGenerator};
use tts_core::{GeminiTts, GeminiTtsConfig, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(ref allowed_origins) = config.cors_allowed_origins else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return base.allow_origin(Any);
    };
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS has no valid origin, falling back to permissive CORS");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting interview audio server...");

    let config = ServerConfig::from_env();

    let audio = tts_core::AudioStore::new(config.audio_dir.clone());
    audio
        .ensure_dir()
        .with_context(|| format!("creating audio directory {}", config.audio_dir.display()))?;

    let clients = match config.google_api_key.clone() {
        Some(api_key) => {
            let mut text_config = GeminiTextConfig::new(api_key.clone());
            text_config.model = config.script_model.clone();
            text_config.timeout = config.llm_timeout();
            let text = Arc::new(GeminiTextClient::create(text_config)?);

            let mut tts_config = GeminiTtsConfig::new(api_key);
            tts_config.model = config.tts_model.clone();
            tts_config.multi_speaker = config.tts_multi_speaker;
            let tts = Arc::new(GeminiTts::create(tts_config)?);

            Some((text, tts))
        }
        None => {
            warn!("GOOGLE_API_KEY not set, generation endpoints will answer with a configuration error");
            None
        }
    };
    let generator = clients
        .as_ref()
        .map(|(text, _)| text.clone() as Arc<dyn TextGenerator>);
    let pipeline = clients
        .as_ref()
        .map(|(_, tts)| Arc::new(Pipeline::new(tts.clone(), config.pipeline_config())));

    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, synthesis_timeout={}s, pipeline_timeout={}s, concurrency={}",
        config.port,
        config.rate_limit_per_minute,
        config.synthesis_timeout_secs,
        config.pipeline_timeout_secs,
        config.synthesis_concurrency
    );

    let cors = cors_layer(&config);

    // Global key: every client shares one bucket, which behaves the same behind proxies
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second((config.rate_limit_per_minute / 60).max(1) as u64)
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .context("invalid rate limit configuration")?,
    );
    info!("Rate limiting: {} requests per minute", config.rate_limit_per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors)
        .into_inner();

    let port = config.port;
    let app = build_router(AppState::new(config, generator, pipeline)).layer(middleware_stack);

    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router is gone, so these are the last handles
    if let Some((text, tts)) = clients {
        if let Ok(text) = Arc::try_unwrap(text) {
            text.close();
        }
        if let Ok(tts) = Arc::try_unwrap(tts) {
            tts.close();
        }
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
