// Server configuration, read once from the environment at startup

use std::path::PathBuf;
use std::time::Duration;

use tts_core::pipeline::MAX_CONCURRENCY;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub llm_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub google_api_key: Option<String>,
    pub audio_dir: PathBuf,
    pub script_model: String,
    pub tts_model: String,
    pub synthesis_timeout_secs: u64,
    pub pipeline_timeout_secs: u64,
    pub synthesis_concurrency: usize,
    pub tts_multi_speaker: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            rate_limit_per_minute: 60,
            llm_timeout_secs: 120,
            request_timeout_secs: 900,
            cors_allowed_origins: None,
            google_api_key: None,
            audio_dir: PathBuf::from("static/audio"),
            script_model: llm_core::DEFAULT_SCRIPT_MODEL.to_string(),
            tts_model: tts_core::gemini::DEFAULT_TTS_MODEL.to_string(),
            synthesis_timeout_secs: 600,
            pipeline_timeout_secs: 840,
            synthesis_concurrency: 4,
            tts_multi_speaker: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let tts_multi_speaker = env_string("TTS_MULTI_SPEAKER")
            .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.tts_multi_speaker);

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            llm_timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or(defaults.llm_timeout_secs),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            cors_allowed_origins,
            google_api_key: env_string("GOOGLE_API_KEY"),
            audio_dir: env_string("AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.audio_dir),
            script_model: env_string("SCRIPT_MODEL").unwrap_or(defaults.script_model),
            tts_model: env_string("TTS_MODEL").unwrap_or(defaults.tts_model),
            synthesis_timeout_secs: env_parse("SYNTHESIS_TIMEOUT_SECS")
                .unwrap_or(defaults.synthesis_timeout_secs),
            pipeline_timeout_secs: env_parse("PIPELINE_TIMEOUT_SECS")
                .unwrap_or(defaults.pipeline_timeout_secs),
            synthesis_concurrency: env_parse::<usize>("SYNTHESIS_CONCURRENCY")
                .unwrap_or(defaults.synthesis_concurrency)
                .clamp(1, MAX_CONCURRENCY),
            tts_multi_speaker,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    pub fn pipeline_config(&self) -> tts_core::PipelineConfig {
        tts_core::PipelineConfig {
            output_dir: self.audio_dir.clone(),
            call_timeout: self.synthesis_timeout(),
            pipeline_timeout: self.pipeline_timeout(),
            concurrency: self.synthesis_concurrency,
            ..tts_core::PipelineConfig::default()
        }
    }
}
