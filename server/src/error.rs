use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use llm_core::GenerationError;
use serde::Serialize;
use thiserror::Error;
use tts_core::PipelineError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No API key was configured for the service the endpoint needs.
    #[error("{0} is not configured: set GOOGLE_API_KEY")]
    NotConfigured(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(e) => match e {
                PipelineError::EmptyInput { .. } => StatusCode::BAD_REQUEST,
                PipelineError::UpstreamUnavailable(_)
                | PipelineError::SynthesisFailed { .. }
                | PipelineError::NoAudioProduced => StatusCode::BAD_GATEWAY,
                PipelineError::SynthesisTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::StorageWriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Generation(e) => match e {
                GenerationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "request rejected: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pipeline_status_mapping() {
        let cases = [
            (PipelineError::EmptyInput { dropped_lines: 0 }, StatusCode::BAD_REQUEST),
            (PipelineError::UpstreamUnavailable("x".into()), StatusCode::BAD_GATEWAY),
            (
                PipelineError::SynthesisFailed {
                    failed: 2,
                    last_error: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (PipelineError::NoAudioProduced, StatusCode::BAD_GATEWAY),
            (
                PipelineError::SynthesisTimeout(Duration::from_secs(1)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                PipelineError::StorageWriteFailed("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_generation_status_mapping() {
        assert_eq!(
            ApiError::from(GenerationError::EmptyOutput).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(GenerationError::Timeout(Duration::from_secs(1))).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::NotConfigured("script generation").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
