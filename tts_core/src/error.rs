use std::time::Duration;

use thiserror::Error;

/// Failure of a single call to a speech-synthesis backend.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Backend unreachable, unauthenticated or answering with a server error.
    #[error("synthesis service unavailable: {0}")]
    Unavailable(String),

    /// Backend understood the request and refused it.
    #[error("synthesis request rejected: {0}")]
    Rejected(String),

    #[error("synthesis call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Response did not match the typed contract, or carried no audio.
    #[error("malformed synthesis response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return SynthesisError::Unavailable(format!("request timed out: {e}"));
        }
        if e.is_decode() {
            return SynthesisError::MalformedResponse(e.to_string());
        }
        match e.status() {
            Some(status) if status.is_client_error() && !is_auth_status(status) => {
                SynthesisError::Rejected(e.to_string())
            }
            _ => SynthesisError::Unavailable(e.to_string()),
        }
    }
}

fn is_auth_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
}

/// Terminal failure of a pipeline run.
///
/// Every variant leaves the output directory untouched: no partial or
/// temporary container survives a failed run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transcript was empty or had no `speaker: text` line.
    #[error("no usable transcript: {dropped_lines} line(s) could not be parsed")]
    EmptyInput { dropped_lines: usize },

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("speech synthesis timed out after {}s", .0.as_secs())]
    SynthesisTimeout(Duration),

    /// Every synthesis call failed (or the single batch call was refused).
    #[error("speech synthesis failed for all {failed} utterance(s): {last_error}")]
    SynthesisFailed { failed: usize, last_error: String },

    #[error("synthesis returned no usable audio")]
    NoAudioProduced,

    #[error("failed to write audio container: {0}")]
    StorageWriteFailed(String),
}

impl PipelineError {
    /// Stable machine-readable name, used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput { .. } => "empty_input",
            PipelineError::UpstreamUnavailable(_) => "upstream_unavailable",
            PipelineError::SynthesisTimeout(_) => "synthesis_timeout",
            PipelineError::SynthesisFailed { .. } => "synthesis_failed",
            PipelineError::NoAudioProduced => "no_audio_produced",
            PipelineError::StorageWriteFailed(_) => "storage_write_failed",
        }
    }
}

impl From<SynthesisError> for PipelineError {
    fn from(e: SynthesisError) -> Self {
        match e {
            SynthesisError::Unavailable(msg) => PipelineError::UpstreamUnavailable(msg),
            SynthesisError::Timeout(after) => PipelineError::SynthesisTimeout(after),
            SynthesisError::MalformedResponse(_) => PipelineError::NoAudioProduced,
            SynthesisError::Rejected(msg) => PipelineError::SynthesisFailed {
                failed: 1,
                last_error: msg,
            },
        }
    }
}
