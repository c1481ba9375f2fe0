//! Interview script to speech.
//!
//! A transcript of `label: text` lines goes through four stages:
//! [`transcript`] parses it, [`voice`] maps speakers to voices, [`request`]
//! plans the synthesis calls and [`wav`] assembles and stores the audio.
//! [`pipeline::Pipeline`] runs them in order against a
//! [`provider::SpeechSynthesizer`] such as [`gemini::GeminiTts`].

pub mod error;
pub mod gemini;
pub mod pipeline;
pub mod provider;
pub mod request;
pub mod transcript;
pub mod voice;
pub mod wav;

pub use error::{PipelineError, SynthesisError};
pub use gemini::{GeminiTts, GeminiTtsConfig};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, PipelineState};
pub use provider::{AudioChunk, SpeechSynthesizer, SynthesisResponse};
pub use request::{
    build_plan, BatchRequest, SynthesisCapabilities, SynthesisMode, SynthesisPlan,
    UtteranceRequest,
};
pub use transcript::{parse_transcript, ParsedTranscript, Utterance};
pub use voice::{resolve_voice, VoiceAssignment};
pub use wav::{assemble, AudioContainer, AudioFormat, AudioFragment, AudioStore, StoredAudio};
