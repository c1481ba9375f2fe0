//! Script-to-speech orchestration.
//!
//! One [`Pipeline`] is built at startup around a shared synthesizer and
//! serves any number of concurrent runs. Each run owns its transcript, voice
//! assignment and in-flight requests; the output directory is the only
//! shared resource and file names never collide.
//!
//! Dropping a run future cancels every pending synthesis call. Nothing is
//! written before all calls have finished, so a cancelled run leaves no file.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{PipelineError, SynthesisError};
use crate::provider::{SpeechSynthesizer, SynthesisResponse};
use crate::request::{build_plan, SynthesisMode, SynthesisPlan, UtteranceRequest};
use crate::transcript::parse_transcript;
use crate::voice::VoiceAssignment;
use crate::wav::{assemble, AudioContainer, AudioFormat, AudioFragment, AudioStore, StoredAudio};

/// Upper bound on concurrent per-utterance calls.
pub const MAX_CONCURRENCY: usize = 8;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// Bound on each synthesis call.
    pub call_timeout: Duration,
    /// Bound on the whole synthesis stage of a run.
    pub pipeline_timeout: Duration,
    pub write_timeout: Duration,
    /// Per-utterance calls in flight at once.
    pub concurrency: usize,
    pub format: AudioFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("static/audio"),
            call_timeout: Duration::from_secs(600),
            pipeline_timeout: Duration::from_secs(840),
            write_timeout: Duration::from_secs(30),
            concurrency: 4,
            format: AudioFormat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    ParsingTranscript,
    BuildingRequests,
    AwaitingSynthesis,
    AssemblingAudio,
    Done,
    Failed(&'static str),
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub file_name: String,
    pub path: PathBuf,
    pub mode: SynthesisMode,
    pub utterances: usize,
    pub dropped_lines: usize,
    /// Per-utterance calls that failed and were left out.
    pub failed_utterances: usize,
    /// Responses that arrived but had no usable audio.
    pub skipped_fragments: usize,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub states: Vec<PipelineState>,
}

struct RunTrace {
    id: u64,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl RunTrace {
    fn new() -> Self {
        Self {
            id: NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed),
            state: PipelineState::Idle,
            history: vec![PipelineState::Idle],
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(run = self.id, from = ?self.state, to = ?next, "pipeline state");
        self.state = next.clone();
        self.history.push(next);
    }
}

struct SynthesisOutput {
    fragments: Vec<AudioFragment>,
    failed: usize,
    skipped: usize,
}

pub struct Pipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    store: AudioStore,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, config: PipelineConfig) -> Self {
        Self {
            synthesizer,
            store: AudioStore::new(config.output_dir.clone()),
            config,
        }
    }

    pub fn store(&self) -> &AudioStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Turn `script` into a WAV file in the output directory.
    pub async fn run(
        &self,
        script: &str,
        voices: &VoiceAssignment,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut trace = RunTrace::new();
        let span = tracing::info_span!("pipeline", run = trace.id, backend = self.synthesizer.name());
        let started = Instant::now();

        let result = self.run_stages(script, voices, &mut trace).instrument(span).await;
        match result {
            Ok(mut outcome) => {
                trace.advance(PipelineState::Done);
                info!(
                    run = trace.id,
                    file = %outcome.file_name,
                    mode = %outcome.mode,
                    utterances = outcome.utterances,
                    failed = outcome.failed_utterances,
                    audio_ms = outcome.duration_ms,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "interview audio written"
                );
                outcome.states = trace.history;
                Ok(outcome)
            }
            Err(e) => {
                let at = trace.state.clone();
                trace.advance(PipelineState::Failed(e.kind()));
                error!(run = trace.id, stage = ?at, kind = e.kind(), "pipeline failed: {e}");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        script: &str,
        voices: &VoiceAssignment,
        trace: &mut RunTrace,
    ) -> Result<PipelineOutcome, PipelineError> {
        trace.advance(PipelineState::ParsingTranscript);
        let transcript = parse_transcript(script)?;

        trace.advance(PipelineState::BuildingRequests);
        let plan = build_plan(
            &transcript,
            voices,
            self.synthesizer.capabilities(),
            self.config.format,
            self.config.call_timeout,
        );
        let mode = plan.mode();
        info!(
            %mode,
            utterances = transcript.len(),
            dropped_lines = transcript.dropped_lines,
            requests = plan.request_count(),
            "synthesis planned"
        );

        trace.advance(PipelineState::AwaitingSynthesis);
        let output = tokio::time::timeout(self.config.pipeline_timeout, self.synthesize(plan))
            .await
            .map_err(|_| PipelineError::SynthesisTimeout(self.config.pipeline_timeout))??;

        trace.advance(PipelineState::AssemblingAudio);
        let assembly = assemble(output.fragments)?;
        let sample_rate = assembly.container.format.sample_rate;
        let duration_ms = assembly.container.duration_ms();
        let stored = self.write(assembly.container).await?;

        Ok(PipelineOutcome {
            file_name: stored.file_name,
            path: stored.path,
            mode,
            utterances: transcript.len(),
            dropped_lines: transcript.dropped_lines,
            failed_utterances: output.failed,
            skipped_fragments: output.skipped + assembly.skipped_fragments,
            sample_rate,
            duration_ms,
            states: Vec::new(),
        })
    }

    async fn synthesize(&self, plan: SynthesisPlan) -> Result<SynthesisOutput, PipelineError> {
        match plan {
            SynthesisPlan::Batch(request) => {
                let response = bounded(request.timeout, self.synthesizer.synthesize_batch(&request))
                    .await
                    .map_err(|e| match e {
                        SynthesisError::Rejected(msg) => PipelineError::SynthesisFailed {
                            failed: request.utterance_count,
                            last_error: msg,
                        },
                        other => PipelineError::from(other),
                    })?;
                let mut output = SynthesisOutput {
                    fragments: Vec::new(),
                    failed: 0,
                    skipped: 0,
                };
                match response.extract_payload() {
                    Ok(payload) => output.fragments.push(AudioFragment {
                        sequence_index: 0,
                        payload,
                    }),
                    Err(e) => {
                        warn!("batch response unusable: {e}");
                        output.skipped = 1;
                    }
                }
                Ok(output)
            }
            SynthesisPlan::PerUtterance(requests) => self.synthesize_each(&requests).await,
        }
    }

    /// Fan out one call per utterance. Failures are counted and left out;
    /// only a run where every call fails is an error. It is a timeout when
    /// every call timed out and an outage when every call found the backend
    /// unavailable.
    async fn synthesize_each(
        &self,
        requests: &[UtteranceRequest],
    ) -> Result<SynthesisOutput, PipelineError> {
        let synthesizer = &self.synthesizer;
        let concurrency = self.config.concurrency.clamp(1, MAX_CONCURRENCY);

        let futures: Vec<_> = requests
            .iter()
            .map(|req| async move {
                let result = bounded(req.timeout, synthesizer.synthesize_utterance(req)).await;
                (req.sequence_index, result)
            })
            .collect();
        let results: Vec<(usize, Result<SynthesisResponse, SynthesisError>)> =
            stream::iter(futures)
                .buffered(concurrency)
                .collect()
                .await;

        let mut output = SynthesisOutput {
            fragments: Vec::with_capacity(results.len()),
            failed: 0,
            skipped: 0,
        };
        let mut last_error = None;
        let mut timed_out = 0usize;
        let mut unavailable = 0usize;

        for (sequence_index, result) in results {
            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(sequence_index, "utterance synthesis failed: {e}");
                    output.failed += 1;
                    match e {
                        SynthesisError::Timeout(_) => timed_out += 1,
                        SynthesisError::Unavailable(_) => unavailable += 1,
                        _ => {}
                    }
                    last_error = Some(e);
                    continue;
                }
            };
            match response.extract_payload() {
                Ok(payload) => output.fragments.push(AudioFragment {
                    sequence_index,
                    payload,
                }),
                Err(e) => {
                    warn!(sequence_index, "utterance response unusable: {e}");
                    output.skipped += 1;
                }
            }
        }

        if output.failed == requests.len() {
            match &last_error {
                Some(SynthesisError::Timeout(after)) if timed_out == output.failed => {
                    return Err(PipelineError::SynthesisTimeout(*after));
                }
                Some(SynthesisError::Unavailable(msg)) if unavailable == output.failed => {
                    return Err(PipelineError::UpstreamUnavailable(msg.clone()));
                }
                _ => {}
            }
            return Err(PipelineError::SynthesisFailed {
                failed: output.failed,
                last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
            });
        }
        Ok(output)
    }

    /// Write on the blocking pool. A write that outlives `write_timeout` is
    /// cancelled before its rename; if the rename already happened, the file
    /// is removed once the writer finishes.
    async fn write(&self, container: AudioContainer) -> Result<StoredAudio, PipelineError> {
        let store = self.store.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut task = {
            let cancelled = cancelled.clone();
            tokio::task::spawn_blocking(move || store.save(&container, &cancelled))
        };
        let waited = tokio::time::timeout(self.config.write_timeout, &mut task).await;
        match waited {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(PipelineError::StorageWriteFailed(format!("writer task: {join}"))),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                tokio::spawn(async move {
                    if let Ok(Ok(stored)) = task.await {
                        warn!(file = %stored.file_name, "removing container written after timeout");
                        if let Err(e) = tokio::fs::remove_file(&stored.path).await {
                            error!(file = %stored.file_name, "failed to remove late container: {e}");
                        }
                    }
                });
                Err(PipelineError::StorageWriteFailed(format!(
                    "write timed out after {}s",
                    self.config.write_timeout.as_secs()
                )))
            }
        }
    }
}

async fn bounded<F>(timeout: Duration, call: F) -> Result<SynthesisResponse, SynthesisError>
where
    F: Future<Output = Result<SynthesisResponse, SynthesisError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| SynthesisError::Timeout(timeout))?
}
