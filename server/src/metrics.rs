// Request and pipeline metrics, exposed on /metrics

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::{PipelineError, PipelineOutcome};

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Per-endpoint counters and a window of recent latencies
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    request_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    min_latency_ms: Arc<AtomicU64>,
    max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LATENCY_SAMPLES))),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == MAX_LATENCY_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn percentile(sorted: &[u64], p: usize) -> u64 {
        if sorted.is_empty() {
            return 0;
        }
        sorted[(sorted.len() * p / 100).min(sorted.len() - 1)]
    }

    pub fn stats(&self) -> EndpointStats {
        let request_count = self.request_count.load(Ordering::Relaxed);
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let mut sorted: Vec<u64> = self
            .latency_samples
            .lock()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        sorted.sort_unstable();

        EndpointStats {
            request_count,
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: if request_count == 0 {
                0.0
            } else {
                total as f64 / request_count as f64
            },
            min_latency_ms: match self.min_latency_ms.load(Ordering::Relaxed) {
                u64::MAX => 0,
                v => v,
            },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: Self::percentile(&sorted, 50),
            p95_latency_ms: Self::percentile(&sorted, 95),
            p99_latency_ms: Self::percentile(&sorted, 99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome counters for audio pipeline runs
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    runs: Arc<AtomicU64>,
    succeeded: Arc<AtomicU64>,
    utterances: Arc<AtomicU64>,
    failed_utterances: Arc<AtomicU64>,
    dropped_lines: Arc<AtomicU64>,
    audio_ms: Arc<AtomicU64>,
    failures: Arc<Mutex<BTreeMap<&'static str, u64>>>,
}

impl PipelineMetrics {
    pub fn record_success(&self, outcome: &PipelineOutcome) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.utterances
            .fetch_add(outcome.utterances as u64, Ordering::Relaxed);
        self.failed_utterances
            .fetch_add(outcome.failed_utterances as u64, Ordering::Relaxed);
        self.dropped_lines
            .fetch_add(outcome.dropped_lines as u64, Ordering::Relaxed);
        self.audio_ms.fetch_add(outcome.duration_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &PipelineError) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut failures) = self.failures.lock() {
            *failures.entry(error.kind()).or_insert(0) += 1;
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            runs: self.runs.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            utterances_synthesized: self.utterances.load(Ordering::Relaxed),
            utterances_failed: self.failed_utterances.load(Ordering::Relaxed),
            dropped_lines: self.dropped_lines.load(Ordering::Relaxed),
            audio_seconds: self.audio_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            failures: self
                .failures
                .lock()
                .map(|f| f.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub generate_script: EndpointMetrics,
    pub generate_audio: EndpointMetrics,
    pub pipeline: PipelineMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Serialize)]
pub struct DetailedMetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub pipeline: PipelineStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub generate_script: EndpointStats,
    pub generate_audio: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct PipelineStats {
    pub runs: u64,
    pub succeeded: u64,
    pub utterances_synthesized: u64,
    pub utterances_failed: u64,
    pub dropped_lines: u64,
    pub audio_seconds: f64,
    /// Failed runs by error kind
    pub failures: BTreeMap<&'static str, u64>,
}
