use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Snapshot of one agent's rolling metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    /// Cumulative mean latency across all invocations.
    pub avg_latency_ms: f64,
}

impl AgentMetrics {
    /// successes / invocations, 0.0 before the first invocation.
    pub fn success_rate(&self) -> f64 {
        if self.invocations == 0 {
            return 0.0;
        }
        self.successes as f64 / self.invocations as f64
    }
}

/// Owner-mutated metrics recorder.
///
/// The average is a true cumulative running mean
/// (`avg += (sample - avg) / n`), not the `(old + new) / 2` blend some
/// implementations use, which over-weights recent samples. Only the owning
/// agent mutates its recorder; the mutex exists because ready tasks within
/// one session execute concurrently.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<AgentMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, success: bool, latency_ms: u64) {
        let mut m = self.inner.lock();
        m.invocations += 1;
        if success {
            m.successes += 1;
        } else {
            m.failures += 1;
        }
        let n = m.invocations as f64;
        m.avg_latency_ms += (latency_ms as f64 - m.avg_latency_ms) / n;
    }

    pub fn snapshot(&self) -> AgentMetrics {
        self.inner.lock().clone()
    }
}
