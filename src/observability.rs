use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub phases: BTreeMap<String, PhaseMetrics>,
    pub total_duration_ms: f64,
    pub renders_succeeded: u64,
    pub renders_failed: u64,
    /// Seconds of output video produced by successful renders.
    pub media_seconds: f64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct PhaseMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

/// Shared, cloneable metrics sink. Clones record into the same snapshot.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_phase(&self, phase: &str) -> PhaseTimer {
        PhaseTimer {
            phase: phase.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_total_duration(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.total_duration_ms = duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_render_success(&self, media_seconds: f64) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.renders_succeeded += 1;
            guard.media_seconds += media_seconds;
        }
    }

    pub fn record_render_failure(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.renders_failed += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

/// Records its elapsed time under `phase` when dropped.
pub struct PhaseTimer {
    phase: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl PhaseTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.phases.entry(self.phase.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(phase = self.phase.as_str(), duration_ms, "Phase duration recorded");
        self.recorded = true;
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        total_duration_ms = snapshot.total_duration_ms,
        renders_succeeded = snapshot.renders_succeeded,
        renders_failed = snapshot.renders_failed,
        media_seconds = snapshot.media_seconds,
        "Render metrics summary"
    );
    for (phase, metrics) in &snapshot.phases {
        info!(
            phase = phase.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Phase metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str("# HELP reelsmith_renders_succeeded_total Renders that finished\n");
        output.push_str("# TYPE reelsmith_renders_succeeded_total counter\n");
        output.push_str(&format!(
            "reelsmith_renders_succeeded_total {}\n",
            self.renders_succeeded
        ));
        output.push_str("# HELP reelsmith_renders_failed_total Renders that failed\n");
        output.push_str("# TYPE reelsmith_renders_failed_total counter\n");
        output.push_str(&format!(
            "reelsmith_renders_failed_total {}\n",
            self.renders_failed
        ));
        output.push_str(
            "# HELP reelsmith_media_seconds_total Output media produced in seconds\n",
        );
        output.push_str("# TYPE reelsmith_media_seconds_total counter\n");
        output.push_str(&format!(
            "reelsmith_media_seconds_total {:.3}\n",
            self.media_seconds
        ));
        output.push_str("# HELP reelsmith_phase_calls_total Phase invocation count\n");
        output.push_str("# TYPE reelsmith_phase_calls_total counter\n");
        output.push_str(
            "# HELP reelsmith_phase_duration_seconds_total Accumulated phase duration in seconds\n",
        );
        output.push_str("# TYPE reelsmith_phase_duration_seconds_total counter\n");
        output.push_str(
            "# HELP reelsmith_phase_duration_seconds_max Maximum phase duration in seconds\n",
        );
        output.push_str("# TYPE reelsmith_phase_duration_seconds_max gauge\n");
        for (phase, metrics) in &self.phases {
            output.push_str(&format!(
                "reelsmith_phase_calls_total{{phase=\"{}\"}} {}\n",
                phase, metrics.calls
            ));
            output.push_str(&format!(
                "reelsmith_phase_duration_seconds_total{{phase=\"{}\"}} {:.6}\n",
                phase,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "reelsmith_phase_duration_seconds_max{{phase=\"{}\"}} {:.6}\n",
                phase,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output.push_str("# HELP reelsmith_run_duration_seconds Wall time of the last run\n");
        output.push_str("# TYPE reelsmith_run_duration_seconds gauge\n");
        output.push_str(&format!(
            "reelsmith_run_duration_seconds {:.6}\n",
            self.total_duration_ms / 1_000.0
        ));
        output
    }
}
