use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::ValueEnum;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::compile::{self, CompiledProgram};
use crate::engine::MediaEngine;
use crate::error::RenderResult;
use crate::observability::MetricsCollector;
use crate::probe::MediaProbe;
use crate::timeline::{AudioSourcePolicy, QualityPreset, Resolution, Timeline};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Full-resolution export.
    #[default]
    Export,
    /// Quick render at 1280x720.
    Preview,
}

/// Per-render overrides applied on top of the timeline file.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub audio_source: Option<AudioSourcePolicy>,
    pub quality: Option<QualityPreset>,
}

impl RenderOptions {
    pub fn apply(&self, timeline: &Timeline) -> Timeline {
        let mut timeline = timeline.clone();
        if self.mode == RenderMode::Preview {
            timeline.resolution = Resolution::PREVIEW;
        }
        if let Some(policy) = self.audio_source {
            timeline.audio_source = policy;
        }
        if let Some(quality) = self.quality {
            timeline.encode.quality = quality;
            timeline.encode.crf = None;
            timeline.encode.preset = None;
        }
        timeline
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderOutcome {
    pub output: PathBuf,
    pub total_duration: f64,
    pub has_audio: bool,
    pub stages: usize,
}

/// Resolve, compile, execute. Holds no per-render state, so one pipeline
/// can serve many renders at once.
#[derive(Clone)]
pub struct RenderPipeline {
    probe: Arc<dyn MediaProbe>,
    engine: Arc<dyn MediaEngine>,
    metrics: MetricsCollector,
}

impl RenderPipeline {
    pub fn new(probe: Arc<dyn MediaProbe>, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            probe,
            engine,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub fn probe(&self) -> &dyn MediaProbe {
        self.probe.as_ref()
    }

    pub fn engine(&self) -> &dyn MediaEngine {
        self.engine.as_ref()
    }

    /// Resolve durations and compile, without touching the engine.
    #[instrument(skip_all, fields(clips = timeline.clips.len()))]
    pub fn prepare(&self, timeline: &Timeline, options: &RenderOptions) -> RenderResult<CompiledProgram> {
        let timeline = options.apply(timeline);
        let resolved = {
            let span = tracing::span!(tracing::Level::DEBUG, "phase", phase = "resolve");
            let _guard = span.enter();
            let _timer = self.metrics.start_phase("resolve");
            timeline.resolve(self.probe.as_ref())?
        };
        let span = tracing::span!(tracing::Level::DEBUG, "phase", phase = "compile");
        let _guard = span.enter();
        let _timer = self.metrics.start_phase("compile");
        compile::compile(&resolved, self.probe.as_ref())
    }

    #[instrument(skip(self, timeline, options), fields(output = %output.display()))]
    pub fn render(
        &self,
        timeline: &Timeline,
        output: &Path,
        options: &RenderOptions,
    ) -> RenderResult<RenderOutcome> {
        let started = Instant::now();
        let result = self.prepare(timeline, options).and_then(|program| {
            let span = tracing::span!(tracing::Level::DEBUG, "phase", phase = "execute");
            let _guard = span.enter();
            let _timer = self.metrics.start_phase("execute");
            self.engine.execute(&program, output)?;
            Ok(RenderOutcome {
                output: output.to_path_buf(),
                total_duration: program.total_duration,
                has_audio: program.has_audio(),
                stages: program.graph.len(),
            })
        });
        self.metrics.record_total_duration(started.elapsed());

        match &result {
            Ok(outcome) => {
                self.metrics.record_render_success(outcome.total_duration);
                info!(
                    duration = outcome.total_duration,
                    audio = outcome.has_audio,
                    "Render complete"
                );
            }
            Err(err) => {
                self.metrics.record_render_failure();
                warn!("Render failed: {err}");
            }
        }
        result
    }
}
