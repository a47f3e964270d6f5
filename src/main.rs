use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;
use reelsmith::engine::{FfmpegEngine, build_args, command_line};
use reelsmith::jobs::{JobStatus, JobStore, RenderRequest, export_file_name, render_batch};
use reelsmith::lockfile::{build_lock, read_lock, write_lock};
use reelsmith::observability::{MetricsSnapshot, log_snapshot};
use reelsmith::pipeline::{RenderMode, RenderOptions, RenderPipeline};
use reelsmith::presets::{PRESET_NAMES, generate_preset};
use reelsmith::probe::FfprobeProbe;
use reelsmith::slides::{ConversionSettings, DirectoryCapture, SlideDeck, SlidePlan, convert_slides};
use reelsmith::timeline::{AudioSourcePolicy, QualityPreset, Timeline, expand_timeline_patterns};
use reelsmith::validation::{ValidationReport, validate_media_paths, validate_timeline};
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Render {
            timelines,
            output,
            output_dir,
            render,
            metrics,
            jobs_json,
        } => render_command(timelines, output, output_dir, render, metrics, jobs_json),
        Commands::Plan {
            timeline,
            output,
            render,
            json,
        } => plan_command(&timeline, &output, &render, json),
        Commands::Validate {
            timelines,
            check_files,
        } => validate_command(&timelines, check_files),
        Commands::Lock {
            timeline,
            output,
            verify,
            render,
        } => lock_command(&timeline, &output, verify, &render),
        Commands::Timeline { action } => timeline_command(action),
        Commands::Slides { action } => slides_command(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "reelsmith", &mut io::stdout());
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn render_command(
    patterns: Vec<String>,
    output: Option<PathBuf>,
    output_dir: PathBuf,
    render: RenderArgs,
    metrics: MetricsArgs,
    jobs_json: Option<PathBuf>,
) -> Result<()> {
    let timelines = expand_timeline_patterns(&patterns)?;
    if timelines.is_empty() {
        warn!("No timelines resolved. Nothing to render.");
        return Ok(());
    }
    if output.is_some() && timelines.len() > 1 {
        bail!("--output names a single file; use --output-dir when rendering several timelines");
    }

    let requests: Vec<RenderRequest> = timelines
        .iter()
        .map(|timeline| RenderRequest {
            timeline: timeline.clone(),
            output: output
                .clone()
                .unwrap_or_else(|| output_dir.join(export_file_name(timeline, Utc::now()))),
        })
        .collect();

    let pipeline = render.pipeline();
    let store = JobStore::new();
    let records = render_batch(&pipeline, &store, &requests, &render.options());

    let mut failures = 0usize;
    for job in &records {
        match job.status {
            JobStatus::Completed => {
                println!("{}", job.output.display());
                info!(
                    job = %job.id,
                    timeline = %job.timeline.display(),
                    output = %job.output.display(),
                    "Export complete"
                );
            }
            _ => {
                failures += 1;
                error!(
                    job = %job.id,
                    timeline = %job.timeline.display(),
                    "{}",
                    job.error.as_deref().unwrap_or(&job.message)
                );
            }
        }
    }

    if let Some(path) = jobs_json {
        write_json(&path, &records, "job report")?;
    }
    metrics.emit(&pipeline.metrics().snapshot())?;

    if failures > 0 {
        bail!("{failures} of {} render(s) failed", records.len());
    }
    Ok(())
}

fn plan_command(timeline_path: &Path, output: &Path, render: &RenderArgs, json: bool) -> Result<()> {
    let timeline = Timeline::load(timeline_path)?;
    let pipeline = render.pipeline();
    let program = pipeline
        .prepare(&timeline, &render.options())
        .with_context(|| format!("Failed to compile {}", timeline_path.display()))?;

    if json {
        serde_json::to_writer_pretty(io::stdout(), &program)?;
        println!();
    } else {
        let args = build_args(&program, output);
        println!("{}", command_line(&render.ffmpeg_binary(), &args));
    }
    info!(
        timeline = %timeline_path.display(),
        duration = program.total_duration,
        stages = program.graph.len(),
        "Plan ready"
    );
    Ok(())
}

fn validate_command(timelines: &[PathBuf], check_files: bool) -> Result<()> {
    let mut failures = 0usize;
    for path in timelines {
        match Timeline::load(path) {
            Ok(timeline) => {
                let mut report = validate_timeline(&timeline);
                if check_files {
                    report.merge(validate_media_paths(&timeline));
                }
                if !log_report(path, &report) {
                    failures += 1;
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %path.display(), "Failed to load timeline: {err:#}");
            }
        }
    }
    if failures > 0 {
        bail!("Validation failed for {failures} timeline(s)");
    }
    info!("All timeline checks passed");
    Ok(())
}

fn lock_command(timeline_path: &Path, output: &Path, verify: bool, render: &RenderArgs) -> Result<()> {
    let timeline = Timeline::load(timeline_path)?;
    let report = validate_timeline(&timeline);
    if !log_report(timeline_path, &report) {
        bail!(
            "Cannot generate lockfile due to {} validation error(s)",
            report.errors.len()
        );
    }

    let program = render.pipeline().prepare(&timeline, &render.options())?;
    let lock = build_lock(timeline.version, &program)?;

    if verify {
        let existing = read_lock(output)?;
        if existing.fingerprint != lock.fingerprint {
            bail!(
                "Lockfile {} is stale: {} != {}",
                output.display(),
                existing.fingerprint,
                lock.fingerprint
            );
        }
        info!(lockfile = %output.display(), "Lockfile is up to date");
        return Ok(());
    }

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create lockfile directory: {}", parent.display())
        })?;
    }
    write_lock(&lock, output)?;
    info!(
        lockfile = %output.display(),
        fingerprint = %lock.fingerprint,
        "Lockfile generated successfully"
    );
    Ok(())
}

fn timeline_command(command: TimelineCommands) -> Result<()> {
    match command {
        TimelineCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("timelines/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Timeline generated"
            );
            Ok(())
        }
        TimelineCommands::Presets => {
            println!("Available presets:");
            for name in PRESET_NAMES {
                println!("- {name}");
            }
            Ok(())
        }
    }
}

fn slides_command(command: SlidesCommands) -> Result<()> {
    match command {
        SlidesCommands::Inspect { html, slides } => {
            let content = fs::read_to_string(&html)
                .with_context(|| format!("Failed to read slide deck: {}", html.display()))?;
            let deck = SlideDeck::analyze(&content)?;
            let settings = slides.settings();
            let plan = SlidePlan::new(&deck, &settings, None);
            let summary = serde_json::json!({
                "deck": deck,
                "plan": plan,
                "frames": plan.total_frames(),
            });
            serde_json::to_writer_pretty(io::stdout(), &summary)?;
            println!();
            Ok(())
        }
        SlidesCommands::Convert {
            html,
            output,
            frames_dir,
            durations,
            slides,
            ffmpeg,
        } => {
            let custom = parse_slide_durations(&durations)?;
            let settings = slides.settings();
            let engine = ffmpeg.map(FfmpegEngine::new).unwrap_or_default();
            if !engine.is_available() {
                bail!(
                    "{} not found. Install ffmpeg or set --ffmpeg",
                    engine.binary().display()
                );
            }
            let mut capture = DirectoryCapture::new(frames_dir);
            let result = convert_slides(
                &html,
                &output,
                &settings,
                (!custom.is_empty()).then_some(&custom),
                &mut capture,
                &engine,
            )?;
            info!(
                slides = result.slides,
                frames = result.frames,
                duration = result.duration_s,
                size_mb = result.size_mb,
                audio = result.has_audio,
                "Slide deck converted"
            );
            println!("{}", result.output.display());
            Ok(())
        }
    }
}

/// `INDEX=SECONDS` pairs, zero-based.
fn parse_slide_durations(entries: &[String]) -> Result<BTreeMap<usize, f64>> {
    entries
        .iter()
        .map(|entry| {
            let (index, seconds) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected INDEX=SECONDS, got '{entry}'"))?;
            let index: usize = index
                .trim()
                .parse()
                .with_context(|| format!("Invalid slide index in '{entry}'"))?;
            let seconds: f64 = seconds
                .trim()
                .parse()
                .with_context(|| format!("Invalid seconds in '{entry}'"))?;
            if seconds <= 0.0 {
                bail!("Slide {index} needs a positive duration");
            }
            Ok((index, seconds))
        })
        .collect()
}

/// Logs the report; returns whether it passed.
fn log_report(path: &Path, report: &ValidationReport) -> bool {
    for warning in &report.warnings {
        warn!(file = %path.display(), "{warning}");
    }
    if report.is_ok() {
        info!(file = %path.display(), "Timeline validation passed");
        true
    } else {
        for error_msg in &report.errors {
            error!(file = %path.display(), "{error_msg}");
        }
        false
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create {what}: {}", path.display()))?;
    to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write {what}: {}", path.display()))?;
    info!(path = %path.display(), "{what} written");
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "reelsmith",
    version,
    about = "Timeline-driven video assembly on top of ffmpeg"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one or more timelines, concurrently.
    Render {
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        timelines: Vec<String>,
        /// Output file (single timeline only).
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long = "output-dir", default_value = "exports")]
        output_dir: PathBuf,
        #[command(flatten)]
        render: RenderArgs,
        #[command(flatten)]
        metrics: MetricsArgs,
        #[arg(long = "jobs-json")]
        jobs_json: Option<PathBuf>,
    },
    /// Print the ffmpeg invocation a timeline compiles to.
    Plan {
        timeline: PathBuf,
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,
        #[command(flatten)]
        render: RenderArgs,
        /// Print the compiled program as JSON instead.
        #[arg(long)]
        json: bool,
    },
    Validate {
        #[arg(required = true)]
        timelines: Vec<PathBuf>,
        /// Also report media files that do not exist.
        #[arg(long)]
        check_files: bool,
    },
    Lock {
        timeline: PathBuf,
        output: PathBuf,
        /// Compare against an existing lockfile instead of writing one.
        #[arg(long)]
        verify: bool,
        #[command(flatten)]
        render: RenderArgs,
    },
    Timeline {
        #[command(subcommand)]
        action: TimelineCommands,
    },
    Slides {
        #[command(subcommand)]
        action: SlidesCommands,
    },
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Clone)]
struct RenderArgs {
    #[arg(long, value_enum, default_value_t = RenderMode::Export)]
    mode: RenderMode,
    #[arg(long = "audio-source", value_enum)]
    audio_source: Option<AudioSourcePolicy>,
    #[arg(long, value_enum)]
    quality: Option<QualityPreset>,
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    ffmpeg: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    ffprobe: Option<PathBuf>,
}

impl RenderArgs {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            mode: self.mode,
            audio_source: self.audio_source,
            quality: self.quality,
        }
    }

    fn ffmpeg_binary(&self) -> PathBuf {
        self.ffmpeg
            .clone()
            .unwrap_or_else(|| FfmpegEngine::from_env().binary().to_path_buf())
    }

    fn pipeline(&self) -> RenderPipeline {
        let probe = self
            .ffprobe
            .clone()
            .map(FfprobeProbe::new)
            .unwrap_or_default();
        let engine = FfmpegEngine::new(self.ffmpeg_binary());
        RenderPipeline::new(Arc::new(probe), Arc::new(engine))
    }
}

#[derive(clap::Args, Clone)]
struct MetricsArgs {
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json")]
    metrics_json: Option<PathBuf>,
    #[arg(long = "metrics-prometheus")]
    metrics_prometheus: Option<PathBuf>,
}

impl MetricsArgs {
    fn emit(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        if self.print_metrics {
            log_snapshot(snapshot);
        }
        if let Some(path) = &self.metrics_json {
            write_json(path, snapshot, "metrics JSON")?;
        }
        if let Some(path) = &self.metrics_prometheus {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create metrics directory: {}", parent.display())
                })?;
            }
            fs::write(path, snapshot.to_prometheus()).with_context(|| {
                format!("Failed to write Prometheus metrics: {}", path.display())
            })?;
            info!(metrics = %path.display(), "Prometheus metrics written");
        }
        Ok(())
    }
}

#[derive(Subcommand)]
enum TimelineCommands {
    /// Write a starter timeline from a preset.
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Presets,
}

#[derive(clap::Args, Clone)]
struct SlideArgs {
    #[arg(long, default_value_t = 2)]
    fps: u32,
    #[arg(long = "seconds-per-slide", default_value_t = 5.0)]
    seconds_per_slide: f64,
    #[arg(long = "max-slides", default_value_t = 50)]
    max_slides: usize,
    #[arg(long, default_value_t = 1920)]
    width: u32,
    #[arg(long, default_value_t = 1080)]
    height: u32,
    #[arg(long, default_value_t = 18)]
    crf: u8,
}

impl SlideArgs {
    fn settings(&self) -> ConversionSettings {
        ConversionSettings {
            width: self.width,
            height: self.height,
            fps: self.fps,
            default_seconds_per_slide: self.seconds_per_slide,
            max_slides: self.max_slides,
            crf: self.crf,
        }
    }
}

#[derive(Subcommand)]
enum SlidesCommands {
    /// Report slide count, durations and embedded audio.
    Inspect {
        html: PathBuf,
        #[command(flatten)]
        slides: SlideArgs,
    },
    /// Encode pre-captured slide screenshots using the deck's timing.
    Convert {
        html: PathBuf,
        output: PathBuf,
        /// Directory holding slide_000.png, slide_001.png, ...
        #[arg(long = "frames-dir")]
        frames_dir: PathBuf,
        /// Per-slide override, `INDEX=SECONDS`; repeatable.
        #[arg(long = "duration")]
        durations: Vec<String>,
        #[command(flatten)]
        slides: SlideArgs,
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },
}
