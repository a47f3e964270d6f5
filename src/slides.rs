//! HTML slide decks to video: deck analysis, capture planning and encoding.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::compile::{CompiledProgram, EncodeParams, ProgramInput};
use crate::engine::MediaEngine;
use crate::graph::{FilterGraph, FilterOp, FilterStage, OUTPUT_PIXEL_FORMAT, Signal};
use crate::timeline::Resolution;

struct DeckPatterns {
    slide_config: Regex,
    slides: Regex,
    duration_entry: Regex,
    saved_inline: Regex,
    saved_block: Regex,
    trailing_comma: Regex,
    total_slides: Regex,
    narratives: Regex,
    total_steps: Regex,
    audio_data: Regex,
}

impl DeckPatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            slide_config: Regex::new(r"(?s)var\s+SLIDE_CONFIG\s*=\s*\[(.*?)\];")?,
            slides: Regex::new(r"(?s)var\s+SLIDES\s*=\s*\[(.*?)\];")?,
            duration_entry: Regex::new(r"\{\s*[^}]*?duration\s*:\s*([\d.]+)[^}]*?\}")?,
            saved_inline: Regex::new(
                r#"SAVED_DURATIONS\s*=\s*(\{[^{}]*?"\d+"\s*:\s*\d+[^{}]*?\})"#,
            )?,
            saved_block: Regex::new(r"(?s)SAVED_DURATIONS\s*=\s*\{([^;]*?)\}\s*;")?,
            trailing_comma: Regex::new(r",\s*\}")?,
            total_slides: Regex::new(r"var\s+TOTAL_SLIDES\s*=\s*(?:SLIDE_CONFIG\.length|(\d+))")?,
            narratives: Regex::new(r"(?s)NARRATIVES\s*=\s*\[(.*?)\]")?,
            total_steps: Regex::new(r"TOTAL_STEPS\s*=\s*(\d+)")?,
            audio_data: Regex::new(
                r#"var\s+AUDIO_DATA\s*=\s*["']data:audio/[^;]+;base64,([^"']+)["']"#,
            )?,
        })
    }
}

static PATTERNS: Lazy<Result<DeckPatterns, regex::Error>> = Lazy::new(DeckPatterns::compile);

fn patterns() -> Result<&'static DeckPatterns> {
    PATTERNS
        .as_ref()
        .map_err(|err| anyhow!("Invalid slide deck pattern: {err}"))
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub default_seconds_per_slide: f64,
    pub max_slides: usize,
    pub crf: u8,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 2,
            default_seconds_per_slide: 5.0,
            max_slides: 50,
            crf: 18,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    SlideConfig,
    Slides,
    SavedDurations,
    None,
}

/// What a deck declares about itself.
#[derive(Debug, Clone, Serialize)]
pub struct SlideDeck {
    pub durations: BTreeMap<usize, f64>,
    pub duration_source: DurationSource,
    pub total_slides: Option<usize>,
    #[serde(rename = "audio_bytes", serialize_with = "byte_len")]
    pub audio: Option<Vec<u8>>,
}

fn byte_len<S: Serializer>(audio: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(audio.as_ref().map(|a| a.len() as u64).unwrap_or(0))
}

impl SlideDeck {
    pub fn analyze(html: &str) -> Result<Self> {
        let patterns = patterns()?;
        let (durations, duration_source) = match config_durations(patterns, html) {
            Some((durations, source)) => (durations, source),
            None => {
                let saved = saved_durations(patterns, html);
                let source = if saved.is_empty() {
                    DurationSource::None
                } else {
                    DurationSource::SavedDurations
                };
                (saved, source)
            }
        };
        let total_slides = match duration_source {
            DurationSource::SlideConfig | DurationSource::Slides => Some(durations.len()),
            _ => declared_slide_count(patterns, html),
        };
        Ok(Self {
            durations,
            duration_source,
            total_slides,
            audio: embedded_audio(patterns, html),
        })
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

fn config_durations(
    patterns: &DeckPatterns,
    html: &str,
) -> Option<(BTreeMap<usize, f64>, DurationSource)> {
    for (re, source) in [
        (&patterns.slide_config, DurationSource::SlideConfig),
        (&patterns.slides, DurationSource::Slides),
    ] {
        let Some(body) = re.captures(html).and_then(|c| c.get(1)) else {
            continue;
        };
        let durations: BTreeMap<usize, f64> = patterns
            .duration_entry
            .captures_iter(body.as_str())
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .enumerate()
            .collect();
        if !durations.is_empty() {
            debug!(?source, slides = durations.len(), "Found slide config");
            return Some((durations, source));
        }
    }
    None
}

/// The most complete `SAVED_DURATIONS` object in the page.
fn saved_durations(patterns: &DeckPatterns, html: &str) -> BTreeMap<usize, f64> {
    let inline = patterns
        .saved_inline
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()));
    let blocks = patterns.saved_block.captures_iter(html).filter_map(|c| {
        let body = format!("{{{}}}", c.get(1)?.as_str().trim());
        Some(patterns.trailing_comma.replace_all(&body, "}").into_owned())
    });

    inline
        .chain(blocks)
        .filter_map(|json| parse_duration_map(&json))
        .filter(|map| !map.is_empty())
        .max_by_key(BTreeMap::len)
        .unwrap_or_default()
}

fn parse_duration_map(json: &str) -> Option<BTreeMap<usize, f64>> {
    let raw: BTreeMap<String, f64> = serde_json::from_str(json).ok()?;
    raw.into_iter()
        .map(|(key, value)| Some((key.trim().parse().ok()?, value)))
        .collect()
}

fn declared_slide_count(patterns: &DeckPatterns, html: &str) -> Option<usize> {
    if let Some(count) = patterns
        .total_slides
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
    {
        return Some(count);
    }
    if let Some(body) = patterns.narratives.captures(html).and_then(|c| c.get(1)) {
        let quotes = body.as_str().chars().filter(|c| *c == '"' || *c == '\'').count();
        if quotes >= 2 {
            return Some(quotes / 2);
        }
    }
    patterns
        .total_steps
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .map(|steps| steps + 1)
}

fn embedded_audio(patterns: &DeckPatterns, html: &str) -> Option<Vec<u8>> {
    let data = patterns.audio_data.captures(html)?.get(1)?.as_str();
    match general_purpose::STANDARD.decode(data) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!("Failed to decode embedded audio: {err}");
            None
        }
    }
}

/// Seconds on screen for each slide, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlidePlan {
    pub seconds: Vec<f64>,
    pub fps: u32,
}

impl SlidePlan {
    /// Custom durations win over the deck's own; anything else gets the default.
    pub fn new(
        deck: &SlideDeck,
        settings: &ConversionSettings,
        custom: Option<&BTreeMap<usize, f64>>,
    ) -> Self {
        let durations = match custom {
            Some(custom) if !custom.is_empty() => custom,
            _ => &deck.durations,
        };
        let count = deck
            .total_slides
            .or_else(|| durations.keys().max().map(|last| last + 1))
            .unwrap_or(settings.max_slides);
        let seconds = (0..count)
            .map(|idx| {
                durations
                    .get(&idx)
                    .copied()
                    .unwrap_or(settings.default_seconds_per_slide)
            })
            .collect();
        Self {
            seconds,
            fps: settings.fps,
        }
    }

    pub fn slide_count(&self) -> usize {
        self.seconds.len()
    }

    /// At least one frame per slide.
    pub fn frames_for(&self, slide: usize) -> usize {
        self.seconds
            .get(slide)
            .map(|secs| ((secs * self.fps as f64).floor() as usize).max(1))
            .unwrap_or(0)
    }

    pub fn total_frames(&self) -> usize {
        (0..self.slide_count()).map(|idx| self.frames_for(idx)).sum()
    }

    pub fn durations(&self) -> BTreeMap<usize, f64> {
        self.seconds.iter().copied().enumerate().collect()
    }
}

/// Produces slide images one at a time.
pub trait SlideCapture {
    /// Write the current slide as a PNG to `dest`.
    fn capture(&mut self, slide: usize, dest: &Path) -> Result<()>;

    /// Move to the next slide.
    fn advance(&mut self) -> Result<()>;
}

/// Reads pre-rendered screenshots named `slide_000.png`, `slide_001.png`, ...
#[derive(Debug, Clone)]
pub struct DirectoryCapture {
    dir: PathBuf,
    dimensions: Option<(u32, u32)>,
}

impl DirectoryCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dimensions: None,
        }
    }

    pub fn slide_path(&self, slide: usize) -> PathBuf {
        self.dir.join(format!("slide_{slide:03}.png"))
    }
}

impl SlideCapture for DirectoryCapture {
    fn capture(&mut self, slide: usize, dest: &Path) -> Result<()> {
        let source = self.slide_path(slide);
        let dims = image::image_dimensions(&source)
            .with_context(|| format!("Failed to read slide image: {}", source.display()))?;
        match self.dimensions {
            Some(first) if first != dims => warn!(
                slide,
                width = dims.0,
                height = dims.1,
                "Slide size differs from the first slide"
            ),
            None => self.dimensions = Some(dims),
            _ => {}
        }
        fs::copy(&source, dest)
            .with_context(|| format!("Failed to copy slide {}", source.display()))?;
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub output: PathBuf,
    pub slides: usize,
    pub frames: usize,
    pub duration_s: f64,
    pub size_mb: f64,
    pub slide_durations: BTreeMap<usize, f64>,
    pub has_audio: bool,
}

/// Encode program for a numbered frame sequence plus optional soundtrack.
pub fn slides_program(
    frame_pattern: &Path,
    audio: Option<&Path>,
    frames: usize,
    settings: &ConversionSettings,
) -> CompiledProgram {
    let mut inputs = vec![ProgramInput::ImageSequence {
        pattern: frame_pattern.to_path_buf(),
        framerate: settings.fps,
    }];
    if let Some(audio) = audio {
        inputs.push(ProgramInput::File {
            path: audio.to_path_buf(),
        });
    }

    let mut graph = FilterGraph::new();
    let video_output = graph.push(FilterStage::new(
        vec![Signal::video(0)],
        vec![FilterOp::EvenDimensions],
        "vout",
    ));

    CompiledProgram {
        inputs,
        graph,
        video_output,
        audio_output: audio.map(|_| Signal::audio(1)),
        total_duration: frames as f64 / settings.fps.max(1) as f64,
        encode: EncodeParams {
            resolution: Resolution::new(settings.width, settings.height),
            video_codec: "libx264".into(),
            preset: Some("medium".into()),
            crf: settings.crf,
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            pixel_format: Some(OUTPUT_PIXEL_FORMAT.into()),
            faststart: true,
            truncate_to_shortest: audio.is_some(),
        },
    }
}

/// Capture every slide, hold each for its planned time, and encode.
pub fn convert_slides(
    html_path: &Path,
    output: &Path,
    settings: &ConversionSettings,
    custom_durations: Option<&BTreeMap<usize, f64>>,
    capture: &mut dyn SlideCapture,
    engine: &dyn MediaEngine,
) -> Result<ConversionResult> {
    if settings.fps == 0 {
        bail!("Frame rate must be at least 1");
    }
    let html = fs::read_to_string(html_path)
        .with_context(|| format!("Failed to read slide deck: {}", html_path.display()))?;
    let deck = SlideDeck::analyze(&html)?;
    let plan = SlidePlan::new(&deck, settings, custom_durations);
    info!(
        slides = plan.slide_count(),
        source = ?deck.duration_source,
        audio = deck.has_audio(),
        "Converting slide deck"
    );

    let workdir = tempfile::Builder::new()
        .prefix("reelsmith-slides-")
        .tempdir()
        .context("Failed to create frame directory")?;

    let mut frame_index = 0usize;
    for slide in 0..plan.slide_count() {
        let frames = plan.frames_for(slide);
        debug!(slide, seconds = plan.seconds[slide], frames, "Capturing slide");
        let first = frame_path(workdir.path(), frame_index);
        capture
            .capture(slide, &first)
            .with_context(|| format!("Failed to capture slide {}", slide + 1))?;
        frame_index += 1;
        for _ in 1..frames {
            fs::copy(&first, frame_path(workdir.path(), frame_index))
                .with_context(|| format!("Failed to duplicate frame for slide {}", slide + 1))?;
            frame_index += 1;
        }
        if slide + 1 < plan.slide_count() {
            capture.advance()?;
        }
    }
    if frame_index == 0 {
        bail!("No frames captured");
    }

    let audio_path = match &deck.audio {
        Some(bytes) => {
            let path = workdir.path().join("audio.mp3");
            fs::write(&path, bytes).context("Failed to write embedded audio")?;
            Some(path)
        }
        None => None,
    };

    let pattern = workdir.path().join("frame_%05d.png");
    let program = slides_program(&pattern, audio_path.as_deref(), frame_index, settings);
    engine.execute(&program, output)?;

    let size_mb = fs::metadata(output)
        .map(|meta| meta.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0);
    Ok(ConversionResult {
        output: output.to_path_buf(),
        slides: plan.slide_count(),
        frames: frame_index,
        duration_s: program.total_duration,
        size_mb: (size_mb * 100.0).round() / 100.0,
        slide_durations: plan.durations(),
        has_audio: audio_path.is_some(),
    })
}

fn frame_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{index:05}.png"))
}
