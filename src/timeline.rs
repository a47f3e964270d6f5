use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use glob::glob;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::probe::MediaProbe;

pub const DEFAULT_CROSSFADE_SECONDS: f64 = 1.0;
pub const DEFAULT_TRANSITION: &str = "fade";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Resolution used for quick previews.
    pub const PREVIEW: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    pub path: PathBuf,
    /// Source duration in seconds; `0` means "probe it".
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub trim_start: f64,
    #[serde(default)]
    pub trim_end: f64,
}

impl VideoClip {
    pub fn new(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            path: path.into(),
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
        }
    }

    pub fn with_trim(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.trim_start = trim_start;
        self.trim_end = trim_end;
        self
    }

    pub fn effective_duration(&self) -> f64 {
        trimmed(self.duration, self.trim_start, self.trim_end)
    }

    pub fn is_trimmed(&self) -> bool {
        self.trim_start > 0.0 || self.trim_end > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeSpec {
    #[serde(default = "default_crossfade_duration")]
    pub duration: f64,
    #[serde(default = "default_transition")]
    pub transition: String,
}

impl Default for CrossfadeSpec {
    fn default() -> Self {
        Self {
            duration: DEFAULT_CROSSFADE_SECONDS,
            transition: DEFAULT_TRANSITION.to_string(),
        }
    }
}

fn default_crossfade_duration() -> f64 {
    DEFAULT_CROSSFADE_SECONDS
}

fn default_transition() -> String {
    DEFAULT_TRANSITION.to_string()
}

/// Background music bed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicTrack {
    pub path: PathBuf,
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "unity")]
    pub volume: f64,
    #[serde(default = "default_music_fade")]
    pub fade_in: f64,
    #[serde(default = "default_music_fade")]
    pub fade_out: f64,
    #[serde(default)]
    pub trim_start: f64,
    #[serde(default)]
    pub trim_end: f64,
}

impl MusicTrack {
    pub fn new(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self {
            path: path.into(),
            duration,
            volume: 1.0,
            fade_in: default_music_fade(),
            fade_out: default_music_fade(),
            trim_start: 0.0,
            trim_end: 0.0,
        }
    }

    pub fn effective_duration(&self) -> f64 {
        trimmed(self.duration, self.trim_start, self.trim_end)
    }

    pub fn is_trimmed(&self) -> bool {
        self.trim_start > 0.0 || self.trim_end > 0.0
    }
}

fn unity() -> f64 {
    1.0
}

fn default_music_fade() -> f64 {
    0.5
}

/// One entry of the speech track: either a spoken clip or an explicit gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpeechSegment {
    Silence {
        duration: f64,
    },
    Clip {
        path: PathBuf,
        #[serde(default)]
        duration: f64,
        #[serde(default)]
        trim_start: f64,
        #[serde(default)]
        trim_end: f64,
    },
}

impl SpeechSegment {
    pub fn silence(duration: f64) -> Self {
        Self::Silence { duration }
    }

    pub fn clip(path: impl Into<PathBuf>, duration: f64) -> Self {
        Self::Clip {
            path: path.into(),
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
        }
    }

    /// Silence is never trimmed.
    pub fn effective_duration(&self) -> f64 {
        match self {
            Self::Silence { duration } => duration.max(0.0),
            Self::Clip {
                duration,
                trim_start,
                trim_end,
                ..
            } => trimmed(*duration, *trim_start, *trim_end),
        }
    }

    /// A spoken clip always counts as media; a gap only when it has length.
    pub fn is_media(&self) -> bool {
        match self {
            Self::Silence { duration } => *duration > 0.0,
            Self::Clip { .. } => true,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Silence { .. } => None,
            Self::Clip { path, .. } => Some(path),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourcePolicy {
    /// Music and speech tracks mixed by the editor.
    #[default]
    Editor,
    /// The clips' own audio streams.
    #[serde(rename = "video", alias = "video_native")]
    #[value(name = "video", alias = "video-native")]
    VideoNative,
    /// No audio at all.
    #[serde(rename = "none", alias = "silent")]
    #[value(name = "none", alias = "silent")]
    Silent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Draft,
    #[default]
    Standard,
    High,
}

impl QualityPreset {
    /// Lower values mean higher quality.
    pub fn crf(&self) -> u8 {
        match self {
            QualityPreset::Draft => 28,
            QualityPreset::Standard => 23,
            QualityPreset::High => 18,
        }
    }

    pub fn x264_preset(&self) -> &'static str {
        match self {
            QualityPreset::Draft => "faster",
            QualityPreset::Standard => "medium",
            QualityPreset::High => "slow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeSpec {
    #[serde(default)]
    pub quality: QualityPreset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

impl Default for EncodeSpec {
    fn default() -> Self {
        Self {
            quality: QualityPreset::default(),
            crf: None,
            preset: None,
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl EncodeSpec {
    pub fn crf(&self) -> u8 {
        self.crf.unwrap_or_else(|| self.quality.crf())
    }

    pub fn preset(&self) -> &str {
        self.preset
            .as_deref()
            .unwrap_or_else(|| self.quality.x264_preset())
    }
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub audio_source: AudioSourcePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossfade: Option<CrossfadeSpec>,
    #[serde(default)]
    pub clips: Vec<VideoClip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicTrack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speech: Vec<SpeechSegment>,
    #[serde(default = "unity")]
    pub speech_volume: f64,
    #[serde(default)]
    pub encode: EncodeSpec,
}

fn default_version() -> u32 {
    1
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            version: default_version(),
            resolution: Resolution::default(),
            audio_source: AudioSourcePolicy::default(),
            crossfade: None,
            clips: Vec::new(),
            music: None,
            speech: Vec::new(),
            speech_volume: 1.0,
            encode: EncodeSpec::default(),
        }
    }
}

impl Timeline {
    /// Load a timeline file; relative media paths are taken relative to it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read timeline file: {}", path.display()))?;
        let mut timeline = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse timeline YAML: {}", path.display()))?;
        if let Some(base) = path.parent()
            && !base.as_os_str().is_empty()
        {
            timeline.rebase(base);
        }
        Ok(timeline)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn rebase(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        for clip in &mut self.clips {
            join(&mut clip.path);
        }
        if let Some(music) = &mut self.music {
            join(&mut music.path);
        }
        for segment in &mut self.speech {
            if let SpeechSegment::Clip { path, .. } = segment {
                join(path);
            }
        }
    }

    pub fn crossfade(&self) -> CrossfadeSpec {
        self.crossfade.clone().unwrap_or_default()
    }

    pub fn has_speech(&self) -> bool {
        self.speech.iter().any(SpeechSegment::is_media)
    }

    pub fn has_media(&self) -> bool {
        !self.clips.is_empty() || self.music.is_some() || self.has_speech()
    }

    pub fn speech_duration(&self) -> f64 {
        self.speech.iter().map(SpeechSegment::effective_duration).sum()
    }

    pub fn music_duration(&self) -> f64 {
        self.music
            .as_ref()
            .map(MusicTrack::effective_duration)
            .unwrap_or(0.0)
    }

    /// Every file the timeline refers to, in input order.
    pub fn media_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.clips.iter().map(|c| c.path.as_path()).collect();
        if let Some(music) = &self.music {
            paths.push(&music.path);
        }
        paths.extend(self.speech.iter().filter_map(SpeechSegment::path));
        paths
    }

    /// Reject negative durations, trims, fades and volumes.
    pub fn check_non_negative(&self) -> RenderResult<()> {
        for (idx, clip) in self.clips.iter().enumerate() {
            non_negative(&format!("clip {} duration", idx + 1), clip.duration)?;
            non_negative(&format!("clip {} trim_start", idx + 1), clip.trim_start)?;
            non_negative(&format!("clip {} trim_end", idx + 1), clip.trim_end)?;
        }
        if let Some(crossfade) = &self.crossfade {
            non_negative("cross-fade duration", crossfade.duration)?;
        }
        if let Some(music) = &self.music {
            non_negative("music duration", music.duration)?;
            non_negative("music volume", music.volume)?;
            non_negative("music fade_in", music.fade_in)?;
            non_negative("music fade_out", music.fade_out)?;
            non_negative("music trim_start", music.trim_start)?;
            non_negative("music trim_end", music.trim_end)?;
        }
        for (idx, segment) in self.speech.iter().enumerate() {
            let label = format!("speech segment {}", idx + 1);
            match segment {
                SpeechSegment::Silence { duration } => {
                    non_negative(&format!("{label} duration"), *duration)?
                }
                SpeechSegment::Clip {
                    duration,
                    trim_start,
                    trim_end,
                    ..
                } => {
                    non_negative(&format!("{label} duration"), *duration)?;
                    non_negative(&format!("{label} trim_start"), *trim_start)?;
                    non_negative(&format!("{label} trim_end"), *trim_end)?;
                }
            }
        }
        non_negative("speech_volume", self.speech_volume)
    }

    /// Check every referenced file exists and fill in unknown durations.
    ///
    /// Returns a copy; the original timeline is left untouched.
    pub fn resolve(&self, probe: &dyn MediaProbe) -> RenderResult<Timeline> {
        self.check_non_negative()?;
        for path in self.media_paths() {
            if !path.exists() {
                return Err(RenderError::InputNotFound(path.to_path_buf()));
            }
        }

        let mut resolved = self.clone();
        for clip in &mut resolved.clips {
            if clip.duration <= 0.0 {
                clip.duration = probe.duration(&clip.path)?;
                debug!(path = %clip.path.display(), duration = clip.duration, "Probed clip");
            }
        }
        if let Some(music) = &mut resolved.music
            && music.duration <= 0.0
        {
            music.duration = probe.duration(&music.path)?;
            debug!(path = %music.path.display(), duration = music.duration, "Probed music");
        }
        for segment in &mut resolved.speech {
            if let SpeechSegment::Clip { path, duration, .. } = segment
                && *duration <= 0.0
            {
                *duration = probe.duration(path)?;
                debug!(path = %path.display(), duration = *duration, "Probed speech clip");
            }
        }
        Ok(resolved)
    }
}

/// Expand timeline arguments; plain paths pass through, globs must match.
pub fn expand_timeline_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            resolved.push(PathBuf::from(pattern));
            continue;
        }
        let matches =
            glob(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))?;
        let mut found = false;
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                resolved.push(path);
                found = true;
            }
        }
        if !found {
            anyhow::bail!("No timelines matched pattern: {pattern}");
        }
    }
    Ok(resolved)
}

fn non_negative(label: &str, value: f64) -> RenderResult<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(RenderError::invalid(format!(
            "{label} must be non-negative, got {value}"
        )))
    }
}

fn trimmed(duration: f64, trim_start: f64, trim_end: f64) -> f64 {
    (duration - trim_start - trim_end).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_duration_never_negative() {
        let clip = VideoClip::new("a.mp4", 4.0).with_trim(3.0, 2.5);
        assert_eq!(clip.effective_duration(), 0.0);
        let clip = VideoClip::new("a.mp4", 10.0).with_trim(1.5, 0.5);
        assert_eq!(clip.effective_duration(), 8.0);
    }

    #[test]
    fn negative_values_are_rejected() {
        let mut timeline = Timeline {
            clips: vec![VideoClip::new("a.mp4", 10.0)],
            ..Timeline::default()
        };
        assert!(timeline.check_non_negative().is_ok());

        timeline.clips[0] = VideoClip::new("a.mp4", 10.0).with_trim(-3.0, 0.0);
        let err = timeline.check_non_negative().unwrap_err().to_string();
        assert!(err.contains("clip 1 trim_start"), "{err}");

        timeline.clips[0] = VideoClip::new("a.mp4", 10.0);
        timeline.speech_volume = -0.5;
        assert!(timeline.check_non_negative().is_err());
    }

    #[test]
    fn silence_ignores_trim_semantics() {
        assert_eq!(SpeechSegment::silence(2.0).effective_duration(), 2.0);
        assert!(!SpeechSegment::silence(0.0).is_media());
        assert!(SpeechSegment::clip("s.wav", 0.0).is_media());
    }

    #[test]
    fn yaml_defaults_follow_editor_defaults() {
        let timeline = Timeline::from_yaml(
            r#"
clips:
  - path: a.mp4
    duration: 10
music:
  path: bed.mp3
speech:
  - kind: silence
    duration: 2
  - kind: clip
    path: line.wav
    duration: 5
"#,
        )
        .unwrap();
        assert_eq!(timeline.version, 1);
        assert_eq!(timeline.resolution, Resolution::new(1920, 1080));
        assert_eq!(timeline.audio_source, AudioSourcePolicy::Editor);
        assert_eq!(timeline.crossfade(), CrossfadeSpec::default());
        let music = timeline.music.as_ref().unwrap();
        assert_eq!(music.volume, 1.0);
        assert_eq!(music.fade_in, 0.5);
        assert_eq!(music.fade_out, 0.5);
        assert_eq!(timeline.speech_duration(), 7.0);
        assert_eq!(timeline.encode.crf(), 23);
        assert_eq!(timeline.encode.preset(), "medium");
    }

    #[test]
    fn audio_source_accepts_aliases() {
        for (text, expected) in [
            ("video", AudioSourcePolicy::VideoNative),
            ("video_native", AudioSourcePolicy::VideoNative),
            ("none", AudioSourcePolicy::Silent),
            ("silent", AudioSourcePolicy::Silent),
            ("editor", AudioSourcePolicy::Editor),
        ] {
            let timeline = Timeline::from_yaml(&format!("audio_source: {text}\n")).unwrap();
            assert_eq!(timeline.audio_source, expected, "{text}");
        }
    }

    #[test]
    fn rebase_only_touches_relative_paths() {
        let mut timeline = Timeline {
            clips: vec![
                VideoClip::new("rel.mp4", 1.0),
                VideoClip::new("/abs/clip.mp4", 1.0),
            ],
            speech: vec![SpeechSegment::clip("vo.wav", 1.0), SpeechSegment::silence(1.0)],
            ..Timeline::default()
        };
        timeline.rebase(Path::new("/project"));
        assert_eq!(timeline.clips[0].path, PathBuf::from("/project/rel.mp4"));
        assert_eq!(timeline.clips[1].path, PathBuf::from("/abs/clip.mp4"));
        assert_eq!(
            timeline.speech[0].path(),
            Some(Path::new("/project/vo.wav"))
        );
    }

    #[test]
    fn crf_override_beats_quality_preset() {
        let encode = EncodeSpec {
            quality: QualityPreset::High,
            crf: Some(20),
            ..EncodeSpec::default()
        };
        assert_eq!(encode.crf(), 20);
        assert_eq!(encode.preset(), "slow");
    }
}
