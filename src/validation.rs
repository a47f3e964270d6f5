use serde::Serialize;

use crate::timeline::{AudioSourcePolicy, SpeechSegment, Timeline};

/// Transitions accepted by ffmpeg's `xfade` filter.
pub const KNOWN_TRANSITIONS: &[&str] = &[
    "fade", "fadeblack", "fadewhite", "fadegrays", "dissolve", "distance", "pixelize",
    "wipeleft", "wiperight", "wipeup", "wipedown", "wipetl", "wipetr", "wipebl", "wipebr",
    "slideleft", "slideright", "slideup", "slidedown", "smoothleft", "smoothright",
    "smoothup", "smoothdown", "circlecrop", "rectcrop", "circleopen", "circleclose",
    "vertopen", "vertclose", "horzopen", "horzclose", "radial", "diagtl", "diagtr", "diagbl",
    "diagbr", "hlslice", "hrslice", "vuslice", "vdslice", "hblur", "squeezeh", "squeezev",
    "zoomin",
];

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Lint a timeline without touching the filesystem.
///
/// Checks that need durations are skipped for entries still waiting to be
/// probed (`duration: 0`).
pub fn validate_timeline(timeline: &Timeline) -> ValidationReport {
    let mut report = ValidationReport::default();

    if timeline.version != 1 {
        report.error(format!("Unsupported timeline version: {}", timeline.version));
    }
    if !timeline.has_media() {
        report.error("Timeline needs at least one clip, a music track or speech");
    }

    let resolution = timeline.resolution;
    if resolution.width == 0 || resolution.height == 0 {
        report.error(format!(
            "Resolution {}x{} has a zero dimension",
            resolution.width, resolution.height
        ));
    } else if resolution.width % 2 != 0 || resolution.height % 2 != 0 {
        report.error(format!(
            "Resolution {}x{} must have even dimensions for yuv420p output",
            resolution.width, resolution.height
        ));
    }

    report.merge(validate_clips(timeline));
    report.merge(validate_audio(timeline));
    report.merge(validate_encode(timeline));
    report
}

fn validate_clips(timeline: &Timeline) -> ValidationReport {
    let mut report = ValidationReport::default();
    let crossfade = timeline.crossfade();

    for (idx, clip) in timeline.clips.iter().enumerate() {
        let label = format!("Clip {} ({})", idx + 1, clip.path.display());
        if clip.path.as_os_str().is_empty() {
            report.error(format!("Clip {} has an empty path", idx + 1));
        }
        if clip.duration < 0.0 || clip.trim_start < 0.0 || clip.trim_end < 0.0 {
            report.error(format!("{label}: durations and trims cannot be negative"));
            continue;
        }
        if clip.duration > 0.0 && clip.effective_duration() <= 0.0 {
            report.error(format!("{label}: trims consume the whole clip"));
        } else if timeline.clips.len() > 1
            && clip.duration > 0.0
            && clip.effective_duration() < crossfade.duration
        {
            report.error(format!(
                "{label}: {:.3}s is shorter than the {:.3}s cross-fade",
                clip.effective_duration(),
                crossfade.duration
            ));
        }
    }

    if timeline.clips.len() > 1 {
        if crossfade.duration < 0.0 {
            report.error("Cross-fade duration cannot be negative");
        }
        if !KNOWN_TRANSITIONS.contains(&crossfade.transition.as_str()) {
            report.warn(format!(
                "Unknown cross-fade transition '{}'",
                crossfade.transition
            ));
        }
    }
    report
}

fn validate_audio(timeline: &Timeline) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Some(music) = &timeline.music {
        if music.volume < 0.0 {
            report.error("Music volume cannot be negative");
        }
        if music.fade_in < 0.0 || music.fade_out < 0.0 {
            report.error("Music fades cannot be negative");
        }
        if music.trim_start < 0.0 || music.trim_end < 0.0 {
            report.error("Music trims cannot be negative");
        } else if music.duration > 0.0 && music.effective_duration() <= 0.0 {
            if timeline.has_speech() {
                report.warn("Music trims consume the whole track; only speech will play");
            } else {
                report.error("Music trims consume the whole track");
            }
        }
    }

    for (idx, segment) in timeline.speech.iter().enumerate() {
        match segment {
            SpeechSegment::Silence { duration } if *duration < 0.0 => {
                report.error(format!("Speech segment {}: negative silence", idx + 1));
            }
            SpeechSegment::Clip {
                duration,
                trim_start,
                trim_end,
                ..
            } if *duration < 0.0 || *trim_start < 0.0 || *trim_end < 0.0 => {
                report.error(format!(
                    "Speech segment {}: durations and trims cannot be negative",
                    idx + 1
                ));
            }
            _ => {}
        }
    }
    if timeline.speech_volume < 0.0 {
        report.error("Speech volume cannot be negative");
    }

    let has_speech_clip = timeline
        .speech
        .iter()
        .any(|segment| matches!(segment, SpeechSegment::Clip { .. }));
    if timeline.has_speech() && !has_speech_clip {
        report.warn("Speech track contains only silence");
    }

    let has_editor_audio = timeline.music.is_some() || timeline.has_speech();
    match timeline.audio_source {
        AudioSourcePolicy::Editor => {
            if !timeline.clips.is_empty() && !has_editor_audio {
                report.error(
                    "Audio source 'editor' needs a music track or speech; \
                     use 'video' or 'none' instead",
                );
            }
        }
        AudioSourcePolicy::VideoNative | AudioSourcePolicy::Silent => {
            if has_editor_audio && !timeline.clips.is_empty() {
                report.warn(format!(
                    "Music and speech are ignored with audio source '{}'",
                    policy_name(timeline.audio_source)
                ));
            }
            if timeline.clips.is_empty() && has_editor_audio {
                report.warn("Audio-only timeline will render without sound");
            }
        }
    }
    report
}

fn validate_encode(timeline: &Timeline) -> ValidationReport {
    let mut report = ValidationReport::default();
    let crf = timeline.encode.crf();
    if crf > 51 {
        report.error(format!("CRF {crf} is outside 0-51"));
    } else if !(18..=28).contains(&crf) {
        report.warn(format!("CRF {crf} is outside the usual 18-28 range"));
    }
    if timeline.encode.video_codec.trim().is_empty() {
        report.error("Video codec cannot be empty");
    }
    if timeline.encode.audio_codec.trim().is_empty() {
        report.error("Audio codec cannot be empty");
    }
    report
}

fn policy_name(policy: AudioSourcePolicy) -> &'static str {
    match policy {
        AudioSourcePolicy::Editor => "editor",
        AudioSourcePolicy::VideoNative => "video",
        AudioSourcePolicy::Silent => "none",
    }
}

/// Referenced files that do not exist.
pub fn validate_media_paths(timeline: &Timeline) -> ValidationReport {
    let mut report = ValidationReport::default();
    for path in timeline.media_paths() {
        if !path.exists() {
            report.error(format!("Missing media file: {}", path.display()));
        }
    }
    report
}
