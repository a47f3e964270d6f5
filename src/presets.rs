use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::timeline::{
    AudioSourcePolicy, CrossfadeSpec, MusicTrack, SpeechSegment, Timeline, VideoClip,
};

pub const PRESET_NAMES: &[&str] = &["montage", "narrated", "podcast"];

/// Write a starter timeline for `name` to `destination`.
pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let timeline = preset_timeline(name)?;
    let rendered = serde_yaml::to_string(&timeline)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write timeline: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

pub fn preset_timeline(name: &str) -> Result<Timeline> {
    Ok(match name {
        "montage" => montage_preset(),
        "narrated" => narrated_preset(),
        "podcast" => podcast_preset(),
        other => anyhow::bail!(
            "Unknown preset '{other}'. Available presets: {}",
            PRESET_NAMES.join(", ")
        ),
    })
}

fn montage_preset() -> Timeline {
    Timeline {
        crossfade: Some(CrossfadeSpec::default()),
        clips: vec![
            VideoClip::new("clips/opening.mp4", 0.0),
            VideoClip::new("clips/middle.mp4", 0.0).with_trim(0.5, 0.5),
            VideoClip::new("clips/closing.mp4", 0.0),
        ],
        music: Some(music_bed(0.5)),
        ..Timeline::default()
    }
}

fn narrated_preset() -> Timeline {
    Timeline {
        crossfade: Some(CrossfadeSpec {
            duration: 0.75,
            transition: "dissolve".into(),
        }),
        clips: vec![
            VideoClip::new("clips/scene1.mp4", 0.0),
            VideoClip::new("clips/scene2.mp4", 0.0),
        ],
        music: Some(music_bed(0.3)),
        speech: vec![
            SpeechSegment::silence(1.0),
            SpeechSegment::clip("voice/intro.wav", 0.0),
            SpeechSegment::silence(0.5),
            SpeechSegment::clip("voice/outro.wav", 0.0),
        ],
        speech_volume: 1.2,
        ..Timeline::default()
    }
}

fn podcast_preset() -> Timeline {
    Timeline {
        audio_source: AudioSourcePolicy::Editor,
        music: Some(music_bed(0.2)),
        speech: vec![SpeechSegment::clip("voice/episode.wav", 0.0)],
        ..Timeline::default()
    }
}

fn music_bed(volume: f64) -> MusicTrack {
    MusicTrack {
        volume,
        fade_in: 1.0,
        fade_out: 2.0,
        ..MusicTrack::new("music/bed.mp3", 0.0)
    }
}
