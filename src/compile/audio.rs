use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::graph::{FilterGraph, FilterOp, FilterStage, SPEECH_SAMPLE_RATE, Signal};
use crate::timeline::{MusicTrack, SpeechSegment};

pub const MUSIC: &str = "music";
pub const SPEECH_RAW: &str = "speech_raw";
pub const SPEECH: &str = "speech";
pub const AUDIO_OUT: &str = "aout";

/// Compiled audio branch of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub graph: FilterGraph,
    pub output: Signal,
}

/// Segments that contribute samples; zero-length entries are dropped.
pub fn is_rendered(segment: &SpeechSegment) -> bool {
    segment.effective_duration() > 0.0
}

/// Music chain: trim, gain, fade in, fade out, in that order.
///
/// The fade-out ends where the music or the program ends, whichever is
/// first.
pub fn compile_music(music: &MusicTrack, input: usize, total_duration: f64) -> RenderResult<FilterStage> {
    let trimmed = music.effective_duration();
    if trimmed <= 0.0 {
        return Err(RenderError::invalid(format!(
            "music track {} has no playable duration after trimming",
            music.path.display()
        )));
    }

    let mut ops = Vec::new();
    if music.is_trimmed() {
        ops.push(FilterOp::AudioTrim {
            start: music.trim_start,
            duration: trimmed,
        });
    }
    if music.volume != 1.0 {
        ops.push(FilterOp::Volume { gain: music.volume });
    }
    if music.fade_in > 0.0 {
        ops.push(FilterOp::FadeIn {
            duration: music.fade_in,
        });
    }
    if music.fade_out > 0.0 {
        let start = (trimmed.min(total_duration) - music.fade_out).max(0.0);
        debug!(start, duration = music.fade_out, "Music fade-out");
        ops.push(FilterOp::FadeOut {
            start,
            duration: music.fade_out,
        });
    }
    if ops.is_empty() {
        ops.push(FilterOp::AudioCopy);
    }
    Ok(FilterStage::new(vec![Signal::audio(input)], ops, MUSIC))
}

/// Speech track: one stage per rendered segment, joined into `speech_raw`
/// and leveled into `speech`.
///
/// Spoken clips are read from consecutive program inputs starting at
/// `first_input`, in segment order. Returns `None` when nothing is rendered.
pub fn compile_speech(
    segments: &[SpeechSegment],
    first_input: usize,
    volume: f64,
) -> Option<AudioTrack> {
    let mut graph = FilterGraph::new();
    let mut next_input = first_input;
    let mut parts = Vec::new();

    for (idx, segment) in segments.iter().enumerate() {
        if !is_rendered(segment) {
            debug!(segment = idx, "Skipping zero-length speech segment");
            continue;
        }
        let signal = match segment {
            SpeechSegment::Silence { duration } => graph.push(FilterStage::new(
                vec![],
                vec![FilterOp::Silence {
                    sample_rate: SPEECH_SAMPLE_RATE,
                    duration: *duration,
                }],
                format!("sil{idx}"),
            )),
            SpeechSegment::Clip {
                trim_start,
                trim_end,
                ..
            } => {
                let input = next_input;
                next_input += 1;
                let op = if *trim_start > 0.0 || *trim_end > 0.0 {
                    FilterOp::AudioTrim {
                        start: *trim_start,
                        duration: segment.effective_duration(),
                    }
                } else {
                    FilterOp::AudioCopy
                };
                graph.push(FilterStage::new(
                    vec![Signal::audio(input)],
                    vec![op],
                    format!("sp{idx}"),
                ))
            }
        };
        parts.push(signal);
    }

    if parts.is_empty() {
        return None;
    }

    let joined = if parts.len() == 1 {
        FilterOp::AudioCopy
    } else {
        FilterOp::AudioConcat {
            segments: parts.len(),
        }
    };
    let raw = graph.push(FilterStage::new(parts, vec![joined], SPEECH_RAW));

    let level = if volume != 1.0 {
        FilterOp::Volume { gain: volume }
    } else {
        FilterOp::AudioCopy
    };
    let output = graph.push(FilterStage::new(vec![raw], vec![level], SPEECH));
    Some(AudioTrack { graph, output })
}

/// Final `aout` stage: pass-through for one source, unnormalized mix for more.
pub fn mix_stage(sources: Vec<Signal>) -> Option<FilterStage> {
    let op = match sources.len() {
        0 => return None,
        1 => FilterOp::AudioCopy,
        inputs => FilterOp::AudioMix { inputs },
    };
    Some(FilterStage::new(sources, vec![op], AUDIO_OUT))
}

/// Length of an audio-only program: the longer of speech and music.
pub fn audio_only_duration(music: Option<&MusicTrack>, segments: &[SpeechSegment]) -> f64 {
    let speech: f64 = segments.iter().map(SpeechSegment::effective_duration).sum();
    let music = music.map(MusicTrack::effective_duration).unwrap_or(0.0);
    speech.max(music)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_music_is_copied() {
        let mut music = MusicTrack::new("bed.mp3", 30.0);
        music.fade_in = 0.0;
        music.fade_out = 0.0;
        let stage = compile_music(&music, 2, 10.0).unwrap();
        assert_eq!(stage.to_string(), "[2:a]acopy[music]");
    }

    #[test]
    fn fade_out_never_starts_before_zero() {
        let mut music = MusicTrack::new("bed.mp3", 1.0);
        music.fade_in = 0.0;
        music.fade_out = 3.0;
        let stage = compile_music(&music, 0, 10.0).unwrap();
        assert_eq!(
            stage.ops,
            vec![FilterOp::FadeOut {
                start: 0.0,
                duration: 3.0
            }]
        );
    }

    #[test]
    fn fully_trimmed_music_is_rejected() {
        let mut music = MusicTrack::new("bed.mp3", 4.0);
        music.trim_start = 4.0;
        assert!(matches!(
            compile_music(&music, 0, 4.0),
            Err(RenderError::InvalidTimeline(_))
        ));
    }

    #[test]
    fn mix_depends_on_source_count() {
        assert!(mix_stage(vec![]).is_none());
        let single = mix_stage(vec![Signal::label(MUSIC)]).unwrap();
        assert_eq!(single.to_string(), "[music]acopy[aout]");
        let both = mix_stage(vec![Signal::label(MUSIC), Signal::label(SPEECH)]).unwrap();
        assert_eq!(
            both.to_string(),
            "[music][speech]amix=inputs=2:normalize=0[aout]"
        );
    }

    #[test]
    fn silence_only_track_still_renders() {
        let track = compile_speech(&[SpeechSegment::silence(1.5)], 0, 1.0).unwrap();
        assert_eq!(
            track.graph.render(),
            "anullsrc=r=44100:cl=stereo,atrim=duration=1.500[sil0];\
             [sil0]acopy[speech_raw];[speech_raw]acopy[speech]"
        );
    }

    #[test]
    fn empty_speech_yields_nothing() {
        assert!(compile_speech(&[], 0, 1.0).is_none());
        assert!(compile_speech(&[SpeechSegment::silence(0.0)], 0, 1.0).is_none());
    }
}
