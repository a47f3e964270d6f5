//! Program assembly: timeline in, engine-ready program out.

pub mod audio;
pub mod video;

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RenderError, RenderResult};
use crate::graph::{FilterGraph, FilterStage, OUTPUT_FPS, Signal};
use crate::probe::MediaProbe;
use crate::timeline::{AudioSourcePolicy, Resolution, SpeechSegment, Timeline};

pub use audio::{AudioTrack, audio_only_duration, compile_music, compile_speech, mix_stage};
pub use video::{VideoTrack, chained_duration, compile_video, crossfade_offsets};

/// One `-i` source of a program, in input-index order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgramInput {
    File {
        path: PathBuf,
    },
    /// Generated black video used when there are no clips.
    BlackCanvas {
        width: u32,
        height: u32,
        fps: u32,
        duration: f64,
    },
    /// Numbered still frames, e.g. `frame_%05d.png`.
    ImageSequence {
        pattern: PathBuf,
        framerate: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeParams {
    pub resolution: Resolution,
    pub video_codec: String,
    pub preset: Option<String>,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub pixel_format: Option<String>,
    pub faststart: bool,
    pub truncate_to_shortest: bool,
}

impl EncodeParams {
    fn from_timeline(timeline: &Timeline) -> Self {
        Self {
            resolution: timeline.resolution,
            video_codec: timeline.encode.video_codec.clone(),
            preset: Some(timeline.encode.preset().to_string()),
            crf: timeline.encode.crf(),
            audio_codec: timeline.encode.audio_codec.clone(),
            audio_bitrate: timeline.encode.audio_bitrate.clone(),
            pixel_format: None,
            faststart: false,
            truncate_to_shortest: false,
        }
    }
}

/// Everything the engine needs for one render. Built fresh per compile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledProgram {
    pub inputs: Vec<ProgramInput>,
    pub graph: FilterGraph,
    pub video_output: Signal,
    pub audio_output: Option<Signal>,
    pub total_duration: f64,
    pub encode: EncodeParams,
}

impl CompiledProgram {
    pub fn filtergraph(&self) -> String {
        self.graph.render()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_output.is_some()
    }

    pub fn stages(&self) -> &[FilterStage] {
        self.graph.stages()
    }
}

/// Compile a timeline whose durations are already known.
///
/// `probe` is consulted only for clip audio under the `video` policy.
pub fn compile(timeline: &Timeline, probe: &dyn MediaProbe) -> RenderResult<CompiledProgram> {
    if !timeline.has_media() {
        return Err(RenderError::invalid(
            "timeline has no media: add a clip, a music track or speech",
        ));
    }
    timeline.check_non_negative()?;

    let program = if timeline.clips.is_empty() {
        compile_audio_only(timeline)?
    } else {
        compile_with_clips(timeline, probe)?
    };
    program.graph.check_wiring(program.inputs.len())?;

    info!(
        clips = timeline.clips.len(),
        stages = program.graph.len(),
        audio = program.has_audio(),
        policy = ?timeline.audio_source,
        total_duration = program.total_duration,
        "Compiled program"
    );
    Ok(program)
}

fn compile_with_clips(timeline: &Timeline, probe: &dyn MediaProbe) -> RenderResult<CompiledProgram> {
    let video = compile_video(&timeline.clips, &timeline.crossfade(), timeline.resolution)?;
    let mut inputs: Vec<ProgramInput> = timeline
        .clips
        .iter()
        .map(|clip| ProgramInput::File {
            path: clip.path.clone(),
        })
        .collect();
    let mut graph = video.graph;

    let audio_output = match timeline.audio_source {
        AudioSourcePolicy::Silent => None,
        AudioSourcePolicy::VideoNative => native_audio(timeline, probe, &mut graph),
        AudioSourcePolicy::Editor => Some(
            editor_audio(timeline, video.duration, &mut inputs, &mut graph)?.ok_or_else(|| {
                RenderError::invalid(
                    "audio source `editor` needs a music track or speech; \
                     use `video` or `none` for clip audio or silence",
                )
            })?,
        ),
    };

    let mut encode = EncodeParams::from_timeline(timeline);
    // Cross-faded clips may carry audio shorter than the composite.
    encode.truncate_to_shortest = audio_output.is_some() && timeline.clips.len() <= 1;

    Ok(CompiledProgram {
        inputs,
        graph,
        video_output: video.output,
        audio_output,
        total_duration: video.duration,
        encode,
    })
}

fn compile_audio_only(timeline: &Timeline) -> RenderResult<CompiledProgram> {
    let total_duration = audio_only_duration(timeline.music.as_ref(), &timeline.speech);
    if total_duration <= 0.0 {
        return Err(RenderError::invalid(
            "audio-only timeline has no playable audio",
        ));
    }
    debug!(total_duration, "No clips, rendering over a black canvas");

    let mut inputs = vec![ProgramInput::BlackCanvas {
        width: timeline.resolution.width,
        height: timeline.resolution.height,
        fps: OUTPUT_FPS,
        duration: total_duration,
    }];
    let mut graph = FilterGraph::new();

    let audio_output = match timeline.audio_source {
        AudioSourcePolicy::Editor => Some(
            editor_audio(timeline, total_duration, &mut inputs, &mut graph)?
                .ok_or_else(|| RenderError::invalid("audio-only timeline has no playable audio"))?,
        ),
        AudioSourcePolicy::VideoNative | AudioSourcePolicy::Silent => None,
    };

    let mut encode = EncodeParams::from_timeline(timeline);
    encode.truncate_to_shortest = audio_output.is_some();

    Ok(CompiledProgram {
        inputs,
        graph,
        video_output: Signal::video(0),
        audio_output,
        total_duration,
        encode,
    })
}

/// Music and speech, mixed into `aout`. Appends the inputs it reads.
fn editor_audio(
    timeline: &Timeline,
    total_duration: f64,
    inputs: &mut Vec<ProgramInput>,
    graph: &mut FilterGraph,
) -> RenderResult<Option<Signal>> {
    let mut sources = Vec::new();

    let speech_plays = timeline.speech.iter().any(audio::is_rendered);
    let music = timeline.music.as_ref().filter(|music| {
        let playable = music.effective_duration() > 0.0;
        if !playable && speech_plays {
            warn!(path = %music.path.display(), "Music trimmed to nothing, using speech only");
        }
        playable || !speech_plays
    });
    if let Some(music) = music {
        let input = inputs.len();
        inputs.push(ProgramInput::File {
            path: music.path.clone(),
        });
        sources.push(graph.push(compile_music(music, input, total_duration)?));
    }

    let first_speech_input = inputs.len();
    for segment in timeline.speech.iter().filter(|s| audio::is_rendered(s)) {
        if let SpeechSegment::Clip { path, .. } = segment {
            inputs.push(ProgramInput::File { path: path.clone() });
        }
    }
    if let Some(speech) = compile_speech(&timeline.speech, first_speech_input, timeline.speech_volume) {
        graph.extend(speech.graph);
        sources.push(speech.output);
    }

    Ok(mix_stage(sources).map(|stage| graph.push(stage)))
}

/// Clips' own audio: mapped directly when one clip has audio, mixed otherwise.
fn native_audio(timeline: &Timeline, probe: &dyn MediaProbe, graph: &mut FilterGraph) -> Option<Signal> {
    let with_audio: Vec<Signal> = timeline
        .clips
        .iter()
        .enumerate()
        .filter(|(_, clip)| probe.has_audio(&clip.path))
        .map(|(idx, _)| Signal::audio(idx))
        .collect();
    debug!(clips_with_audio = with_audio.len(), "Clip audio");

    match with_audio.len() {
        0 => None,
        1 => with_audio.into_iter().next(),
        _ => mix_stage(with_audio).map(|stage| graph.push(stage)),
    }
}
