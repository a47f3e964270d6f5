//! Structured filter-graph IR.
//!
//! Compilers emit typed [`FilterStage`] records; the textual ffmpeg
//! `-filter_complex` syntax is produced only by [`FilterGraph::render`].

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::error::{RenderError, RenderResult};

pub const SPEECH_SAMPLE_RATE: u32 = 44_100;
pub const OUTPUT_FPS: u32 = 30;
pub const OUTPUT_PIXEL_FORMAT: &str = "yuv420p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn specifier(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

/// A value flowing between stages: either a raw input stream or a named
/// intermediate produced by an earlier stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    Stream { input: usize, stream: StreamKind },
    Label { name: String },
}

impl Signal {
    pub fn video(input: usize) -> Self {
        Signal::Stream {
            input,
            stream: StreamKind::Video,
        }
    }

    pub fn audio(input: usize) -> Self {
        Signal::Stream {
            input,
            stream: StreamKind::Audio,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Signal::Label { name: name.into() }
    }

    /// Argument for `-map`: `0:v` for raw streams, `[vout]` for labels.
    pub fn map_arg(&self) -> String {
        match self {
            Signal::Stream { input, stream } => format!("{input}:{}", stream.specifier()),
            Signal::Label { name } => format!("[{name}]"),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Stream { input, stream } => write!(f, "[{input}:{}]", stream.specifier()),
            Signal::Label { name } => write!(f, "[{name}]"),
        }
    }
}

/// Seconds rendered at millisecond precision.
pub fn seconds(value: f64) -> String {
    format!("{value:.3}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOp {
    Trim { start: f64, duration: f64 },
    FitToFrame { width: u32, height: u32 },
    SquarePixels,
    FrameRate { fps: u32 },
    PixelFormat { format: String },
    ResetTimestamps,
    CrossFade { transition: String, duration: f64, offset: f64 },
    AudioTrim { start: f64, duration: f64 },
    Volume { gain: f64 },
    FadeIn { duration: f64 },
    FadeOut { start: f64, duration: f64 },
    Silence { sample_rate: u32, duration: f64 },
    AudioCopy,
    AudioConcat { segments: usize },
    AudioMix { inputs: usize },
    EvenDimensions,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Trim { start, duration } => write!(
                f,
                "trim=start={}:duration={},setpts=PTS-STARTPTS",
                seconds(*start),
                seconds(*duration)
            ),
            FilterOp::FitToFrame { width, height } => write!(
                f,
                "scale={width}:{height}:force_original_aspect_ratio=decrease,\
                 pad={width}:{height}:(ow-iw)/2:(oh-ih)/2"
            ),
            FilterOp::SquarePixels => f.write_str("setsar=1"),
            FilterOp::FrameRate { fps } => write!(f, "fps={fps}"),
            FilterOp::PixelFormat { format } => write!(f, "format={format}"),
            FilterOp::ResetTimestamps => f.write_str("setpts=PTS-STARTPTS"),
            FilterOp::CrossFade {
                transition,
                duration,
                offset,
            } => write!(
                f,
                "xfade=transition={transition}:duration={}:offset={}",
                seconds(*duration),
                seconds(*offset)
            ),
            FilterOp::AudioTrim { start, duration } => write!(
                f,
                "atrim=start={}:duration={},asetpts=PTS-STARTPTS",
                seconds(*start),
                seconds(*duration)
            ),
            FilterOp::Volume { gain } => write!(f, "volume={gain}"),
            FilterOp::FadeIn { duration } => write!(f, "afade=t=in:st=0:d={}", seconds(*duration)),
            FilterOp::FadeOut { start, duration } => write!(
                f,
                "afade=t=out:st={}:d={}",
                seconds(*start),
                seconds(*duration)
            ),
            FilterOp::Silence {
                sample_rate,
                duration,
            } => write!(
                f,
                "anullsrc=r={sample_rate}:cl=stereo,atrim=duration={}",
                seconds(*duration)
            ),
            FilterOp::AudioCopy => f.write_str("acopy"),
            FilterOp::AudioConcat { segments } => write!(f, "concat=n={segments}:v=0:a=1"),
            FilterOp::AudioMix { inputs } => write!(f, "amix=inputs={inputs}:normalize=0"),
            FilterOp::EvenDimensions => f.write_str("scale=trunc(iw/2)*2:trunc(ih/2)*2"),
        }
    }
}

/// One filter chain: consumes `inputs`, applies `ops` in order, and
/// publishes the result under `output`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStage {
    pub inputs: Vec<Signal>,
    pub ops: Vec<FilterOp>,
    pub output: String,
}

impl FilterStage {
    pub fn new(inputs: Vec<Signal>, ops: Vec<FilterOp>, output: impl Into<String>) -> Self {
        Self {
            inputs,
            ops,
            output: output.into(),
        }
    }

    pub fn output_signal(&self) -> Signal {
        Signal::label(self.output.clone())
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "{input}")?;
        }
        for (idx, op) in self.ops.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{op}")?;
        }
        write!(f, "[{}]", self.output)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterGraph {
    stages: Vec<FilterStage>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage and return a handle to its output.
    pub fn push(&mut self, stage: FilterStage) -> Signal {
        let signal = stage.output_signal();
        self.stages.push(stage);
        signal
    }

    pub fn extend(&mut self, other: FilterGraph) {
        self.stages.extend(other.stages);
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn stage(&self, output: &str) -> Option<&FilterStage> {
        self.stages.iter().find(|stage| stage.output == output)
    }

    /// `;`-joined ffmpeg filtergraph text.
    pub fn render(&self) -> String {
        self.stages
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Every label must be produced exactly once and before it is consumed;
    /// raw streams must reference an existing input.
    pub fn check_wiring(&self, input_count: usize) -> RenderResult<()> {
        let mut produced: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            for input in &stage.inputs {
                match input {
                    Signal::Stream { input, .. } if *input >= input_count => {
                        return Err(RenderError::invalid(format!(
                            "stage [{}] reads missing input #{input}",
                            stage.output
                        )));
                    }
                    Signal::Label { name } if !produced.contains(name.as_str()) => {
                        return Err(RenderError::invalid(format!(
                            "stage [{}] consumes [{name}] before it is produced",
                            stage.output
                        )));
                    }
                    _ => {}
                }
            }
            if !produced.insert(stage.output.as_str()) {
                return Err(RenderError::invalid(format!(
                    "signal [{}] produced twice",
                    stage.output
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_renders_inputs_ops_and_output() {
        let stage = FilterStage::new(
            vec![Signal::video(0)],
            vec![
                FilterOp::Trim {
                    start: 1.0,
                    duration: 4.25,
                },
                FilterOp::FitToFrame {
                    width: 1280,
                    height: 720,
                },
            ],
            "vout",
        );
        assert_eq!(
            stage.to_string(),
            "[0:v]trim=start=1.000:duration=4.250,setpts=PTS-STARTPTS,\
             scale=1280:720:force_original_aspect_ratio=decrease,\
             pad=1280:720:(ow-iw)/2:(oh-ih)/2[vout]"
        );
    }

    #[test]
    fn source_stage_has_no_inputs() {
        let stage = FilterStage::new(
            vec![],
            vec![FilterOp::Silence {
                sample_rate: SPEECH_SAMPLE_RATE,
                duration: 2.0,
            }],
            "sil0",
        );
        assert_eq!(
            stage.to_string(),
            "anullsrc=r=44100:cl=stereo,atrim=duration=2.000[sil0]"
        );
    }

    #[test]
    fn map_args_distinguish_streams_from_labels() {
        assert_eq!(Signal::audio(2).map_arg(), "2:a");
        assert_eq!(Signal::label("aout").map_arg(), "[aout]");
        assert_eq!(Signal::video(0).to_string(), "[0:v]");
    }

    #[test]
    fn gains_print_without_padding() {
        assert_eq!(FilterOp::Volume { gain: 0.5 }.to_string(), "volume=0.5");
        assert_eq!(FilterOp::Volume { gain: 1.25 }.to_string(), "volume=1.25");
    }

    #[test]
    fn wiring_rejects_forward_references() {
        let mut graph = FilterGraph::new();
        graph.push(FilterStage::new(
            vec![Signal::label("later")],
            vec![FilterOp::AudioCopy],
            "aout",
        ));
        assert!(graph.check_wiring(1).is_err());

        let mut graph = FilterGraph::new();
        let music = graph.push(FilterStage::new(
            vec![Signal::audio(0)],
            vec![FilterOp::AudioCopy],
            "music",
        ));
        graph.push(FilterStage::new(vec![music], vec![FilterOp::AudioCopy], "aout"));
        assert!(graph.check_wiring(1).is_ok());
        assert!(graph.check_wiring(0).is_err());
        assert_eq!(graph.render(), "[0:a]acopy[music];[music]acopy[aout]");
    }
}
