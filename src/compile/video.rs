use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::graph::{
    FilterGraph, FilterOp, FilterStage, OUTPUT_FPS, OUTPUT_PIXEL_FORMAT, Signal,
};
use crate::timeline::{CrossfadeSpec, Resolution, VideoClip};

pub const VIDEO_OUT: &str = "vout";

/// Compiled video branch of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrack {
    pub graph: FilterGraph,
    pub output: Signal,
    pub duration: f64,
}

/// Cross-fade start offsets, one per adjacent clip pair.
///
/// `offsets[0] = d0 - x`, `offsets[i] = offsets[i-1] + d_i - x`.
pub fn crossfade_offsets(durations: &[f64], crossfade: f64) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(durations.len().saturating_sub(1));
    let mut offset = match durations.first() {
        Some(first) => first - crossfade,
        None => return offsets,
    };
    for duration in durations.iter().skip(1) {
        offsets.push(offset);
        offset += duration - crossfade;
    }
    offsets
}

/// Length of the cross-faded chain: `sum(d) - x * (n - 1)`.
pub fn chained_duration(durations: &[f64], crossfade: f64) -> f64 {
    let overlaps = durations.len().saturating_sub(1) as f64;
    durations.iter().sum::<f64>() - crossfade * overlaps
}

/// Compile the clip sequence. Clip `i` is read from program input `i`.
pub fn compile_video(
    clips: &[VideoClip],
    crossfade: &CrossfadeSpec,
    resolution: Resolution,
) -> RenderResult<VideoTrack> {
    if clips.is_empty() {
        return Err(RenderError::invalid("video track needs at least one clip"));
    }
    for (idx, clip) in clips.iter().enumerate() {
        if clip.effective_duration() <= 0.0 {
            return Err(RenderError::invalid(format!(
                "clip {idx} ({}) has no playable duration after trimming",
                clip.path.display()
            )));
        }
    }

    let mut graph = FilterGraph::new();

    if let [clip] = clips {
        let mut ops = trim_ops(clip);
        ops.push(fit(resolution));
        let output = graph.push(FilterStage::new(vec![Signal::video(0)], ops, VIDEO_OUT));
        return Ok(VideoTrack {
            graph,
            output,
            duration: clip.effective_duration(),
        });
    }

    let durations: Vec<f64> = clips.iter().map(VideoClip::effective_duration).collect();
    if crossfade.duration < 0.0 {
        return Err(RenderError::invalid(format!(
            "cross-fade duration {} is negative",
            crossfade.duration
        )));
    }
    if let Some((idx, shortest)) = durations
        .iter()
        .enumerate()
        .find(|(_, duration)| **duration < crossfade.duration)
    {
        return Err(RenderError::invalid(format!(
            "cross-fade of {:.3}s is longer than clip {idx} ({shortest:.3}s)",
            crossfade.duration
        )));
    }

    let normalized: Vec<Signal> = clips
        .iter()
        .enumerate()
        .map(|(idx, clip)| {
            let mut ops = trim_ops(clip);
            ops.extend([
                fit(resolution),
                FilterOp::SquarePixels,
                FilterOp::FrameRate { fps: OUTPUT_FPS },
                FilterOp::PixelFormat {
                    format: OUTPUT_PIXEL_FORMAT.to_string(),
                },
                FilterOp::ResetTimestamps,
            ]);
            graph.push(FilterStage::new(
                vec![Signal::video(idx)],
                ops,
                format!("v{idx}"),
            ))
        })
        .collect();

    let offsets = crossfade_offsets(&durations, crossfade.duration);
    let last = offsets.len();
    let mut previous = normalized[0].clone();
    for (pair, offset) in offsets.iter().enumerate() {
        let right = pair + 1;
        let output = if right == last {
            VIDEO_OUT.to_string()
        } else {
            format!("vx{right}")
        };
        debug!(clip = right, offset = *offset, "Cross-fade");
        previous = graph.push(FilterStage::new(
            vec![previous, normalized[right].clone()],
            vec![FilterOp::CrossFade {
                transition: crossfade.transition.clone(),
                duration: crossfade.duration,
                offset: *offset,
            }],
            output,
        ));
    }

    Ok(VideoTrack {
        graph,
        output: previous,
        duration: chained_duration(&durations, crossfade.duration),
    })
}

fn trim_ops(clip: &VideoClip) -> Vec<FilterOp> {
    if clip.is_trimmed() {
        vec![FilterOp::Trim {
            start: clip.trim_start,
            duration: clip.effective_duration(),
        }]
    } else {
        Vec::new()
    }
}

fn fit(resolution: Resolution) -> FilterOp {
    FilterOp::FitToFrame {
        width: resolution.width,
        height: resolution.height,
    }
}
