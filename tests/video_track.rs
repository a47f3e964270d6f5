use std::path::Path;

use reelsmith::compile::compile;
use reelsmith::error::{RenderError, RenderResult};
use reelsmith::graph::Signal;
use reelsmith::probe::MediaProbe;
use reelsmith::timeline::{AudioSourcePolicy, CrossfadeSpec, Timeline, VideoClip};

struct SilentProbe;

impl MediaProbe for SilentProbe {
    fn duration(&self, path: &Path) -> RenderResult<f64> {
        Err(RenderError::probe(path, "not expected in this test"))
    }

    fn has_audio(&self, _path: &Path) -> bool {
        false
    }
}

fn silent_timeline(clips: Vec<VideoClip>) -> Timeline {
    Timeline {
        audio_source: AudioSourcePolicy::Silent,
        clips,
        ..Timeline::default()
    }
}

const FIT_1080: &str = "scale=1920:1080:force_original_aspect_ratio=decrease,\
                        pad=1920:1080:(ow-iw)/2:(oh-ih)/2";

#[test]
fn single_trimmed_clip_keeps_its_effective_length() {
    let timeline = silent_timeline(vec![VideoClip::new("a.mp4", 12.0).with_trim(2.0, 3.5)]);
    let program = compile(&timeline, &SilentProbe).unwrap();

    assert_eq!(program.total_duration, 6.5);
    assert_eq!(
        program.filtergraph(),
        format!("[0:v]trim=start=2.000:duration=6.500,setpts=PTS-STARTPTS,{FIT_1080}[vout]")
    );
    assert_eq!(program.video_output, Signal::label("vout"));
}

#[test]
fn two_clips_normalize_then_crossfade() {
    let timeline = silent_timeline(vec![
        VideoClip::new("a.mp4", 5.0),
        VideoClip::new("b.mp4", 6.0).with_trim(1.0, 1.0),
    ]);
    let program = compile(&timeline, &SilentProbe).unwrap();

    let stages: Vec<String> = program.stages().iter().map(ToString::to_string).collect();
    assert_eq!(
        stages,
        vec![
            format!("[0:v]{FIT_1080},setsar=1,fps=30,format=yuv420p,setpts=PTS-STARTPTS[v0]"),
            format!(
                "[1:v]trim=start=1.000:duration=4.000,setpts=PTS-STARTPTS,\
                 {FIT_1080},setsar=1,fps=30,format=yuv420p,setpts=PTS-STARTPTS[v1]"
            ),
            "[v0][v1]xfade=transition=fade:duration=1.000:offset=4.000[vout]".to_string(),
        ]
    );
    assert_eq!(program.total_duration, 8.0);
}

#[test]
fn chained_crossfades_accumulate_offsets() {
    let mut timeline = silent_timeline(vec![
        VideoClip::new("a.mp4", 5.0),
        VideoClip::new("b.mp4", 4.0),
        VideoClip::new("c.mp4", 6.0),
        VideoClip::new("d.mp4", 3.0),
    ]);
    timeline.crossfade = Some(CrossfadeSpec {
        duration: 0.5,
        transition: "wipeleft".into(),
    });
    let program = compile(&timeline, &SilentProbe).unwrap();

    let fades: Vec<String> = program
        .stages()
        .iter()
        .filter(|stage| stage.output.starts_with("vx") || stage.output == "vout")
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        fades,
        vec![
            "[v0][v1]xfade=transition=wipeleft:duration=0.500:offset=4.500[vx1]",
            "[vx1][v2]xfade=transition=wipeleft:duration=0.500:offset=8.000[vx2]",
            "[vx2][v3]xfade=transition=wipeleft:duration=0.500:offset=13.500[vout]",
        ]
    );
    // 18 seconds of material minus three half-second overlaps.
    assert_eq!(program.total_duration, 16.5);
}

#[test]
fn crossfade_longer_than_a_clip_is_rejected() {
    let timeline = silent_timeline(vec![
        VideoClip::new("a.mp4", 5.0),
        VideoClip::new("b.mp4", 3.0).with_trim(1.0, 1.5),
    ]);
    let err = compile(&timeline, &SilentProbe).unwrap_err();
    match err {
        RenderError::InvalidTimeline(msg) => assert!(msg.contains("clip 1"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fully_trimmed_clip_is_rejected() {
    let timeline = silent_timeline(vec![VideoClip::new("a.mp4", 3.0).with_trim(2.0, 1.0)]);
    assert!(matches!(
        compile(&timeline, &SilentProbe),
        Err(RenderError::InvalidTimeline(_))
    ));
}

#[test]
fn target_resolution_drives_scale_and_pad() {
    let mut timeline = silent_timeline(vec![VideoClip::new("a.mp4", 3.0)]);
    timeline.resolution = reelsmith::timeline::Resolution::new(720, 1280);
    let program = compile(&timeline, &SilentProbe).unwrap();
    assert!(program.filtergraph().contains(
        "scale=720:1280:force_original_aspect_ratio=decrease,pad=720:1280:(ow-iw)/2:(oh-ih)/2"
    ));
}

fn xfade_offsets(durations: &[f64]) -> (Vec<String>, f64) {
    let clips = durations
        .iter()
        .enumerate()
        .map(|(idx, secs)| VideoClip::new(format!("clip{idx}.mp4"), *secs))
        .collect();
    let program = compile(&silent_timeline(clips), &SilentProbe).unwrap();
    let offsets = program
        .stages()
        .iter()
        .map(ToString::to_string)
        .filter_map(|stage| {
            let (_, rest) = stage.split_once("offset=")?;
            rest.split_once('[').map(|(offset, _)| offset.to_string())
        })
        .collect();
    (offsets, program.total_duration)
}

#[test]
fn reordering_clips_moves_offsets_but_not_total() {
    let (forward, forward_total) = xfade_offsets(&[10.0, 8.0, 12.0]);
    let (reversed, reversed_total) = xfade_offsets(&[12.0, 8.0, 10.0]);

    assert_eq!(forward, vec!["9.000", "16.000"]);
    assert_eq!(reversed, vec!["11.000", "18.000"]);
    assert_eq!(forward_total, 28.0);
    assert_eq!(reversed_total, 28.0);
}

#[test]
fn negative_trim_is_rejected_before_offsets_are_computed() {
    let mut timeline = silent_timeline(vec![
        VideoClip::new("a.mp4", 10.0).with_trim(-3.0, 0.0),
        VideoClip::new("b.mp4", 8.0),
    ]);
    match compile(&timeline, &SilentProbe).unwrap_err() {
        RenderError::InvalidTimeline(msg) => assert!(msg.contains("clip 1 trim_start"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }

    timeline.clips[0] = VideoClip::new("a.mp4", 10.0).with_trim(3.0, 0.0);
    let program = compile(&timeline, &SilentProbe).unwrap();
    assert_eq!(program.total_duration, 14.0);
}

#[test]
fn negative_music_volume_is_rejected() {
    let timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 5.0)],
        music: Some(reelsmith::timeline::MusicTrack {
            volume: -0.2,
            ..reelsmith::timeline::MusicTrack::new("bed.mp3", 20.0)
        }),
        ..Timeline::default()
    };
    assert!(matches!(
        compile(&timeline, &SilentProbe),
        Err(RenderError::InvalidTimeline(_))
    ));
}
