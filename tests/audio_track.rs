use std::path::{Path, PathBuf};

use reelsmith::compile::{ProgramInput, compile};
use reelsmith::engine::build_args;
use reelsmith::error::{RenderError, RenderResult};
use reelsmith::graph::Signal;
use reelsmith::probe::MediaProbe;
use reelsmith::timeline::{MusicTrack, Resolution, SpeechSegment, Timeline, VideoClip};

struct NoProbe;

impl MediaProbe for NoProbe {
    fn duration(&self, path: &Path) -> RenderResult<f64> {
        Err(RenderError::probe(path, "not expected in this test"))
    }

    fn has_audio(&self, _path: &Path) -> bool {
        false
    }
}

fn music(duration: f64, volume: f64, fade_in: f64, fade_out: f64) -> MusicTrack {
    MusicTrack {
        volume,
        fade_in,
        fade_out,
        ..MusicTrack::new("bed.mp3", duration)
    }
}

fn stage_text(timeline: &Timeline, output: &str) -> String {
    let program = compile(timeline, &NoProbe).unwrap();
    program
        .graph
        .stage(output)
        .map(ToString::to_string)
        .unwrap_or_else(|| panic!("no stage produces [{output}]"))
}

#[test]
fn single_clip_with_music_bed() {
    let timeline = Timeline {
        resolution: Resolution::PREVIEW,
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        music: Some(music(30.0, 0.5, 1.0, 2.0)),
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();

    assert_eq!(
        program.filtergraph(),
        "[0:v]scale=1280:720:force_original_aspect_ratio=decrease,\
         pad=1280:720:(ow-iw)/2:(oh-ih)/2[vout];\
         [1:a]volume=0.5,afade=t=in:st=0:d=1.000,afade=t=out:st=8.000:d=2.000[music];\
         [music]acopy[aout]"
    );
    assert_eq!(program.audio_output, Some(Signal::label("aout")));
    assert!(program.encode.truncate_to_shortest);
}

#[test]
fn fade_out_tracks_the_shorter_of_music_and_program() {
    let timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        music: Some(music(6.0, 1.0, 0.0, 1.5)),
        ..Timeline::default()
    };
    assert_eq!(
        stage_text(&timeline, "music"),
        "[1:a]afade=t=out:st=4.500:d=1.500[music]"
    );
}

#[test]
fn trimmed_music_uses_trimmed_length() {
    let mut bed = music(40.0, 1.0, 0.0, 2.0);
    bed.trim_start = 5.0;
    bed.trim_end = 30.0;
    let timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        music: Some(bed),
        ..Timeline::default()
    };
    assert_eq!(
        stage_text(&timeline, "music"),
        "[1:a]atrim=start=5.000:duration=5.000,asetpts=PTS-STARTPTS,\
         afade=t=out:st=3.000:d=2.000[music]"
    );
}

#[test]
fn speech_segments_are_generated_trimmed_and_joined() {
    let timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        speech: vec![
            SpeechSegment::silence(1.5),
            SpeechSegment::Clip {
                path: PathBuf::from("s1.wav"),
                duration: 3.0,
                trim_start: 0.5,
                trim_end: 0.0,
            },
            SpeechSegment::clip("s2.wav", 2.0),
        ],
        speech_volume: 1.5,
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();

    let audio: Vec<String> = program
        .stages()
        .iter()
        .skip(1)
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        audio,
        vec![
            "anullsrc=r=44100:cl=stereo,atrim=duration=1.500[sil0]",
            "[1:a]atrim=start=0.500:duration=2.500,asetpts=PTS-STARTPTS[sp1]",
            "[2:a]acopy[sp2]",
            "[sil0][sp1][sp2]concat=n=3:v=0:a=1[speech_raw]",
            "[speech_raw]volume=1.5[speech]",
            "[speech]acopy[aout]",
        ]
    );
    assert_eq!(
        program.inputs,
        vec![
            ProgramInput::File { path: "a.mp4".into() },
            ProgramInput::File { path: "s1.wav".into() },
            ProgramInput::File { path: "s2.wav".into() },
        ]
    );
}

#[test]
fn music_and_speech_are_mixed_without_normalization() {
    let timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        music: Some(music(30.0, 0.3, 0.0, 0.0)),
        speech: vec![SpeechSegment::clip("vo.wav", 8.0)],
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();

    // Inputs: clips first, then music, then spoken clips.
    assert_eq!(
        program.inputs[1],
        ProgramInput::File { path: "bed.mp3".into() }
    );
    assert_eq!(
        program.inputs[2],
        ProgramInput::File { path: "vo.wav".into() }
    );
    assert_eq!(
        program.graph.stage("sp0").unwrap().to_string(),
        "[2:a]acopy[sp0]"
    );
    assert_eq!(
        program.graph.stage("speech_raw").unwrap().to_string(),
        "[sp0]acopy[speech_raw]"
    );
    assert_eq!(
        program.graph.stage("aout").unwrap().to_string(),
        "[music][speech]amix=inputs=2:normalize=0[aout]"
    );
}

#[test]
fn fully_trimmed_music_gives_way_to_speech() {
    let mut bed = music(6.0, 0.5, 0.0, 0.0);
    bed.trim_start = 6.0;
    let mut timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        music: Some(bed),
        speech: vec![SpeechSegment::clip("vo.wav", 5.0)],
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();

    assert!(program.graph.stage("music").is_none());
    assert_eq!(
        program.inputs,
        vec![
            ProgramInput::File { path: "a.mp4".into() },
            ProgramInput::File { path: "vo.wav".into() },
        ]
    );
    assert_eq!(
        program.graph.stage("aout").unwrap().to_string(),
        "[speech]acopy[aout]"
    );

    timeline.speech.clear();
    assert!(matches!(
        compile(&timeline, &NoProbe),
        Err(RenderError::InvalidTimeline(_))
    ));
}

#[test]
fn zero_length_speech_segments_are_skipped() {
    let timeline = Timeline {
        clips: vec![VideoClip::new("a.mp4", 10.0)],
        speech: vec![
            SpeechSegment::silence(0.0),
            SpeechSegment::clip("vo.wav", 4.0),
        ],
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();
    assert!(program.graph.stage("sil0").is_none());
    assert_eq!(
        program.graph.stage("speech_raw").unwrap().to_string(),
        "[sp1]acopy[speech_raw]"
    );
}

#[test]
fn audio_only_renders_over_black_canvas() {
    let mut bed = music(20.0, 1.0, 0.5, 0.5);
    bed.trim_start = 2.0;
    let timeline = Timeline {
        music: Some(bed),
        speech: vec![SpeechSegment::silence(1.0), SpeechSegment::clip("vo.wav", 12.0)],
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();

    assert_eq!(program.total_duration, 18.0);
    assert_eq!(
        program.inputs[0],
        ProgramInput::BlackCanvas {
            width: 1920,
            height: 1080,
            fps: 30,
            duration: 18.0,
        }
    );
    assert_eq!(program.video_output, Signal::video(0));
    assert_eq!(
        program.graph.stage("music").unwrap().to_string(),
        "[1:a]atrim=start=2.000:duration=18.000,asetpts=PTS-STARTPTS,\
         afade=t=in:st=0:d=0.500,afade=t=out:st=17.500:d=0.500[music]"
    );
    assert_eq!(
        program.graph.stage("sp1").unwrap().to_string(),
        "[2:a]acopy[sp1]"
    );
    assert!(program.encode.truncate_to_shortest);

    let args: Vec<String> = build_args(&program, Path::new("out.mp4"))
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let lavfi = args.iter().position(|a| a == "lavfi").unwrap();
    assert_eq!(args[lavfi + 2], "color=c=black:s=1920x1080:r=30:d=18.000");
    let map = args.iter().position(|a| a == "-map").unwrap();
    assert_eq!(&args[map..map + 4], ["-map", "0:v", "-map", "[aout]"]);
}

#[test]
fn audio_only_speech_longer_than_music_sets_length() {
    let timeline = Timeline {
        music: Some(music(5.0, 1.0, 0.0, 1.0)),
        speech: vec![SpeechSegment::clip("vo.wav", 9.0)],
        ..Timeline::default()
    };
    let program = compile(&timeline, &NoProbe).unwrap();
    assert_eq!(program.total_duration, 9.0);
    assert_eq!(
        program.graph.stage("music").unwrap().to_string(),
        "[1:a]afade=t=out:st=4.000:d=1.000[music]"
    );
}
