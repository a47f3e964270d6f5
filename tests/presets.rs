use reelsmith::presets::{PRESET_NAMES, generate_preset, preset_timeline};
use reelsmith::timeline::Timeline;
use reelsmith::validation::validate_timeline;
use std::fs;
use tempfile::tempdir;

#[test]
fn generate_narrated_preset_writes_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("timelines/narrated.yaml");
    let generated = generate_preset("narrated", &path).expect("preset generation");
    assert!(generated.exists());

    let contents = fs::read_to_string(&generated).expect("read preset");
    assert!(contents.contains("transition: dissolve"));
    assert!(contents.contains("kind: silence"));

    let reloaded = Timeline::load(&generated).expect("reload preset");
    assert_eq!(reloaded.clips.len(), 2);
    assert_eq!(reloaded.speech.len(), 4);
    // Paths in the file are relative to the file itself.
    assert_eq!(
        reloaded.clips[0].path,
        temp.path().join("timelines/clips/scene1.mp4")
    );
}

#[test]
fn every_preset_passes_validation() {
    for name in PRESET_NAMES {
        let timeline = preset_timeline(name).expect("known preset");
        let report = validate_timeline(&timeline);
        assert!(report.is_ok(), "{name}: {:?}", report.errors);
    }
}

#[test]
fn unknown_preset_lists_alternatives() {
    let err = preset_timeline("vlog").unwrap_err().to_string();
    assert!(err.contains("montage"), "{err}");
}
