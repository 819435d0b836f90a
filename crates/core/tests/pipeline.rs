use std::{fs, path::Path};

use beatlight_core::{
    AnalysisPayload, AudioAnalysis, CueScheduler, FixtureRegistry, FunctionKind, GeneratorConfig,
    SegmentPayload, ShowGenError, ShowGenerator, Style, Workspace,
};

const FIXTURES: &str = r#"{
    "fixtures": [
        {
            "name": "Left Par", "manufacturer": "Generic", "model": "RGB Par",
            "mode": "3 Channel", "universe": 1, "address": 1, "channels": 3,
            "channel_map": {"red": 0, "green": 1, "blue": 2}
        },
        {
            "name": "Right Par", "manufacturer": "Generic", "model": "RGB Par",
            "mode": "3 Channel", "universe": 1, "address": 4, "channels": 3,
            "channel_map": {"red": 0, "green": 1, "blue": 2}
        },
        {
            "name": "Bar", "manufacturer": "Keobin", "model": "L2800",
            "mode": "7 Channel", "universe": 1, "address": 20, "channels": 7,
            "channel_map": {"dimmer": 0, "red": 1, "green": 2, "blue": 3, "strobe": 4}
        }
    ],
    "color_palette": {
        "red": [255, 0, 0],
        "blue": [0, 0, 255],
        "off": [0, 0, 0],
        "purple": [128, 0, 255],
        "amber": [255, 160, 0]
    }
}"#;

fn analysis_json(beats: usize) -> String {
    let beats: Vec<f64> = (0..beats).map(|i| i as f64 * 0.5).collect();
    serde_json::json!({
        "tempo": 120.0,
        "beats": beats,
        "segments": [
            {"start": 0.0, "end": 4.0, "label": "intro"},
            {"start": 4.25, "end": 12.0, "label": "chorus"},
            {"start": 12.0, "end": 16.0, "label": "outro"}
        ]
    })
    .to_string()
}

fn write_inputs(dir: &Path, beats: usize) -> (std::path::PathBuf, std::path::PathBuf) {
    let analysis = dir.join("analysis.json");
    let fixtures = dir.join("fixtures.json");
    fs::write(&analysis, analysis_json(beats)).unwrap();
    fs::write(&fixtures, FIXTURES).unwrap();
    (analysis, fixtures)
}

#[test]
fn identical_inputs_produce_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 32);
    let first = dir.path().join("first.qxw");
    let second = dir.path().join("second.qxw");

    for style in Style::ALL {
        let generator = ShowGenerator::new(GeneratorConfig::with_style(style));
        generator
            .generate_to_file(&analysis, &fixtures, Some("audio/song.wav"), &first)
            .unwrap();
        generator
            .generate_to_file(&analysis, &fixtures, Some("audio/song.wav"), &second)
            .unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }
}

#[test]
fn written_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 32);
    let output = dir.path().join("nested").join("show.qxw");

    let generated = ShowGenerator::new(GeneratorConfig::with_style(Style::Dramatic))
        .generate_to_file(&analysis, &fixtures, Some("audio/song.wav"), &output)
        .unwrap();
    let reloaded = Workspace::load(&output).unwrap();

    assert_eq!(reloaded, generated);
    assert_eq!(reloaded.fixtures[2].address, 20);
    assert!(fs::read_to_string(&output)
        .unwrap()
        .contains("<Address>19</Address>"));
}

#[test]
fn every_placement_references_exactly_one_function() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 32);
    let output = dir.path().join("show.qxw");

    for style in Style::ALL {
        let workspace = ShowGenerator::new(GeneratorConfig::with_style(style))
            .generate_to_file(&analysis, &fixtures, Some("song.wav"), &output)
            .unwrap();
        for placement in &workspace.show.placements {
            let matches = workspace
                .functions
                .iter()
                .filter(|function| function.id == placement.function)
                .count();
            assert_eq!(matches, 1);
        }
        assert!(workspace
            .show
            .placements
            .windows(2)
            .all(|pair| pair[0].start_ms <= pair[1].start_ms));
        assert!(workspace.show.duration_ms() >= workspace.show.audio.duration_ms);
    }
}

#[test]
fn zero_beat_analysis_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 0);
    fs::write(&analysis, r#"{"tempo": 120.0, "beats": [], "segments": []}"#).unwrap();
    let output = dir.path().join("show.qxw");

    let err = ShowGenerator::default()
        .generate_to_file(&analysis, &fixtures, Some("song.wav"), &output)
        .unwrap_err();

    assert!(matches!(err, ShowGenError::EmptyCueSet));
    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn overlapping_fixtures_are_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 16);
    fs::write(&fixtures, FIXTURES.replace(r#""address": 4"#, r#""address": 3"#)).unwrap();
    let output = dir.path().join("show.qxw");

    let err = ShowGenerator::default()
        .generate_to_file(&analysis, &fixtures, Some("song.wav"), &output)
        .unwrap_err();

    assert!(matches!(err, ShowGenError::FixtureConflict(_)));
    assert!(!output.exists());
}

#[test]
fn invalid_analysis_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 16);
    fs::write(&analysis, r#"{"tempo": -1.0, "beats": [0.0, 0.5]}"#).unwrap();

    let err = ShowGenerator::default()
        .generate_to_file(&analysis, &fixtures, Some("song.wav"), dir.path().join("x.qxw"))
        .unwrap_err();
    assert!(matches!(err, ShowGenError::InvalidAnalysis(_)));
}

fn grid_with_segment_at(start: f64) -> AudioAnalysis {
    AudioAnalysis::from_payload(AnalysisPayload {
        tempo: 120.0,
        beats: vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0],
        segments: vec![
            SegmentPayload {
                start: 0.0,
                end: start,
                label: "intro".into(),
            },
            SegmentPayload {
                start,
                end: 3.0,
                label: "verse".into(),
            },
        ],
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn segment_on_the_grid_adds_no_cue() {
    let cues = CueScheduler::new(Style::Moderate).schedule(&grid_with_segment_at(1.0));
    let times: Vec<f64> = cues.iter().map(|cue| cue.time).collect();
    assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn segment_off_the_grid_forces_a_cue() {
    let cues = CueScheduler::new(Style::Moderate).schedule(&grid_with_segment_at(0.5));
    let times: Vec<f64> = cues.iter().map(|cue| cue.time).collect();
    assert_eq!(times, vec![0.0, 0.5, 1.0, 2.0, 3.0]);
}

#[test]
fn style_sets_cue_interval_over_sixteen_beats() {
    let analysis = AudioAnalysis::from_payload(AnalysisPayload {
        tempo: 120.0,
        beats: (0..16).map(|i| i as f64 * 0.5).collect(),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(CueScheduler::new(Style::Energetic).schedule(&analysis).len(), 16);
    assert_eq!(CueScheduler::new(Style::Calm).schedule(&analysis).len(), 4);
}

#[test]
fn chorus_offset_segment_starts_a_new_function() {
    let dir = tempfile::tempdir().unwrap();
    let (analysis, fixtures) = write_inputs(dir.path(), 32);
    let analysis = AudioAnalysis::load(&analysis).unwrap();
    let registry = FixtureRegistry::load(&fixtures, "off").unwrap();

    let workspace = ShowGenerator::new(GeneratorConfig::with_style(Style::Calm))
        .generate(&analysis, &registry, "song.wav")
        .unwrap();

    // chorus at 4.25s lands within tolerance of the scheduled 4.0s cue.
    let starts: Vec<u32> = workspace
        .show
        .placements
        .iter()
        .map(|placement| placement.start_ms)
        .collect();
    assert_eq!(starts, vec![0, 4000, 12000]);

    let chorus = workspace.function(workspace.show.placements[1].function).unwrap();
    assert!(chorus.name.starts_with("chorus"));
    assert!(matches!(chorus.kind, FunctionKind::Sequence { .. }));
}
