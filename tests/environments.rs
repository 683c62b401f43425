//! Environment presets decoded from real panorama files

mod common;

use std::time::{Duration, Instant};

use tempfile::TempDir;

use model_viewer::backend::{Background, HeadlessBackend};
use model_viewer::config::PresetConfig;
use model_viewer::controller::Viewer;
use model_viewer::environment::EnvironmentTicket;
use model_viewer::loader::{AssetSource, DecoderCaps, LoadOrigin};
use model_viewer::prefilter;
use model_viewer::worker::{self, WorkerHandle};

fn setup() -> (TempDir, Viewer<HeadlessBackend>) {
    let dir = TempDir::new().unwrap();
    let config = common::config_with_panoramas(dir.path());
    let viewer = Viewer::new(HeadlessBackend::new(), config, DecoderCaps::software());
    (dir, viewer)
}

#[test]
fn test_each_preset_decoded_at_most_once() {
    let (_dir, mut v) = setup();
    for name in ["studio", "sunset", "studio", "none", "neutral", "sunset", "studio", "neutral"] {
        v.set_environment_blocking(name);
        assert_eq!(v.environments().active(), name);
    }
    assert_eq!(v.environments().decodes_issued(), 3);
    assert_eq!(v.environments().cached_count(), 3);
    assert_eq!(v.backend().environments.len(), 3);
}

#[test]
fn test_none_clears_lighting() {
    let (_dir, mut v) = setup();
    let background = v.config().background_linear();

    v.set_environment_blocking("sunset");
    let handle = v.environments().entry("sunset").unwrap().handle;
    assert_eq!(v.backend().lighting, Some(handle));
    assert_eq!(v.backend().background, Background::Environment(handle));

    v.set_environment_blocking("none");
    assert_eq!(v.backend().lighting, None);
    assert_eq!(v.backend().background, Background::Color(background));
    // The cache survives
    assert!(v.environments().entry("sunset").is_some());

    // Toggling the background with `none` active keeps the flat color
    v.set_show_background(false);
    v.set_show_background(true);
    assert_eq!(v.backend().background, Background::Color(background));
}

#[test]
fn test_show_background_applies_immediately() {
    let (_dir, mut v) = setup();
    v.set_environment_blocking("studio");
    let handle = v.environments().entry("studio").unwrap().handle;

    v.set_show_background(false);
    assert!(matches!(v.backend().background, Background::Color(_)));
    assert_eq!(v.backend().lighting, Some(handle));

    // Preference persists across switches
    v.set_environment_blocking("neutral");
    assert!(matches!(v.backend().background, Background::Color(_)));

    v.set_show_background(true);
    let neutral = v.environments().entry("neutral").unwrap().handle;
    assert_eq!(v.backend().background, Background::Environment(neutral));
}

#[test]
fn test_reflection_map_levels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pano.hdr");
    common::write_hdr(&path, 64, 32, [0.25, 0.5, 1.0]);

    let settings = prefilter::PrefilterSettings { max_width: 32, levels: 4 };
    let map = prefilter::load_reflection_map(&path, &settings).unwrap();
    assert_eq!(map.levels.len(), 4);
    assert_eq!((map.width(), map.height()), (32, 16));
    assert_eq!((map.levels[3].width, map.levels[3].height), (4, 2));

    // A constant panorama stays constant at every roughness
    for level in &map.levels {
        let [r, g, b, _] = level.texel(level.width / 2, level.height / 2);
        assert!((r - 0.25).abs() < 0.02 && (g - 0.5).abs() < 0.02 && (b - 1.0).abs() < 0.02);
    }
}

#[test]
fn test_missing_panorama_keeps_previous() {
    let (dir, _) = setup();
    let mut config = common::config_with_panoramas(dir.path());
    config.presets.push(PresetConfig::new("broken", Some("/definitely/not/here.hdr")));
    let mut v = Viewer::new(HeadlessBackend::new(), config, DecoderCaps::software());

    v.set_environment_blocking("studio");
    let studio = v.environments().entry("studio").unwrap().handle;

    v.set_environment_blocking("broken");
    assert!(v.status().starts_with("HDR load error: "), "{}", v.status());
    assert_eq!(v.environments().active(), "studio");
    assert_eq!(v.environments().requested(), "studio");
    assert_eq!(v.backend().lighting, Some(studio));
}

#[test]
fn test_unknown_preset() {
    let (_dir, mut v) = setup();
    assert!(v.set_environment("moon").is_none());
    assert!(v.status().starts_with("Error: Unknown environment preset"));
    assert_eq!(v.environments().requested(), "none");
}

#[test]
fn test_rapid_switching_applies_last() {
    let (_dir, mut v) = setup();

    // Three requests before any decode finishes
    let studio = v.set_environment("studio").unwrap();
    let sunset = v.set_environment("sunset").unwrap();
    assert!(v.set_environment("studio").is_none(), "in-flight decode reused");
    assert!(v.environments().is_loading());

    let decode = |t: &EnvironmentTicket| t.decode(&v.config().prefilter);
    let (studio_map, sunset_map) = (decode(&studio), decode(&sunset));

    // Completion order sunset, studio
    v.finish_environment(&sunset, sunset_map);
    assert_eq!(v.environments().active(), "none");
    v.finish_environment(&studio, studio_map);

    assert_eq!(v.environments().active(), "studio");
    assert_eq!(v.environments().cached_count(), 2);
    assert_eq!(v.environments().decodes_issued(), 2);
    let handle = v.environments().entry("studio").unwrap().handle;
    assert_eq!(v.backend().lighting, Some(handle));
}

#[test]
fn test_environment_worker_roundtrip() {
    let (_dir, mut v) = setup();
    let worker = WorkerHandle::spawn("test-environments", *v.caps(), v.config().prefilter, None);

    for name in ["sunset", "neutral", "sunset"] {
        if let Some(ticket) = v.set_environment(name) {
            worker.decode_environment(ticket).unwrap();
        }
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while v.environments().cached_count() < 2 {
        assert!(Instant::now() < deadline, "environment decode never finished");
        match worker.recv() {
            Some(result) => worker::deliver(&mut v, result),
            None => panic!("worker hung up"),
        }
    }
    assert_eq!(v.environments().active(), "sunset");
    assert_eq!(v.environments().decodes_issued(), 2);
}

#[test]
fn test_intensity_reaches_loaded_materials() {
    let (dir, mut v) = setup();
    let path = common::write_gltf(dir.path(), "box.gltf", &common::box_document([-1.0; 3], [1.0; 3]));
    v.load_blocking(AssetSource::Path(path), LoadOrigin::Explicit);

    v.set_intensity(1.5);
    v.set_environment_blocking("studio");
    let intensities: Vec<_> = v.backend().materials.values().filter_map(|m| m.env_intensity()).collect();
    assert_eq!(intensities, vec![1.5]);
}
