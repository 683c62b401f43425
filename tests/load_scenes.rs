//! Loading glTF fixtures through the headless viewer

mod common;

use glam::Vec3;
use tempfile::TempDir;

use model_viewer::backend::HeadlessBackend;
use model_viewer::config::ViewerConfig;
use model_viewer::controller::Viewer;
use model_viewer::loader::{self, AssetSource, DecoderCaps, LoadOrigin};
use model_viewer::scene::{CompressedFormat, Material, TextureFormat};
use model_viewer::LoadError;

/// VK_FORMAT_R8G8B8A8_SRGB
const VK_RGBA8_SRGB: u32 = 43;
/// VK_FORMAT_BC1_RGBA_UNORM_BLOCK
const VK_BC1_RGBA_UNORM: u32 = 133;

fn viewer() -> Viewer<HeadlessBackend> {
    let config = ViewerConfig {
        camera_damping: 0.0,
        ..ViewerConfig::default()
    };
    Viewer::new(HeadlessBackend::new(), config, DecoderCaps::software())
}

#[test]
fn test_load_box_from_path() {
    let dir = TempDir::new().unwrap();
    let path = common::write_gltf(dir.path(), "box.gltf", &common::box_document([-1.0; 3], [1.0; 3]));

    let mut v = viewer();
    assert!(v.load_blocking(AssetSource::Path(path), LoadOrigin::Explicit));
    assert_eq!(v.status(), "Loaded box.gltf: 1 meshes, 8 vertices, 12 triangles");

    let stats = v.stats().unwrap();
    assert_eq!(stats.nodes, 1);
    assert_eq!(stats.materials, 1);
    assert_eq!(stats.textures, 0);

    let subtree = v.subtree().unwrap();
    assert!(matches!(subtree.materials[0].material, Material::Standard(_)));
    assert_eq!(subtree.materials[0].material.name(), "paint");
    assert!(subtree.has_gpu_resources());
    assert_eq!(v.backend().draw_list.len(), 1);
    assert!(v.progress().is_none());
}

#[test]
fn test_framing_wide_box() {
    let dir = TempDir::new().unwrap();
    let doc = common::box_document([-1.0, -0.5, -0.5], [1.0, 0.5, 0.5]);
    let path = common::write_gltf(dir.path(), "wide.gltf", &doc);

    let mut v = viewer();
    v.resize(1600.0, 900.0);
    v.load_blocking(AssetSource::Path(path), LoadOrigin::Explicit);

    // max extent 2, vertical FOV 50 degrees, 16:9
    let fit_h = 2.0 / (2.0 * 25f32.to_radians().tan());
    let fit_w = fit_h / (16.0 / 9.0);
    let expected = 1.3 * fit_h.max(fit_w);

    let camera = v.camera();
    assert!((camera.distance() - expected * 1.5).abs() < 1e-3, "distance {}", camera.distance());
    assert!(camera.target().length() < 1e-5);
    let offset = camera.position() - camera.target();
    assert!((offset - Vec3::new(expected, expected * 0.5, expected)).length() < 1e-3);
    assert!((camera.near - expected / 100.0).abs() < 1e-5);
    assert!((camera.far - expected * 100.0).abs() < 1e-2);
}

#[test]
fn test_loading_same_file_twice_is_stable() {
    let dir = TempDir::new().unwrap();
    let path = common::write_gltf(dir.path(), "box.gltf", &common::box_document([0.0; 3], [2.0; 3]));

    let mut v = viewer();
    v.load_blocking(AssetSource::Path(path.clone()), LoadOrigin::Explicit);
    let first = (v.camera().position(), v.backend().live_scene_resources());
    v.load_blocking(AssetSource::Path(path), LoadOrigin::Explicit);
    let second = (v.camera().position(), v.backend().live_scene_resources());

    assert!((first.0 - second.0).length() < 1e-5);
    assert_eq!(first.1, second.1);
    assert_eq!(v.backend().invalid_releases, 0);
}

#[test]
fn test_dropped_bytes() {
    let doc = common::box_document([-1.0; 3], [1.0; 3]);
    let source = AssetSource::Bytes {
        name: "dropped.gltf".into(),
        bytes: serde_json::to_vec(&doc).unwrap(),
    };
    let mut v = viewer();
    v.load_blocking(source, LoadOrigin::Explicit);
    assert!(v.status().starts_with("Loaded dropped.gltf"));
}

#[test]
fn test_missing_path_reports_error() {
    let mut v = viewer();
    v.load_blocking(AssetSource::parse("/definitely/not/here.glb"), LoadOrigin::Explicit);
    assert!(v.status().starts_with("Error: "), "{}", v.status());
    assert!(v.subtree().is_none());
    assert!(v.backend().draw_list.is_empty());
}

#[test]
fn test_unreachable_url_reports_error() {
    let mut v = viewer();
    // Nothing listens on port 1
    v.load_blocking(AssetSource::parse("http://127.0.0.1:1/model.glb"), LoadOrigin::Explicit);
    assert!(v.status().starts_with("Error: "), "{}", v.status());
    assert!(v.subtree().is_none());
}

#[test]
fn test_missing_default_model_hint() {
    let mut v = viewer();
    v.load_blocking(AssetSource::parse("/definitely/not/model.glb"), LoadOrigin::Default);
    assert!(v.status().starts_with("Place your model at"), "{}", v.status());
}

#[test]
fn test_garbage_is_an_error() {
    let source = AssetSource::Bytes {
        name: "junk.glb".into(),
        bytes: b"glTF but not really".to_vec(),
    };
    let mut v = viewer();
    v.load_blocking(source, LoadOrigin::Explicit);
    assert!(v.status().starts_with("Error: Invalid glTF"), "{}", v.status());
}

fn json_bytes(name: &str, doc: &serde_json::Value) -> AssetSource {
    AssetSource::Bytes {
        name: name.into(),
        bytes: serde_json::to_vec(doc).unwrap(),
    }
}

#[test]
fn test_dangling_mesh_index_is_an_error() {
    let doc = serde_json::json!({
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 3 }]
    });
    let source = json_bytes("dangling.gltf", &doc);

    let err = loader::load(&source, &DecoderCaps::software(), &mut |_, _| {}).unwrap_err();
    assert!(matches!(err, LoadError::Validation(ref e) if e.contains("nodes[0].mesh")), "{:?}", err);

    let mut v = viewer();
    v.load_blocking(source, LoadOrigin::Explicit);
    assert!(v.status().starts_with("Error: Invalid glTF"), "{}", v.status());
    assert!(v.subtree().is_none());
    assert!(!v.is_loading());
}

#[test]
fn test_dangling_material_index_is_an_error() {
    let mut doc = common::box_document([-1.0; 3], [1.0; 3]);
    doc["meshes"][0]["primitives"][0]["material"] = serde_json::json!(7);

    let err = loader::load(&json_bytes("paint.gltf", &doc), &DecoderCaps::software(), &mut |_, _| {}).unwrap_err();
    assert!(matches!(err, LoadError::Validation(_)), "{:?}", err);
}

#[test]
fn test_accessor_count_past_buffer_is_an_error() {
    let mut doc = common::box_document([-1.0; 3], [1.0; 3]);
    doc["accessors"][0]["count"] = serde_json::json!(4_000_000_000u64);
    let source = json_bytes("huge.gltf", &doc);

    let err = loader::load(&source, &DecoderCaps::software(), &mut |_, _| {}).unwrap_err();
    assert!(matches!(err, LoadError::MissingData(_)), "{:?}", err);

    let mut v = viewer();
    v.load_blocking(source, LoadOrigin::Explicit);
    assert!(v.status().starts_with("Error: "), "{}", v.status());
    assert!(v.backend().draw_list.is_empty());
}

#[test]
fn test_view_past_buffer_end_is_an_error() {
    let mut doc = common::box_document([-1.0; 3], [1.0; 3]);
    doc["bufferViews"][1]["byteOffset"] = serde_json::json!(u32::MAX);

    let err = loader::load(&json_bytes("offset.gltf", &doc), &DecoderCaps::software(), &mut |_, _| {}).unwrap_err();
    assert!(matches!(err, LoadError::MissingData(_)), "{:?}", err);
}

#[test]
fn test_meshopt_box() {
    let dir = TempDir::new().unwrap();
    let doc = common::meshopt_box_document([-1.0; 3], [1.0; 3]);
    let path = common::write_gltf(dir.path(), "packed.gltf", &doc);

    let asset = loader::load(&AssetSource::Path(path.clone()), &DecoderCaps::software(), &mut |_, _| {}).unwrap();
    assert_eq!(asset.stats.vertices, 8);
    assert_eq!(asset.stats.triangles, 12);
    let bounds = asset.subtree.world_bounds();
    assert!((bounds.size() - Vec3::splat(2.0)).length() < 1e-6);

    // Same file on a host without the decoder
    let caps = DecoderCaps {
        meshopt: false,
        ..DecoderCaps::software()
    };
    let err = loader::load(&AssetSource::Path(path), &caps, &mut |_, _| {}).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedExtension(ref e) if e == "EXT_meshopt_compression"));
}

#[test]
fn test_png_texture_gets_mips() {
    let doc = common::with_texture(
        common::box_document([-1.0; 3], [1.0; 3]),
        &[("image/png", common::png(8, 4, [255, 0, 0, 255]))],
        None,
    );
    let source = AssetSource::Bytes {
        name: "textured.gltf".into(),
        bytes: serde_json::to_vec(&doc).unwrap(),
    };
    let asset = loader::load(&source, &DecoderCaps::software(), &mut |_, _| {}).unwrap();
    let texture = &asset.subtree.textures[0].data;
    assert_eq!((texture.width, texture.height), (8, 4));
    assert_eq!(texture.format, TextureFormat::Rgba8 { srgb: true });
    // 8x4, 4x2, 2x1, 1x1
    assert_eq!(texture.levels.len(), 4);
}

#[test]
fn test_ktx2_uploaded_directly() {
    let level = vec![200u8; 4 * 4 * 4];
    let doc = common::with_texture(
        common::box_document([-1.0; 3], [1.0; 3]),
        &[("image/ktx2", common::ktx2(VK_RGBA8_SRGB, 4, 4, &level))],
        None,
    );
    let source = AssetSource::Bytes {
        name: "ktx.gltf".into(),
        bytes: serde_json::to_vec(&doc).unwrap(),
    };
    let asset = loader::load(&source, &DecoderCaps::software(), &mut |_, _| {}).unwrap();
    let texture = &asset.subtree.textures[0].data;
    assert_eq!(texture.format, TextureFormat::Rgba8 { srgb: true });
    assert_eq!(texture.levels, vec![level]);
}

#[test]
fn test_ktx2_block_format_negotiation() {
    let blocks = vec![0u8; 8 * 4];
    let doc = common::with_texture(
        common::box_document([-1.0; 3], [1.0; 3]),
        &[
            ("image/png", common::png(8, 8, [0, 255, 0, 255])),
            ("image/ktx2", common::ktx2(VK_BC1_RGBA_UNORM, 8, 8, &blocks)),
        ],
        Some(1),
    );
    let bytes = serde_json::to_vec(&doc).unwrap();
    let source = AssetSource::Bytes {
        name: "bc.gltf".into(),
        bytes,
    };

    let bc = DecoderCaps {
        bc: true,
        ..DecoderCaps::software()
    };
    let asset = loader::load(&source, &bc, &mut |_, _| {}).unwrap();
    assert_eq!(
        asset.subtree.textures[0].data.format,
        TextureFormat::Compressed(CompressedFormat::Bc1RgbaUnorm)
    );

    // No BC on this device: the PNG source is used instead
    let asset = loader::load(&source, &DecoderCaps::software(), &mut |_, _| {}).unwrap();
    let texture = &asset.subtree.textures[0].data;
    assert!(matches!(texture.format, TextureFormat::Rgba8 { .. }));
    assert_eq!(texture.width, 8);
}

#[test]
fn test_required_basisu_is_rejected() {
    let mut doc = common::with_texture(
        common::box_document([-1.0; 3], [1.0; 3]),
        &[("image/ktx2", common::ktx2(0, 4, 4, &[0; 16]))],
        Some(0),
    );
    doc["extensionsRequired"] = serde_json::json!(["KHR_texture_basisu"]);
    let source = AssetSource::Bytes {
        name: "basis.gltf".into(),
        bytes: serde_json::to_vec(&doc).unwrap(),
    };
    let mut v = viewer();
    v.load_blocking(source, LoadOrigin::Explicit);
    assert_eq!(v.status(), "Error: Unsupported extension: KHR_texture_basisu");
}
