//! Fixture builders shared by the integration tests.
//!
//! Models are written as self-contained `.gltf` JSON with `data:` URIs so the
//! tests need no binary assets checked in.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::codecs::hdr::HdrEncoder;
use image::{ImageFormat, Rgb, Rgba, RgbaImage};
use serde_json::{json, Value};

use model_viewer::config::{PresetConfig, ViewerConfig, NO_ENVIRONMENT};

/// Corner order of the box; indices below wind outward
const BOX_INDICES: [u16; 36] = [
    0, 2, 1, 0, 3, 2, // -z
    4, 5, 6, 4, 6, 7, // +z
    0, 1, 5, 0, 5, 4, // -y
    3, 7, 6, 3, 6, 2, // +y
    0, 4, 7, 0, 7, 3, // -x
    1, 2, 6, 1, 6, 5, // +x
];

pub fn box_positions(min: [f32; 3], max: [f32; 3]) -> Vec<[f32; 3]> {
    vec![
        [min[0], min[1], min[2]],
        [max[0], min[1], min[2]],
        [max[0], max[1], min[2]],
        [min[0], max[1], min[2]],
        [min[0], min[1], max[2]],
        [max[0], min[1], max[2]],
        [max[0], max[1], max[2]],
        [min[0], max[1], max[2]],
    ]
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Axis-aligned box with one standard material, as glTF JSON
pub fn box_document(min: [f32; 3], max: [f32; 3]) -> Value {
    let positions = box_positions(min, max);
    let mut buffer: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
    let index_offset = buffer.len();
    buffer.extend_from_slice(bytemuck::cast_slice(&BOX_INDICES[..]));

    json!({
        "asset": { "version": "2.0", "generator": "fixture" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "box", "mesh": 0 }],
        "meshes": [{
            "name": "box",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }],
        "materials": [{
            "name": "paint",
            "pbrMetallicRoughness": { "baseColorFactor": [0.8, 0.2, 0.2, 1.0], "metallicFactor": 0.0 }
        }],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3", "min": min, "max": max },
            { "bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR" }
        ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": index_offset, "target": 34962 },
            { "buffer": 0, "byteOffset": index_offset, "byteLength": BOX_INDICES.len() * 2, "target": 34963 }
        ],
        "buffers": [{ "byteLength": buffer.len(), "uri": data_uri("application/octet-stream", &buffer) }]
    })
}

/// The same box with both views meshopt-compressed into buffer 0 and a
/// fallback buffer 1 that holds no data
pub fn meshopt_box_document(min: [f32; 3], max: [f32; 3]) -> Value {
    let positions = box_positions(min, max);
    let indices: Vec<u32> = BOX_INDICES.iter().map(|&i| i as u32).collect();
    let vertices = meshopt::encoding::encode_vertex_buffer(&positions).expect("encode vertices");
    let encoded_indices = meshopt::encoding::encode_index_buffer(&indices, positions.len()).expect("encode indices");

    let mut compressed = vertices.clone();
    while compressed.len() % 4 != 0 {
        compressed.push(0);
    }
    let index_src = compressed.len();
    compressed.extend_from_slice(&encoded_indices);

    let vertex_bytes = positions.len() * 12;
    let index_bytes = indices.len() * 4;

    json!({
        "asset": { "version": "2.0" },
        "extensionsUsed": ["EXT_meshopt_compression"],
        "extensionsRequired": ["EXT_meshopt_compression"],
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3", "min": min, "max": max },
            { "bufferView": 1, "componentType": 5125, "count": indices.len(), "type": "SCALAR" }
        ],
        "bufferViews": [
            {
                "buffer": 1, "byteOffset": 0, "byteLength": vertex_bytes, "byteStride": 12,
                "extensions": { "EXT_meshopt_compression": {
                    "buffer": 0, "byteOffset": 0, "byteLength": vertices.len(),
                    "byteStride": 12, "count": positions.len(), "mode": "ATTRIBUTES"
                }}
            },
            {
                "buffer": 1, "byteOffset": vertex_bytes, "byteLength": index_bytes,
                "extensions": { "EXT_meshopt_compression": {
                    "buffer": 0, "byteOffset": index_src, "byteLength": encoded_indices.len(),
                    "byteStride": 4, "count": indices.len(), "mode": "TRIANGLES"
                }}
            }
        ],
        "buffers": [
            { "byteLength": compressed.len(), "uri": data_uri("application/octet-stream", &compressed) },
            { "byteLength": vertex_bytes + index_bytes, "extensions": { "EXT_meshopt_compression": { "fallback": true } } }
        ]
    })
}

/// Add UVs and a base color texture to a [`box_document`].
///
/// `images` are (mime, bytes) pairs; image 0 is the texture's regular
/// source, and `basisu_source` routes `KHR_texture_basisu` to another one.
pub fn with_texture(mut doc: Value, images: &[(&str, Vec<u8>)], basisu_source: Option<usize>) -> Value {
    let uvs: Vec<[f32; 2]> = (0..8).map(|i| [(i & 1) as f32, ((i >> 1) & 1) as f32]).collect();
    let uv_bytes: Vec<u8> = bytemuck::cast_slice(&uvs).to_vec();
    let buffer_index = doc["buffers"].as_array().map_or(0, Vec::len);
    let view_index = doc["bufferViews"].as_array().map_or(0, Vec::len);
    let accessor_index = doc["accessors"].as_array().map_or(0, Vec::len);

    push(&mut doc, "buffers", json!({ "byteLength": uv_bytes.len(), "uri": data_uri("application/octet-stream", &uv_bytes) }));
    push(&mut doc, "bufferViews", json!({ "buffer": buffer_index, "byteLength": uv_bytes.len() }));
    push(&mut doc, "accessors", json!({ "bufferView": view_index, "componentType": 5126, "count": 8, "type": "VEC2" }));
    doc["meshes"][0]["primitives"][0]["attributes"]["TEXCOORD_0"] = json!(accessor_index);

    for (mime, bytes) in images {
        push(&mut doc, "images", json!({ "uri": data_uri(mime, bytes), "mimeType": mime }));
    }
    let mut texture = json!({ "name": "albedo", "source": 0 });
    if let Some(source) = basisu_source {
        texture["extensions"] = json!({ "KHR_texture_basisu": { "source": source } });
        push(&mut doc, "extensionsUsed", json!("KHR_texture_basisu"));
    }
    push(&mut doc, "textures", texture);
    doc["materials"][0]["pbrMetallicRoughness"]["baseColorTexture"] = json!({ "index": 0 });
    doc
}

fn push(doc: &mut Value, key: &str, value: Value) {
    match doc.get_mut(key).and_then(Value::as_array_mut) {
        Some(array) => array.push(value),
        None => doc[key] = json!([value]),
    }
}

pub fn write_gltf(dir: &Path, name: &str, doc: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(doc).expect("serialize fixture")).expect("write fixture");
    path
}

pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

/// Single-level, uncompressed KTX2 container
pub fn ktx2(vk_format: u32, width: u32, height: u32, level: &[u8]) -> Vec<u8> {
    const HEADER: usize = 80;
    const LEVEL_INDEX: usize = 24;
    let dfd_offset = HEADER + LEVEL_INDEX;
    let dfd_len = 4;
    let data_offset = (dfd_offset + dfd_len).next_multiple_of(16);

    let mut out = Vec::with_capacity(data_offset + level.len());
    out.extend_from_slice(&model_viewer::loader::ktx2::MAGIC);
    for v in [vk_format, 1, width, height, 0, 0, 1, 1, 0] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    // DFD, KVD and SGD locations
    for v in [dfd_offset as u32, dfd_len as u32, 0, 0] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    for v in [data_offset as u64, level.len() as u64, level.len() as u64] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&(dfd_len as u32).to_le_bytes());
    out.resize(data_offset, 0);
    out.extend_from_slice(level);
    out
}

/// Equirectangular Radiance panorama filled with `color`
pub fn write_hdr(path: &Path, width: u32, height: u32, color: [f32; 3]) {
    let pixels = vec![Rgb(color); (width * height) as usize];
    let file = std::fs::File::create(path).expect("create hdr");
    HdrEncoder::new(std::io::BufWriter::new(file))
        .encode(&pixels, width as usize, height as usize)
        .expect("encode hdr");
}

/// Config whose presets point at small panoramas in `dir`
pub fn config_with_panoramas(dir: &Path) -> ViewerConfig {
    let mut presets = vec![PresetConfig::new(NO_ENVIRONMENT, None)];
    for (name, color) in [("studio", [1.0, 1.0, 1.0]), ("sunset", [2.0, 0.8, 0.3]), ("neutral", [0.5, 0.5, 0.5])] {
        let path = dir.join(format!("{}.hdr", name));
        write_hdr(&path, 32, 16, color);
        presets.push(PresetConfig {
            name: name.to_string(),
            path: Some(path),
        });
    }
    let mut config = ViewerConfig {
        presets,
        initial_environment: NO_ENVIRONMENT.into(),
        camera_damping: 0.0,
        default_model: dir.join("model.glb"),
        ..ViewerConfig::default()
    };
    config.prefilter.max_width = 16;
    config.prefilter.levels = 3;
    config
}
