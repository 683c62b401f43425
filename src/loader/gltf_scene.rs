//! Conversion of a parsed glTF document into a [`Subtree`].

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use gltf::mesh::Mode;
use gltf::{Document, Gltf, Semantic};
use rayon::prelude::*;

use super::accessor::{read_indices, read_vec, MAX_DECODED_BYTES};
use super::meshopt::{self, CompressedView};
use super::resolve::{decode_data_uri, Base};
use super::{ktx2, DecoderCaps};
use crate::error::LoadError;
use crate::scene::{
    AlphaMode, Geometry, Material, MaterialSlot, Mesh, Node, Primitive, StandardMaterial, Subtree, Texture,
    TextureData, TextureFormat, TextureSlot, UnlitMaterial,
};

const BASISU: &str = "KHR_texture_basisu";

pub(crate) fn convert(bytes: &[u8], base: &Base, caps: &DecoderCaps) -> Result<Subtree, LoadError> {
    let Gltf { document, blob } = Gltf::from_slice_without_validation(bytes)?;
    check_document(document.as_json())?;

    for ext in document.extensions_required() {
        if !caps.supports_extension(ext) {
            return Err(LoadError::UnsupportedExtension(ext.to_string()));
        }
    }

    let mut buffers = load_buffers(&document, blob, base)?;
    if caps.meshopt {
        decompress_views(&document, &mut buffers)?;
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoadError::NoScene)?;

    let nodes: Vec<Node> = document
        .nodes()
        .map(|n| Node {
            name: n.name().unwrap_or_default().to_string(),
            transform: Mat4::from_cols_array_2d(&n.transform().matrix()),
            mesh: n.mesh().map(|m| m.index()),
            children: n.children().map(|c| c.index()).collect(),
        })
        .collect();
    let roots = scene.nodes().map(|n| n.index()).collect();

    let mut table = TextureTable::default();
    let mut materials: Vec<MaterialSlot> = document
        .materials()
        .map(|m| MaterialSlot::new(convert_material(&m, &mut table)))
        .collect();

    let mut default_material = None;
    let mut meshes = Vec::with_capacity(document.meshes().len());
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for prim in mesh.primitives() {
            let Some(geometry) = convert_primitive(&prim, &buffers)? else {
                continue;
            };
            let material = match prim.material().index() {
                Some(i) => i,
                None => *default_material.get_or_insert_with(|| {
                    materials.push(MaterialSlot::new(Material::default()));
                    materials.len() - 1
                }),
            };
            primitives.push(Primitive::new(geometry, material));
        }
        meshes.push(Mesh {
            name: mesh.name().unwrap_or_default().to_string(),
            primitives,
        });
    }

    let textures = decode_textures(&document, &table, &buffers, base, caps)?;

    Ok(Subtree {
        name: String::new(),
        nodes,
        roots,
        meshes,
        materials,
        textures,
    })
}

/// Reject dangling indices and unknown enum values before any object is
/// dereferenced. Required extensions are matched against the decoder caps
/// afterwards, so their `Unsupported` reports are skipped here.
fn check_document(root: &gltf::json::Root) -> Result<(), LoadError> {
    use gltf::json::validation::{Error, Validate};

    let mut fatal = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        match error {
            Error::IndexOutOfBounds | Error::Invalid => fatal.push(format!("{} ({})", path.as_str(), error)),
            Error::Unsupported if path.as_str().starts_with("extensionsRequired") => {}
            other => tracing::warn!("glTF {}: {}", path.as_str(), other),
        }
    });

    match fatal.len() {
        0 => Ok(()),
        1 => Err(LoadError::Validation(fatal.remove(0))),
        n => Err(LoadError::Validation(format!("{} and {} more", fatal[0], n - 1))),
    }
}

/// `offset..offset + len` of `bytes`, or `None` if it overflows or runs past the end
fn checked_slice(bytes: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    offset.checked_add(len).and_then(|end| bytes.get(offset..end))
}

fn load_buffers(document: &Document, mut blob: Option<Vec<u8>>, base: &Base) -> Result<Vec<Vec<u8>>, LoadError> {
    let mut buffers = Vec::with_capacity(document.buffers().len());
    for buffer in document.buffers() {
        let fallback = meshopt::is_fallback_buffer(buffer.extensions());
        let mut data = match buffer.source() {
            gltf::buffer::Source::Uri(uri) => base.resolve(uri)?,
            gltf::buffer::Source::Bin if buffer.index() == 0 && blob.is_some() => blob.take().unwrap_or_default(),
            gltf::buffer::Source::Bin if fallback => Vec::new(),
            gltf::buffer::Source::Bin => {
                return Err(LoadError::MissingData(format!("buffer {} has no data", buffer.index())));
            }
        };
        if data.len() < buffer.length() {
            if !fallback {
                return Err(LoadError::MissingData(format!(
                    "buffer {} holds {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                )));
            }
            // Filled in by decompression
            if buffer.length() > MAX_DECODED_BYTES {
                return Err(LoadError::MeshCodec(format!(
                    "fallback buffer {} of {} bytes exceeds the decode limit",
                    buffer.index(),
                    buffer.length()
                )));
            }
            data.try_reserve_exact(buffer.length() - data.len())
                .map_err(|_| LoadError::MeshCodec(format!("cannot allocate buffer {}", buffer.index())))?;
            data.resize(buffer.length(), 0);
        }
        buffers.push(data);
    }
    Ok(buffers)
}

/// Decode every meshopt-compressed view into its (fallback) buffer
fn decompress_views(document: &Document, buffers: &mut [Vec<u8>]) -> Result<(), LoadError> {
    let mut decoded_views = 0usize;
    for view in document.views() {
        let Some(compressed) = CompressedView::from_extensions(view.extensions())? else {
            continue;
        };
        let source = buffers
            .get(compressed.buffer)
            .and_then(|b| checked_slice(b, compressed.byte_offset, compressed.byte_length))
            .ok_or_else(|| LoadError::MeshCodec(format!("view {} source out of range", view.index())))?;
        // The decoder allocates `count * byteStride` up front
        if compressed.decoded_len().is_none_or(|len| len > view.length()) {
            return Err(LoadError::MeshCodec(format!(
                "view {} decodes past its {} bytes",
                view.index(),
                view.length()
            )));
        }
        let decoded = meshopt::decode(&compressed, source)?;

        let target = buffers
            .get_mut(view.buffer().index())
            .and_then(|b| {
                let end = view.offset().checked_add(view.length())?;
                b.get_mut(view.offset()..end)
            })
            .ok_or_else(|| LoadError::MeshCodec(format!("view {} target out of range", view.index())))?;
        let n = decoded.len().min(target.len());
        target[..n].copy_from_slice(&decoded[..n]);
        decoded_views += 1;
    }
    if decoded_views > 0 {
        tracing::debug!("decompressed {} buffer views", decoded_views);
    }
    Ok(())
}

fn convert_primitive(prim: &gltf::Primitive, buffers: &[Vec<u8>]) -> Result<Option<Geometry>, LoadError> {
    let Some(position_accessor) = prim.get(&Semantic::Positions) else {
        tracing::warn!("primitive {} has no positions, skipped", prim.index());
        return Ok(None);
    };
    let positions = read_vec::<3>(&position_accessor, buffers)?;
    let n = positions.len();

    let normals = match prim.get(&Semantic::Normals) {
        Some(a) => Some(read_vec::<3>(&a, buffers)?).filter(|v| v.len() == n),
        None => None,
    };
    let uvs = match prim.get(&Semantic::TexCoords(0)) {
        Some(a) => Some(read_vec::<2>(&a, buffers)?).filter(|v| v.len() == n),
        None => None,
    }
    .unwrap_or_else(|| vec![[0.0; 2]; n]);

    let raw = match prim.indices() {
        Some(a) => read_indices(&a, buffers)?,
        None => (0..n as u32).collect(),
    };
    if let Some(bad) = raw.iter().find(|&&i| i as usize >= n) {
        return Err(LoadError::MissingData(format!("vertex index {} out of range ({} vertices)", bad, n)));
    }

    let indices = match prim.mode() {
        Mode::Triangles => {
            let mut list = raw;
            list.truncate(list.len() / 3 * 3);
            list
        }
        Mode::TriangleStrip => strip_to_list(&raw),
        Mode::TriangleFan => fan_to_list(&raw),
        other => {
            tracing::debug!("skipping {:?} primitive", other);
            return Ok(None);
        }
    };

    let has_normals = normals.is_some();
    let geometry = Geometry {
        positions,
        normals: normals.unwrap_or_default(),
        uvs,
        indices,
    };
    Ok(Some(if has_normals { geometry } else { flat_shaded(&geometry) }))
}

fn strip_to_list(strip: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(strip.len().saturating_sub(2) * 3);
    for i in 0..strip.len().saturating_sub(2) {
        let (a, b, c) = (strip[i], strip[i + 1], strip[i + 2]);
        if i % 2 == 0 {
            out.extend_from_slice(&[a, b, c]);
        } else {
            out.extend_from_slice(&[b, a, c]);
        }
    }
    out
}

fn fan_to_list(fan: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(fan.len().saturating_sub(2) * 3);
    for i in 1..fan.len().saturating_sub(1) {
        out.extend_from_slice(&[fan[0], fan[i], fan[i + 1]]);
    }
    out
}

/// Unweld triangles and give each its face normal
fn flat_shaded(g: &Geometry) -> Geometry {
    let mut out = Geometry::default();
    for tri in g.indices.chunks_exact(3) {
        let p: [Vec3; 3] = [0, 1, 2].map(|k| Vec3::from_array(g.positions[tri[k] as usize]));
        let normal = (p[1] - p[0]).cross(p[2] - p[0]).try_normalize().unwrap_or(Vec3::Y);
        for &i in tri {
            out.indices.push(out.positions.len() as u32);
            out.positions.push(g.positions[i as usize]);
            out.normals.push(normal.to_array());
            out.uvs.push(g.uvs[i as usize]);
        }
    }
    out
}

/// Maps (glTF texture, color space) to a subtree texture slot
#[derive(Default)]
struct TextureTable {
    slots: HashMap<(usize, bool), usize>,
    requests: Vec<(usize, bool)>,
}

impl TextureTable {
    fn slot(&mut self, texture: usize, tex_coord: u32, srgb: bool) -> TextureSlot {
        if tex_coord != 0 {
            tracing::debug!("texture {} uses TEXCOORD_{}, sampled with set 0", texture, tex_coord);
        }
        let next = self.requests.len();
        let index = *self.slots.entry((texture, srgb)).or_insert(next);
        if index == next {
            self.requests.push((texture, srgb));
        }
        TextureSlot { texture: index, tex_coord }
    }

    fn info(&mut self, info: Option<gltf::texture::Info>, srgb: bool) -> Option<TextureSlot> {
        info.map(|i| self.slot(i.texture().index(), i.tex_coord(), srgb))
    }
}

fn convert_alpha(m: &gltf::Material) -> AlphaMode {
    match m.alpha_mode() {
        gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        gltf::material::AlphaMode::Mask => AlphaMode::Mask(m.alpha_cutoff().unwrap_or(0.5)),
        gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    }
}

fn convert_material(m: &gltf::Material, table: &mut TextureTable) -> Material {
    let pbr = m.pbr_metallic_roughness();
    let name = m.name().unwrap_or_default().to_string();

    if m.unlit() {
        return Material::Unlit(UnlitMaterial {
            name,
            base_color_factor: pbr.base_color_factor(),
            base_color_texture: table.info(pbr.base_color_texture(), true),
            alpha_mode: convert_alpha(m),
            double_sided: m.double_sided(),
        });
    }

    let normal = m.normal_texture();
    let occlusion = m.occlusion_texture();
    Material::Standard(StandardMaterial {
        name,
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: table.info(pbr.base_color_texture(), true),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        metallic_roughness_texture: table.info(pbr.metallic_roughness_texture(), false),
        normal_scale: normal.as_ref().map_or(1.0, |t| t.scale()),
        normal_texture: normal.map(|t| table.slot(t.texture().index(), t.tex_coord(), false)),
        occlusion_strength: occlusion.as_ref().map_or(1.0, |t| t.strength()),
        occlusion_texture: occlusion.map(|t| table.slot(t.texture().index(), t.tex_coord(), false)),
        emissive_factor: m.emissive_factor(),
        emissive_texture: table.info(m.emissive_texture(), true),
        alpha_mode: convert_alpha(m),
        double_sided: m.double_sided(),
        env_intensity: 1.0,
    })
}

/// Encoded image bytes plus declared MIME type
struct EncodedImage {
    bytes: Vec<u8>,
    mime: Option<String>,
}

impl EncodedImage {
    fn is_ktx2(&self) -> bool {
        self.mime.as_deref() == Some(ktx2::MIME_TYPE) || ktx2::is_ktx2(&self.bytes)
    }
}

struct TextureJob {
    name: String,
    srgb: bool,
    /// Tried in order until one decodes to something usable
    candidates: Vec<EncodedImage>,
}

fn encoded_image(image: &gltf::Image, buffers: &[Vec<u8>], base: &Base) -> Result<EncodedImage, LoadError> {
    match image.source() {
        gltf::image::Source::View { view, mime_type } => {
            let bytes = buffers
                .get(view.buffer().index())
                .and_then(|b| checked_slice(b, view.offset(), view.length()))
                .ok_or_else(|| LoadError::MissingData(format!("image {} view out of range", image.index())))?;
            Ok(EncodedImage {
                bytes: bytes.to_vec(),
                mime: Some(mime_type.to_string()),
            })
        }
        gltf::image::Source::Uri { uri, mime_type } if uri.starts_with("data:") => {
            let (mime, bytes) = decode_data_uri(uri)?;
            Ok(EncodedImage {
                bytes,
                mime: mime_type.map(str::to_string).or(mime),
            })
        }
        gltf::image::Source::Uri { uri, mime_type } => Ok(EncodedImage {
            bytes: base.resolve(uri)?,
            mime: mime_type.map(str::to_string),
        }),
    }
}

/// Image referenced by `KHR_texture_basisu`, if any
fn basisu_source(texture: &gltf::Texture) -> Option<usize> {
    texture
        .extensions()
        .and_then(|e| e.get(BASISU))
        .and_then(|v| v.get("source"))
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
}

fn decode_textures(
    document: &Document,
    table: &TextureTable,
    buffers: &[Vec<u8>],
    base: &Base,
    caps: &DecoderCaps,
) -> Result<Vec<Texture>, LoadError> {
    let textures: Vec<gltf::Texture> = document.textures().collect();
    let images: Vec<gltf::Image> = document.images().collect();

    // Gather encoded bytes first (may hit disk or network), decode in parallel
    let mut jobs = Vec::with_capacity(table.requests.len());
    for &(index, srgb) in &table.requests {
        let texture = textures
            .get(index)
            .ok_or_else(|| LoadError::MissingData(format!("texture {}", index)))?;
        let mut sources = Vec::with_capacity(2);
        if let Some(i) = basisu_source(texture) {
            sources.push(i);
        }
        let fallback = texture.source().index();
        if !sources.contains(&fallback) {
            sources.push(fallback);
        }
        let candidates = sources
            .into_iter()
            .map(|i| {
                let image = images
                    .get(i)
                    .ok_or_else(|| LoadError::MissingData(format!("image {}", i)))?;
                encoded_image(image, buffers, base)
            })
            .collect::<Result<Vec<_>, _>>()?;
        jobs.push(TextureJob {
            name: texture.name().unwrap_or_default().to_string(),
            srgb,
            candidates,
        });
    }

    jobs.par_iter()
        .map(|job| -> Result<Texture, LoadError> {
            Ok(Texture {
                name: job.name.clone(),
                data: decode_texture(job, caps)?,
                gpu: None,
            })
        })
        .collect()
}

fn decode_texture(job: &TextureJob, caps: &DecoderCaps) -> Result<TextureData, LoadError> {
    for image in &job.candidates {
        if image.is_ktx2() {
            if let Some(data) = ktx2::decode(&image.bytes, caps)? {
                return Ok(data);
            }
            continue;
        }
        return decode_rgba(&image.bytes, job.srgb);
    }
    Err(LoadError::TextureCodec(format!(
        "texture '{}' has no source usable on this device",
        job.name
    )))
}

/// Decode PNG/JPEG to RGBA8 and build the full mip chain
fn decode_rgba(bytes: &[u8], srgb: bool) -> Result<TextureData, LoadError> {
    let base = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = base.dimensions();
    if width == 0 || height == 0 {
        return Err(LoadError::TextureCodec("zero-sized image".into()));
    }

    let mut levels = Vec::new();
    let (mut w, mut h) = (width, height);
    let mut current = base;
    loop {
        levels.push(current.as_raw().clone());
        if w == 1 && h == 1 {
            break;
        }
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        current = image::imageops::resize(&current, w, h, image::imageops::FilterType::Triangle);
    }

    Ok(TextureData {
        width,
        height,
        format: TextureFormat::Rgba8 { srgb },
        levels,
    })
}
