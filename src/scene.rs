//! Scene subtree produced by the loader and owned by the viewer.
//!
//! A [`Subtree`] is CPU data plus the backend handles created for it. Handles
//! are `Option`s so that releasing them is a `take()` and can happen once.

use glam::{Mat4, Vec3};

use crate::backend::{GeometryHandle, MaterialHandle, TextureHandle};

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut bounds = Self::empty();
        for p in points {
            bounds.expand(Vec3::from_array(*p));
        }
        bounds
    }

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&mut self, other: &Bounds) {
        if other.is_valid() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn radius(&self) -> f32 {
        self.size().length() * 0.5
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Bounds of the eight corners after transformation
    pub fn transformed(&self, m: &Mat4) -> Bounds {
        if !self.is_valid() {
            return *self;
        }
        let mut out = Bounds::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand(m.transform_point3(corner));
        }
        out
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

/// Triangle-list geometry with one attribute per vertex
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::from_points(&self.positions)
    }
}

/// One draw call worth of geometry plus its material slot
#[derive(Debug)]
pub struct Primitive {
    pub geometry: Geometry,
    /// Local-space bounds of `geometry`
    pub bounds: Bounds,
    /// Index into [`Subtree::materials`]
    pub material: usize,
    pub gpu: Option<GeometryHandle>,
}

impl Primitive {
    pub fn new(geometry: Geometry, material: usize) -> Self {
        let bounds = geometry.bounds();
        Self {
            geometry,
            bounds,
            material,
            gpu: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    /// Index into [`Subtree::meshes`]
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

/// GPU block-compressed formats a KTX2 payload may carry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompressedFormat {
    Bc1RgbaUnorm,
    Bc1RgbaSrgb,
    Bc3RgbaUnorm,
    Bc3RgbaSrgb,
    Bc4RUnorm,
    Bc5RgUnorm,
    Bc7RgbaUnorm,
    Bc7RgbaSrgb,
    Etc2Rgb8Unorm,
    Etc2Rgb8Srgb,
    Etc2Rgba8Unorm,
    Etc2Rgba8Srgb,
    Astc4x4Unorm,
    Astc4x4Srgb,
}

/// Hardware feature a compressed format depends on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionFamily {
    Bc,
    Etc2,
    Astc,
}

impl CompressedFormat {
    pub fn family(self) -> CompressionFamily {
        use CompressedFormat::*;
        match self {
            Bc1RgbaUnorm | Bc1RgbaSrgb | Bc3RgbaUnorm | Bc3RgbaSrgb | Bc4RUnorm | Bc5RgUnorm
            | Bc7RgbaUnorm | Bc7RgbaSrgb => CompressionFamily::Bc,
            Etc2Rgb8Unorm | Etc2Rgb8Srgb | Etc2Rgba8Unorm | Etc2Rgba8Srgb => CompressionFamily::Etc2,
            Astc4x4Unorm | Astc4x4Srgb => CompressionFamily::Astc,
        }
    }

    /// Bytes per 4x4 block
    pub fn block_bytes(self) -> usize {
        use CompressedFormat::*;
        match self {
            Bc1RgbaUnorm | Bc1RgbaSrgb | Bc4RUnorm | Etc2Rgb8Unorm | Etc2Rgb8Srgb => 8,
            _ => 16,
        }
    }

    pub fn is_srgb(self) -> bool {
        use CompressedFormat::*;
        matches!(
            self,
            Bc1RgbaSrgb | Bc3RgbaSrgb | Bc7RgbaSrgb | Etc2Rgb8Srgb | Etc2Rgba8Srgb | Astc4x4Srgb
        )
    }
}

/// Pixel layout of decoded texture levels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    /// 8-bit RGBA, color data when `srgb`
    Rgba8 { srgb: bool },
    /// Block-compressed, uploaded as-is
    Compressed(CompressedFormat),
}

/// Decoded texture with its full mip chain
#[derive(Clone, Debug)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    /// Level 0 first; each level is tightly packed
    pub levels: Vec<Vec<u8>>,
}

impl TextureData {
    pub fn byte_size(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

#[derive(Debug)]
pub struct Texture {
    pub name: String,
    pub data: TextureData,
    pub gpu: Option<TextureHandle>,
}

/// Material reference to a texture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSlot {
    /// Index into [`Subtree::textures`]
    pub texture: usize,
    /// TEXCOORD set; only set 0 is uploaded
    pub tex_coord: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AlphaMode {
    Opaque,
    Mask(f32),
    Blend,
}

/// glTF metallic-roughness material
#[derive(Clone, Debug)]
pub struct StandardMaterial {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureSlot>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureSlot>,
    pub normal_texture: Option<TextureSlot>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureSlot>,
    pub occlusion_strength: f32,
    pub emissive_factor: [f32; 3],
    pub emissive_texture: Option<TextureSlot>,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
    /// Scale on image-based lighting
    pub env_intensity: f32,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_factor: [0.0; 3],
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            double_sided: false,
            env_intensity: 1.0,
        }
    }
}

/// `KHR_materials_unlit` material
#[derive(Clone, Debug)]
pub struct UnlitMaterial {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureSlot>,
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}

/// The closed set of materials the renderer understands
#[derive(Clone, Debug)]
pub enum Material {
    Standard(StandardMaterial),
    Unlit(UnlitMaterial),
}

/// Texture slots of a material, in the order the renderer binds them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterialTextureSlots {
    pub base_color: Option<TextureSlot>,
    pub metallic_roughness: Option<TextureSlot>,
    pub normal: Option<TextureSlot>,
    pub occlusion: Option<TextureSlot>,
    pub emissive: Option<TextureSlot>,
}

impl MaterialTextureSlots {
    pub fn iter(&self) -> impl Iterator<Item = TextureSlot> + '_ {
        [self.base_color, self.metallic_roughness, self.normal, self.occlusion, self.emissive]
            .into_iter()
            .flatten()
    }
}

impl Material {
    pub fn name(&self) -> &str {
        match self {
            Material::Standard(m) => &m.name,
            Material::Unlit(m) => &m.name,
        }
    }

    /// Whether image-based lighting intensity affects this material
    pub fn supports_env_intensity(&self) -> bool {
        matches!(self, Material::Standard(_))
    }

    pub fn env_intensity(&self) -> Option<f32> {
        match self {
            Material::Standard(m) => Some(m.env_intensity),
            Material::Unlit(_) => None,
        }
    }

    /// Returns `false` when the material has no such property
    pub fn set_env_intensity(&mut self, intensity: f32) -> bool {
        match self {
            Material::Standard(m) => {
                m.env_intensity = intensity;
                true
            }
            Material::Unlit(_) => false,
        }
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        match self {
            Material::Standard(m) => m.alpha_mode,
            Material::Unlit(m) => m.alpha_mode,
        }
    }

    pub fn double_sided(&self) -> bool {
        match self {
            Material::Standard(m) => m.double_sided,
            Material::Unlit(m) => m.double_sided,
        }
    }

    /// Every texture-valued property
    pub fn texture_slots(&self) -> MaterialTextureSlots {
        match self {
            Material::Standard(m) => MaterialTextureSlots {
                base_color: m.base_color_texture,
                metallic_roughness: m.metallic_roughness_texture,
                normal: m.normal_texture,
                occlusion: m.occlusion_texture,
                emissive: m.emissive_texture,
            },
            Material::Unlit(m) => MaterialTextureSlots {
                base_color: m.base_color_texture,
                ..Default::default()
            },
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::Standard(StandardMaterial {
            name: "default".into(),
            ..Default::default()
        })
    }
}

#[derive(Debug)]
pub struct MaterialSlot {
    pub material: Material,
    pub gpu: Option<MaterialHandle>,
}

impl MaterialSlot {
    pub fn new(material: Material) -> Self {
        Self { material, gpu: None }
    }
}

/// Summary counts shown after a successful load
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub nodes: usize,
    /// Renderable (node, primitive) pairs
    pub meshes: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub materials: usize,
    pub textures: usize,
}

impl std::fmt::Display for SceneStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} meshes, {} vertices, {} triangles",
            self.meshes, self.vertices, self.triangles
        )
    }
}

/// A loaded model: node hierarchy, meshes, materials and textures
#[derive(Debug, Default)]
pub struct Subtree {
    pub name: String,
    pub nodes: Vec<Node>,
    pub roots: Vec<usize>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<MaterialSlot>,
    pub textures: Vec<Texture>,
}

impl Subtree {
    /// Depth-first walk from the roots yielding `(node index, world transform)`.
    /// Each node is visited once even if the hierarchy is malformed.
    pub fn world_transforms(&self) -> Vec<(usize, Mat4)> {
        let mut visited = vec![false; self.nodes.len()];
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|&r| (r, Mat4::IDENTITY))
            .collect();

        while let Some((idx, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(idx) else { continue };
            if std::mem::replace(&mut visited[idx], true) {
                continue;
            }
            let world = parent * node.transform;
            out.push((idx, world));
            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
        out
    }

    /// Visit every renderable (node world transform, mesh) pair
    pub fn for_each_renderable(&self, mut f: impl FnMut(Mat4, &Mesh)) {
        for (idx, world) in self.world_transforms() {
            if let Some(mesh) = self.nodes[idx].mesh.and_then(|m| self.meshes.get(m)) {
                f(world, mesh);
            }
        }
    }

    /// World-space bounds of all renderable geometry
    pub fn world_bounds(&self) -> Bounds {
        let mut bounds = Bounds::empty();
        self.for_each_renderable(|world, mesh| {
            for prim in &mesh.primitives {
                bounds.merge(&prim.bounds.transformed(&world));
            }
        });
        bounds
    }

    pub fn stats(&self) -> SceneStats {
        let mut stats = SceneStats {
            nodes: self.nodes.len(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            ..Default::default()
        };
        self.for_each_renderable(|_, mesh| {
            for prim in &mesh.primitives {
                stats.meshes += 1;
                stats.vertices += prim.geometry.vertex_count();
                stats.triangles += prim.geometry.triangle_count();
            }
        });
        stats
    }

    /// True when any backend handle is still held
    pub fn has_gpu_resources(&self) -> bool {
        self.meshes.iter().flat_map(|m| &m.primitives).any(|p| p.gpu.is_some())
            || self.materials.iter().any(|m| m.gpu.is_some())
            || self.textures.iter().any(|t| t.gpu.is_some())
    }
}
