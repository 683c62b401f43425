//! Uniform blocks shared with the WGSL shaders
//!
//! Every struct here is `#[repr(C)]` and packed into vec4 slots so the Rust
//! layout matches the WGSL uniform layout byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// glTF metallic-roughness material parameters
///
/// Colors are linear. Texture presence is implicit: unbound slots get a white
/// 1x1 texture, so factors pass through unchanged. Only the normal map needs
/// an explicit flag because a flat default would still perturb the normal.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PbrParams {
    /// Base color factor (rgba)
    pub base_color_factor: Vec4,
    /// Emissive factor (rgb), environment intensity (w)
    pub emissive_env: Vec4,
    /// x=metallic, y=roughness, z=normal_scale, w=occlusion_strength
    pub params: Vec4,
    /// x=alpha_cutoff (0 disables), y=unlit, z=has_normal_texture, w=alpha_blend
    pub flags: Vec4,
}

impl Default for PbrParams {
    fn default() -> Self {
        Self {
            base_color_factor: Vec4::ONE,
            emissive_env: Vec4::new(0.0, 0.0, 0.0, 1.0),
            params: Vec4::new(1.0, 1.0, 1.0, 1.0),
            flags: Vec4::ZERO,
        }
    }
}

impl PbrParams {
    /// Unlit material: base color is written out as-is
    pub fn unlit(color: Vec4) -> Self {
        let mut p = Self::default();
        p.base_color_factor = color;
        p.flags.y = 1.0;
        p
    }

    pub fn set_base_color(&mut self, color: Vec4) {
        self.base_color_factor = color;
    }

    pub fn set_metallic(&mut self, metallic: f32) {
        self.params.x = metallic;
    }

    pub fn set_roughness(&mut self, roughness: f32) {
        self.params.y = roughness;
    }

    pub fn set_emissive(&mut self, emissive: Vec3) {
        self.emissive_env = emissive.extend(self.emissive_env.w);
    }

    /// Scale applied to image-based lighting for this material
    pub fn set_env_intensity(&mut self, intensity: f32) {
        self.emissive_env.w = intensity;
    }

    pub fn set_normal_texture(&mut self, scale: f32) {
        self.params.z = scale;
        self.flags.z = 1.0;
    }

    pub fn set_occlusion_strength(&mut self, strength: f32) {
        self.params.w = strength;
    }

    /// Alpha-mask cutoff; fragments below it are discarded
    pub fn set_alpha_cutoff(&mut self, cutoff: f32) {
        self.flags.x = cutoff;
    }

    pub fn set_alpha_blend(&mut self, blend: bool) {
        self.flags.w = if blend { 1.0 } else { 0.0 };
    }
}

/// Camera uniform (group 0, binding 0)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: Mat4,
    /// View-projection with the translation stripped, for the sky sphere
    pub sky_view_proj: Mat4,
    /// Camera position (xyz), exposure (w)
    pub position: Vec4,
    /// x=encode sRGB in shader, y=ACES tone mapping, zw unused
    pub output: Vec4,
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY,
            sky_view_proj: Mat4::IDENTITY,
            position: Vec4::new(0.0, 0.0, 0.0, 1.0),
            output: Vec4::new(0.0, 1.0, 0.0, 0.0),
        }
    }
}

/// Hemisphere ambient light (group 0, binding 1)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct HemisphereLight {
    /// Sky color (rgb), intensity (w)
    pub sky: Vec4,
    /// Ground color (rgb), w unused
    pub ground: Vec4,
}

impl HemisphereLight {
    pub fn new(sky: Vec3, ground: Vec3, intensity: f32) -> Self {
        Self {
            sky: sky.extend(intensity),
            ground: ground.extend(0.0),
        }
    }
}

impl Default for HemisphereLight {
    fn default() -> Self {
        Self::new(Vec3::ONE, Vec3::new(0.2, 0.267, 0.4), 0.8)
    }
}

/// Per-draw model transform (group 2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ModelUniform {
    pub model: Mat4,
    pub normal_matrix: Mat4,
}

impl ModelUniform {
    pub fn from_transform(model: Mat4) -> Self {
        Self {
            model,
            normal_matrix: model.inverse().transpose(),
        }
    }
}

impl Default for ModelUniform {
    fn default() -> Self {
        Self::from_transform(Mat4::IDENTITY)
    }
}

/// Environment sampling parameters (group 3 in the surface shader)
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct EnvUniform {
    /// 1.0 when a reflection map is bound
    pub enabled: f32,
    /// Index of the roughest mip level
    pub max_lod: f32,
    /// Background brightness multiplier
    pub intensity: f32,
    pub _pad: f32,
}

impl Default for EnvUniform {
    fn default() -> Self {
        Self {
            enabled: 0.0,
            max_lod: 0.0,
            intensity: 1.0,
            _pad: 0.0,
        }
    }
}
