//! Boundary between viewer logic and the GPU.
//!
//! The controller, lifecycle and environment code only talk to a
//! [`RenderBackend`]. The wgpu renderer implements it for the window;
//! [`HeadlessBackend`] implements it without a device and keeps an exact
//! account of live resources.

use std::collections::{HashMap, HashSet};

use glam::Mat4;

use crate::prefilter::ReflectionMap;
use crate::scene::{Geometry, Material, TextureData};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

handle!(
    /// Vertex and index buffers of one primitive
    GeometryHandle
);
handle!(
    /// Uploaded texture with its mip chain
    TextureHandle
);
handle!(
    /// Material uniform and bind group
    MaterialHandle
);
handle!(
    /// Uploaded reflection map
    EnvironmentHandle
);

/// Resolved texture handles for each material slot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub base_color: Option<TextureHandle>,
    pub metallic_roughness: Option<TextureHandle>,
    pub normal: Option<TextureHandle>,
    pub occlusion: Option<TextureHandle>,
    pub emissive: Option<TextureHandle>,
}

/// One renderable primitive instance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub transform: Mat4,
}

/// What fills the viewport behind the model
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Background {
    /// Linear RGB clear color
    Color([f32; 3]),
    Environment(EnvironmentHandle),
}

/// GPU resource creation and scene state used by the viewer
pub trait RenderBackend {
    fn create_geometry(&mut self, geometry: &Geometry) -> GeometryHandle;
    fn release_geometry(&mut self, handle: GeometryHandle);

    fn create_texture(&mut self, texture: &TextureData) -> TextureHandle;
    fn release_texture(&mut self, handle: TextureHandle);

    fn create_material(&mut self, material: &Material, textures: &MaterialTextures) -> MaterialHandle;
    /// Re-upload scalar parameters (e.g. environment intensity)
    fn update_material(&mut self, handle: MaterialHandle, material: &Material);
    fn release_material(&mut self, handle: MaterialHandle);

    /// Replace everything drawn in the next frame
    fn set_draw_list(&mut self, items: Vec<DrawItem>);

    fn create_environment(&mut self, map: &ReflectionMap) -> EnvironmentHandle;
    /// Image-based lighting source; `None` leaves only ambient light
    fn set_lighting(&mut self, environment: Option<EnvironmentHandle>);
    fn set_background(&mut self, background: Background);
}

/// Backend without a GPU that tracks every resource it hands out.
///
/// Used by the `info` command and by tests; releasing an unknown handle is
/// recorded in `invalid_releases` instead of panicking.
#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: u64,
    pub geometries: HashSet<GeometryHandle>,
    pub textures: HashSet<TextureHandle>,
    pub materials: HashMap<MaterialHandle, Material>,
    pub environments: HashSet<EnvironmentHandle>,
    pub draw_list: Vec<DrawItem>,
    pub lighting: Option<EnvironmentHandle>,
    pub background: Background,
    pub invalid_releases: usize,
    pub material_updates: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            geometries: HashSet::new(),
            textures: HashSet::new(),
            materials: HashMap::new(),
            environments: HashSet::new(),
            draw_list: Vec::new(),
            lighting: None,
            background: Background::Color([0.0; 3]),
            invalid_releases: 0,
            material_updates: 0,
        }
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Geometry, texture and material handles not yet released
    pub fn live_scene_resources(&self) -> usize {
        self.geometries.len() + self.textures.len() + self.materials.len()
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_geometry(&mut self, _geometry: &Geometry) -> GeometryHandle {
        let handle = GeometryHandle(self.next());
        self.geometries.insert(handle);
        handle
    }

    fn release_geometry(&mut self, handle: GeometryHandle) {
        if !self.geometries.remove(&handle) {
            self.invalid_releases += 1;
        }
    }

    fn create_texture(&mut self, _texture: &TextureData) -> TextureHandle {
        let handle = TextureHandle(self.next());
        self.textures.insert(handle);
        handle
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if !self.textures.remove(&handle) {
            self.invalid_releases += 1;
        }
    }

    fn create_material(&mut self, material: &Material, _textures: &MaterialTextures) -> MaterialHandle {
        let handle = MaterialHandle(self.next());
        self.materials.insert(handle, material.clone());
        handle
    }

    fn update_material(&mut self, handle: MaterialHandle, material: &Material) {
        match self.materials.get_mut(&handle) {
            Some(slot) => {
                *slot = material.clone();
                self.material_updates += 1;
            }
            None => tracing::warn!(?handle, "update of released material"),
        }
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        if self.materials.remove(&handle).is_none() {
            self.invalid_releases += 1;
        }
    }

    fn set_draw_list(&mut self, items: Vec<DrawItem>) {
        self.draw_list = items;
    }

    fn create_environment(&mut self, _map: &ReflectionMap) -> EnvironmentHandle {
        let handle = EnvironmentHandle(self.next());
        self.environments.insert(handle);
        handle
    }

    fn set_lighting(&mut self, environment: Option<EnvironmentHandle>) {
        self.lighting = environment;
    }

    fn set_background(&mut self, background: Background) {
        self.background = background;
    }
}
