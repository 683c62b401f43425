//! GPU residency of a subtree: upload on install, release on dispose.

use crate::backend::{DrawItem, MaterialTextures, RenderBackend};
use crate::scene::{Subtree, TextureSlot};

/// Counts of handles released by [`dispose`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposeStats {
    pub geometries: usize,
    pub textures: usize,
    pub materials: usize,
}

impl DisposeStats {
    pub fn total(&self) -> usize {
        self.geometries + self.textures + self.materials
    }
}

/// Upload every texture, material and primitive of `subtree` that is not yet
/// resident and return the draw list for its renderable nodes.
pub fn install<B: RenderBackend + ?Sized>(subtree: &mut Subtree, backend: &mut B) -> Vec<DrawItem> {
    let _span = tracing::info_span!("install_subtree").entered();

    for texture in &mut subtree.textures {
        if texture.gpu.is_none() {
            texture.gpu = Some(backend.create_texture(&texture.data));
        }
    }

    let textures = &subtree.textures;
    let resolve = |slot: Option<TextureSlot>| {
        slot.and_then(|s| textures.get(s.texture)).and_then(|t| t.gpu)
    };
    for slot in &mut subtree.materials {
        if slot.gpu.is_some() {
            continue;
        }
        let slots = slot.material.texture_slots();
        let bound = MaterialTextures {
            base_color: resolve(slots.base_color),
            metallic_roughness: resolve(slots.metallic_roughness),
            normal: resolve(slots.normal),
            occlusion: resolve(slots.occlusion),
            emissive: resolve(slots.emissive),
        };
        slot.gpu = Some(backend.create_material(&slot.material, &bound));
    }

    for mesh in &mut subtree.meshes {
        for prim in &mut mesh.primitives {
            if prim.gpu.is_none() {
                prim.gpu = Some(backend.create_geometry(&prim.geometry));
            }
        }
    }

    let mut items = Vec::new();
    let materials = &subtree.materials;
    subtree.for_each_renderable(|transform, mesh| {
        for prim in &mesh.primitives {
            let material = materials.get(prim.material).and_then(|m| m.gpu);
            if let (Some(geometry), Some(material)) = (prim.gpu, material) {
                items.push(DrawItem { geometry, material, transform });
            }
        }
    });
    tracing::debug!(draws = items.len(), "subtree installed");
    items
}

/// Release every backend handle held by `subtree`.
///
/// Walks the renderable nodes first, releasing each primitive's geometry and,
/// through its material slot, the material's textures and the material
/// itself. Handles not reachable from a node are swept afterwards. Handles
/// are taken on release, so shared materials and textures go once and a
/// second call is a no-op.
pub fn dispose<B: RenderBackend + ?Sized>(subtree: &mut Subtree, backend: &mut B) -> DisposeStats {
    let _span = tracing::info_span!("dispose_subtree").entered();
    let mut stats = DisposeStats::default();

    for (node_idx, _) in subtree.world_transforms() {
        let Some(mesh_idx) = subtree.nodes[node_idx].mesh else { continue };
        let Some(mesh) = subtree.meshes.get_mut(mesh_idx) else { continue };
        let mut used_materials = Vec::with_capacity(mesh.primitives.len());
        for prim in &mut mesh.primitives {
            if let Some(handle) = prim.gpu.take() {
                backend.release_geometry(handle);
                stats.geometries += 1;
            }
            used_materials.push(prim.material);
        }
        for material_idx in used_materials {
            release_material(subtree, material_idx, backend, &mut stats);
        }
    }

    // Unreachable leftovers
    for mesh in &mut subtree.meshes {
        for prim in &mut mesh.primitives {
            if let Some(handle) = prim.gpu.take() {
                backend.release_geometry(handle);
                stats.geometries += 1;
            }
        }
    }
    for idx in 0..subtree.materials.len() {
        release_material(subtree, idx, backend, &mut stats);
    }
    for texture in &mut subtree.textures {
        if let Some(handle) = texture.gpu.take() {
            backend.release_texture(handle);
            stats.textures += 1;
        }
    }

    if stats.total() > 0 {
        tracing::debug!(
            geometries = stats.geometries,
            textures = stats.textures,
            materials = stats.materials,
            "subtree disposed"
        );
    }
    stats
}

fn release_material<B: RenderBackend + ?Sized>(
    subtree: &mut Subtree,
    idx: usize,
    backend: &mut B,
    stats: &mut DisposeStats,
) {
    let Some(slot) = subtree.materials.get_mut(idx) else { return };
    for tex in slot.material.texture_slots().iter() {
        if let Some(handle) = subtree.textures.get_mut(tex.texture).and_then(|t| t.gpu.take()) {
            backend.release_texture(handle);
            stats.textures += 1;
        }
    }
    if let Some(handle) = slot.gpu.take() {
        backend.release_material(handle);
        stats.materials += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::scene::*;
    use glam::Mat4;

    fn tex(name: &str) -> Texture {
        Texture {
            name: name.into(),
            data: TextureData {
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8 { srgb: true },
                levels: vec![vec![255; 4]],
            },
            gpu: None,
        }
    }

    fn triangle() -> Geometry {
        Geometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0, 0.0]; 3],
            indices: vec![0, 1, 2],
        }
    }

    /// Two nodes sharing one mesh whose primitives share a textured material
    fn shared_subtree() -> Subtree {
        let slot = Some(TextureSlot { texture: 0, tex_coord: 0 });
        let material = Material::Standard(StandardMaterial {
            base_color_texture: slot,
            emissive_texture: slot,
            normal_texture: Some(TextureSlot { texture: 1, tex_coord: 0 }),
            ..Default::default()
        });
        Subtree {
            name: "shared".into(),
            nodes: vec![
                Node { name: "a".into(), transform: Mat4::IDENTITY, mesh: Some(0), children: vec![1] },
                Node { name: "b".into(), transform: Mat4::IDENTITY, mesh: Some(0), children: vec![] },
            ],
            roots: vec![0],
            meshes: vec![Mesh {
                name: "m".into(),
                primitives: vec![Primitive::new(triangle(), 0), Primitive::new(triangle(), 0)],
            }],
            materials: vec![MaterialSlot::new(material)],
            textures: vec![tex("albedo"), tex("normal")],
        }
    }

    #[test]
    fn test_install_creates_draws_per_node() {
        let mut backend = HeadlessBackend::new();
        let mut subtree = shared_subtree();
        let items = install(&mut subtree, &mut backend);
        assert_eq!(items.len(), 4);
        assert_eq!(backend.geometries.len(), 2);
        assert_eq!(backend.textures.len(), 2);
        assert_eq!(backend.materials.len(), 1);
    }

    #[test]
    fn test_dispose_releases_shared_once() {
        let mut backend = HeadlessBackend::new();
        let mut subtree = shared_subtree();
        install(&mut subtree, &mut backend);

        let stats = dispose(&mut subtree, &mut backend);
        assert_eq!(stats, DisposeStats { geometries: 2, textures: 2, materials: 1 });
        assert_eq!(backend.live_scene_resources(), 0);
        assert_eq!(backend.invalid_releases, 0);
        assert!(!subtree.has_gpu_resources());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut backend = HeadlessBackend::new();
        let mut subtree = shared_subtree();
        install(&mut subtree, &mut backend);
        dispose(&mut subtree, &mut backend);

        let again = dispose(&mut subtree, &mut backend);
        assert_eq!(again.total(), 0);
        assert_eq!(backend.invalid_releases, 0);
    }

    #[test]
    fn test_dispose_sweeps_unreachable_mesh() {
        let mut backend = HeadlessBackend::new();
        let mut subtree = shared_subtree();
        subtree.meshes.push(Mesh {
            name: "orphan".into(),
            primitives: vec![Primitive::new(triangle(), 0)],
        });
        install(&mut subtree, &mut backend);
        assert_eq!(backend.geometries.len(), 3);

        dispose(&mut subtree, &mut backend);
        assert_eq!(backend.live_scene_resources(), 0);
    }
}
