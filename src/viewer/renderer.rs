//! wgpu implementation of [`RenderBackend`]

use std::collections::HashMap;

use glam::{Mat4, Vec3, Vec4};
use half::f16;
use wgpu::util::DeviceExt;

use pbr_surface::{
    BindGroupLayouts, CameraUniform, EnvUniform, HemisphereLight, ModelUniform, PbrParams, PipelineConfig, Vertex,
};

use crate::backend::{
    Background, DrawItem, EnvironmentHandle, GeometryHandle, MaterialHandle, MaterialTextures, RenderBackend,
    TextureHandle,
};
use crate::prefilter::ReflectionMap;
use crate::scene::{AlphaMode, CompressedFormat, Geometry, Material, TextureData, TextureFormat};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Ambient hemisphere: white sky, blue-grey ground
const HEMISPHERE_SKY: Vec3 = Vec3::ONE;
const HEMISPHERE_GROUND: Vec3 = Vec3::new(0.2, 0.267, 0.4);
const HEMISPHERE_INTENSITY: f32 = 0.8;

struct GpuGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct GpuTexture {
    #[allow(dead_code)] // kept alive for the view
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuMaterial {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    blend: bool,
    double_sided: bool,
}

struct GpuEnvironment {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct GpuDraw {
    item: DrawItem,
    #[allow(dead_code)]
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
}

struct DepthTexture {
    view: wgpu::TextureView,
    size: (u32, u32),
}

struct Pipelines {
    opaque: wgpu::RenderPipeline,
    opaque_double_sided: wgpu::RenderPipeline,
    blend: wgpu::RenderPipeline,
    blend_double_sided: wgpu::RenderPipeline,
    skybox: wgpu::RenderPipeline,
}

impl Pipelines {
    fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, format: wgpu::TextureFormat) -> Self {
        let make = |label, blend, cull_mode| {
            pbr_surface::create_pipeline(
                device,
                layouts,
                &PipelineConfig {
                    label: Some(label),
                    format,
                    depth_format: DEPTH_FORMAT,
                    blend,
                    cull_mode,
                    depth_write: !blend,
                },
            )
        };
        Self {
            opaque: make("surface_opaque", false, Some(wgpu::Face::Back)),
            opaque_double_sided: make("surface_opaque_double_sided", false, None),
            blend: make("surface_blend", true, Some(wgpu::Face::Back)),
            blend_double_sided: make("surface_blend_double_sided", true, None),
            skybox: pbr_surface::create_skybox_pipeline(device, layouts, format),
        }
    }

    fn for_material(&self, material: &GpuMaterial) -> &wgpu::RenderPipeline {
        match (material.blend, material.double_sided) {
            (false, false) => &self.opaque,
            (false, true) => &self.opaque_double_sided,
            (true, false) => &self.blend,
            (true, true) => &self.blend_double_sided,
        }
    }
}

/// Per-frame camera state handed to [`Renderer::render`]
#[derive(Clone, Copy, Debug)]
pub struct FrameCamera {
    pub view_proj: Mat4,
    pub sky_view_proj: Mat4,
    pub position: Vec3,
}

/// Main renderer state
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    layouts: BindGroupLayouts,
    pipelines: Pipelines,

    camera_buffer: wgpu::Buffer,
    #[allow(dead_code)]
    light_buffer: wgpu::Buffer,
    camera_light_bind_group: wgpu::BindGroup,

    sky_vertex_buffer: wgpu::Buffer,
    sky_index_buffer: wgpu::Buffer,
    sky_index_count: u32,

    material_sampler: wgpu::Sampler,
    env_sampler: wgpu::Sampler,
    white: GpuTexture,
    /// Bound when no reflection map is active
    fallback_environment: GpuEnvironment,

    depth: Option<DepthTexture>,

    next_id: u64,
    geometries: HashMap<GeometryHandle, GpuGeometry>,
    textures: HashMap<TextureHandle, GpuTexture>,
    materials: HashMap<MaterialHandle, GpuMaterial>,
    environments: HashMap<EnvironmentHandle, GpuEnvironment>,
    draws: Vec<GpuDraw>,
    lighting: Option<EnvironmentHandle>,
    background: Background,

    /// Linear exposure applied before tone mapping
    pub exposure: f32,
}

impl Renderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let layouts = pbr_surface::create_bind_group_layouts(&device);
        let pipelines = Pipelines::new(&device, &layouts, format);

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera_buffer"),
            contents: bytemuck::bytes_of(&CameraUniform::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let light = HemisphereLight::new(HEMISPHERE_SKY, HEMISPHERE_GROUND, HEMISPHERE_INTENSITY);
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("hemisphere_light_buffer"),
            contents: bytemuck::bytes_of(&light),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let camera_light_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_light_bind_group"),
            layout: &layouts.camera_light,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_buffer.as_entire_binding(),
                },
            ],
        });

        let (sky_verts, sky_indices) = pbr_surface::generate_sky_sphere(1.0, 48, 24);
        let sky_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sky_vertex_buffer"),
            contents: bytemuck::cast_slice(&sky_verts),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sky_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sky_index_buffer"),
            contents: bytemuck::cast_slice(&sky_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("env_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let white = upload_texture(
            &device,
            &queue,
            &TextureData {
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8 { srgb: false },
                levels: vec![vec![255; 4]],
            },
        );

        let black = ReflectionMap {
            levels: vec![crate::prefilter::MipLevel {
                width: 1,
                height: 1,
                texels: vec![f16::ZERO, f16::ZERO, f16::ZERO, f16::ONE],
            }],
        };
        let fallback_environment =
            upload_environment(&device, &queue, &layouts.environment, &env_sampler, &black, false);

        Self {
            device,
            queue,
            format,
            layouts,
            pipelines,
            camera_buffer,
            light_buffer,
            camera_light_bind_group,
            sky_vertex_buffer,
            sky_index_buffer,
            sky_index_count: sky_indices.len() as u32,
            material_sampler,
            env_sampler,
            white,
            fallback_environment,
            depth: None,
            next_id: 1,
            geometries: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            environments: HashMap::new(),
            draws: Vec::new(),
            lighting: None,
            background: Background::Color([0.0; 3]),
            exposure: 1.0,
        }
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Live GPU objects (geometry, texture, material, environment)
    pub fn resource_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.geometries.len(),
            self.textures.len(),
            self.materials.len(),
            self.environments.len(),
        )
    }

    fn ensure_depth_texture(&mut self, width: u32, height: u32) {
        if self.depth.as_ref().is_some_and(|d| d.size == (width, height)) {
            return;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.depth = Some(DepthTexture {
            view,
            size: (width, height),
        });
    }

    /// Render the current draw list into `view`
    pub fn render(&mut self, view: &wgpu::TextureView, width: u32, height: u32, camera: &FrameCamera) {
        let _span = tracing::trace_span!("render").entered();
        if width == 0 || height == 0 {
            return;
        }
        self.ensure_depth_texture(width, height);
        let Some(depth) = &self.depth else {
            return;
        };

        let uniform = CameraUniform {
            view_proj: camera.view_proj,
            sky_view_proj: camera.sky_view_proj,
            position: camera.position.extend(self.exposure),
            output: Vec4::new(if self.format.is_srgb() { 0.0 } else { 1.0 }, 1.0, 0.0, 0.0),
        };
        self.queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&uniform));

        let clear = match self.background {
            Background::Color(c) => {
                let c = if self.format.is_srgb() { c } else { linear_to_srgb(c) };
                wgpu::Color {
                    r: c[0] as f64,
                    g: c[1] as f64,
                    b: c[2] as f64,
                    a: 1.0,
                }
            }
            Background::Environment(_) => wgpu::Color::BLACK,
        };

        let lighting = self
            .lighting
            .and_then(|h| self.environments.get(&h))
            .unwrap_or(&self.fallback_environment);

        let mut surfaces = Vec::with_capacity(self.draws.len());
        for draw in &self.draws {
            let (Some(material), Some(geometry)) =
                (self.materials.get(&draw.item.material), self.geometries.get(&draw.item.geometry))
            else {
                continue;
            };
            surfaces.push((draw, material, geometry));
        }
        let sky = match self.background {
            Background::Environment(handle) => self.environments.get(&handle),
            Background::Color(_) => None,
        };
        let steps = frame_steps(
            surfaces.iter().map(|(draw, material, _)| {
                let center = draw.item.transform.w_axis.truncate();
                (material.blend, center.distance_squared(camera.position))
            }),
            sky.is_some(),
        );

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for step in steps {
                match step {
                    FrameStep::Surface(i) => {
                        let (draw, material, geometry) = surfaces[i];
                        // Groups 0 and 1 may hold the sky's bindings
                        pass.set_bind_group(0, &self.camera_light_bind_group, &[]);
                        pass.set_bind_group(3, &lighting.bind_group, &[]);
                        pass.set_pipeline(self.pipelines.for_material(material));
                        pass.set_bind_group(1, &material.bind_group, &[]);
                        pass.set_bind_group(2, &draw.model_bind_group, &[]);
                        pass.set_vertex_buffer(0, geometry.vertex_buffer.slice(..));
                        pass.set_index_buffer(geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..geometry.index_count, 0, 0..1);
                    }
                    FrameStep::Sky => {
                        let Some(env) = sky else { continue };
                        pass.set_pipeline(&self.pipelines.skybox);
                        pass.set_bind_group(0, &self.camera_light_bind_group, &[]);
                        pass.set_bind_group(1, &env.bind_group, &[]);
                        pass.set_vertex_buffer(0, self.sky_vertex_buffer.slice(..));
                        pass.set_index_buffer(self.sky_index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..self.sky_index_count, 0, 0..1);
                    }
                }
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl RenderBackend for Renderer {
    fn create_geometry(&mut self, geometry: &Geometry) -> GeometryHandle {
        let vertices = interleave(geometry);
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_vertex_buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_index_buffer"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let handle = GeometryHandle(self.next());
        self.geometries.insert(
            handle,
            GpuGeometry {
                vertex_buffer,
                index_buffer,
                index_count: geometry.indices.len() as u32,
            },
        );
        handle
    }

    fn release_geometry(&mut self, handle: GeometryHandle) {
        match self.geometries.remove(&handle) {
            Some(geometry) => {
                geometry.vertex_buffer.destroy();
                geometry.index_buffer.destroy();
            }
            None => tracing::warn!(?handle, "release of unknown geometry"),
        }
    }

    fn create_texture(&mut self, texture: &TextureData) -> TextureHandle {
        let gpu = upload_texture(&self.device, &self.queue, texture);
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, gpu);
        handle
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        match self.textures.remove(&handle) {
            Some(texture) => texture.texture.destroy(),
            None => tracing::warn!(?handle, "release of unknown texture"),
        }
    }

    fn create_material(&mut self, material: &Material, textures: &MaterialTextures) -> MaterialHandle {
        let params = material_params(material);
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("material_buffer"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let view = |slot: Option<TextureHandle>| {
            slot.and_then(|h| self.textures.get(&h))
                .map(|t| &t.view)
                .unwrap_or(&self.white.view)
        };
        let bind_group = pbr_surface::create_material_bind_group(
            &self.device,
            &self.layouts.material,
            &buffer,
            &self.material_sampler,
            [
                view(textures.base_color),
                view(textures.metallic_roughness),
                view(textures.normal),
                view(textures.occlusion),
                view(textures.emissive),
            ],
        );
        let gpu = GpuMaterial {
            buffer,
            bind_group,
            blend: material.alpha_mode() == AlphaMode::Blend,
            double_sided: material.double_sided(),
        };
        let handle = MaterialHandle(self.next());
        self.materials.insert(handle, gpu);
        handle
    }

    fn update_material(&mut self, handle: MaterialHandle, material: &Material) {
        if let Some(gpu) = self.materials.get(&handle) {
            self.queue
                .write_buffer(&gpu.buffer, 0, bytemuck::bytes_of(&material_params(material)));
        }
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        match self.materials.remove(&handle) {
            Some(material) => material.buffer.destroy(),
            None => tracing::warn!(?handle, "release of unknown material"),
        }
    }

    fn set_draw_list(&mut self, items: Vec<DrawItem>) {
        self.draws = items
            .into_iter()
            .map(|item| {
                let model_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("model_buffer"),
                    contents: bytemuck::bytes_of(&ModelUniform::from_transform(item.transform)),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let model_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("model_bind_group"),
                    layout: &self.layouts.model,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: model_buffer.as_entire_binding(),
                    }],
                });
                GpuDraw {
                    item,
                    model_buffer,
                    model_bind_group,
                }
            })
            .collect();
    }

    fn create_environment(&mut self, map: &ReflectionMap) -> EnvironmentHandle {
        let env = upload_environment(
            &self.device,
            &self.queue,
            &self.layouts.environment,
            &self.env_sampler,
            map,
            true,
        );
        let handle = EnvironmentHandle(self.next());
        self.environments.insert(handle, env);
        handle
    }

    fn set_lighting(&mut self, environment: Option<EnvironmentHandle>) {
        self.lighting = environment;
    }

    fn set_background(&mut self, background: Background) {
        self.background = background;
    }
}

/// One draw in a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameStep {
    /// Index into the frame's surface list
    Surface(usize),
    Sky,
}

/// Opaque surfaces in list order, then the sky (depth-tested against them),
/// then blended surfaces back to front, since blended surfaces do not write
/// depth. Each surface is `(blended, squared camera distance)`.
fn frame_steps(surfaces: impl IntoIterator<Item = (bool, f32)>, sky: bool) -> Vec<FrameStep> {
    let mut steps = Vec::new();
    let mut blended = Vec::new();
    for (i, (blend, distance)) in surfaces.into_iter().enumerate() {
        if blend {
            blended.push((distance, i));
        } else {
            steps.push(FrameStep::Surface(i));
        }
    }
    if sky {
        steps.push(FrameStep::Sky);
    }
    blended.sort_by(|a, b| b.0.total_cmp(&a.0));
    steps.extend(blended.into_iter().map(|(_, i)| FrameStep::Surface(i)));
    steps
}

/// Shader parameters for a material
pub fn material_params(material: &Material) -> PbrParams {
    let mut params = match material {
        Material::Standard(m) => {
            let mut p = PbrParams::default();
            p.set_base_color(Vec4::from_array(m.base_color_factor));
            p.set_metallic(m.metallic_factor);
            p.set_roughness(m.roughness_factor);
            p.set_emissive(Vec3::from_array(m.emissive_factor));
            p.set_env_intensity(m.env_intensity);
            p.set_occlusion_strength(m.occlusion_strength);
            if m.normal_texture.is_some() {
                p.set_normal_texture(m.normal_scale);
            }
            p
        }
        Material::Unlit(m) => PbrParams::unlit(Vec4::from_array(m.base_color_factor)),
    };
    match material.alpha_mode() {
        AlphaMode::Opaque => {}
        AlphaMode::Mask(cutoff) => params.set_alpha_cutoff(cutoff.max(f32::EPSILON)),
        AlphaMode::Blend => params.set_alpha_blend(true),
    }
    params
}

fn interleave(geometry: &Geometry) -> Vec<Vertex> {
    geometry
        .positions
        .iter()
        .enumerate()
        .map(|(i, &position)| Vertex {
            position,
            normal: geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            uv: geometry.uvs.get(i).copied().unwrap_or([0.0, 0.0]),
        })
        .collect()
}

fn wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    use wgpu::{AstcBlock, AstcChannel};
    match format {
        TextureFormat::Rgba8 { srgb: true } => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Rgba8 { srgb: false } => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Compressed(c) => match c {
            CompressedFormat::Bc1RgbaUnorm => wgpu::TextureFormat::Bc1RgbaUnorm,
            CompressedFormat::Bc1RgbaSrgb => wgpu::TextureFormat::Bc1RgbaUnormSrgb,
            CompressedFormat::Bc3RgbaUnorm => wgpu::TextureFormat::Bc3RgbaUnorm,
            CompressedFormat::Bc3RgbaSrgb => wgpu::TextureFormat::Bc3RgbaUnormSrgb,
            CompressedFormat::Bc4RUnorm => wgpu::TextureFormat::Bc4RUnorm,
            CompressedFormat::Bc5RgUnorm => wgpu::TextureFormat::Bc5RgUnorm,
            CompressedFormat::Bc7RgbaUnorm => wgpu::TextureFormat::Bc7RgbaUnorm,
            CompressedFormat::Bc7RgbaSrgb => wgpu::TextureFormat::Bc7RgbaUnormSrgb,
            CompressedFormat::Etc2Rgb8Unorm => wgpu::TextureFormat::Etc2Rgb8Unorm,
            CompressedFormat::Etc2Rgb8Srgb => wgpu::TextureFormat::Etc2Rgb8UnormSrgb,
            CompressedFormat::Etc2Rgba8Unorm => wgpu::TextureFormat::Etc2Rgba8Unorm,
            CompressedFormat::Etc2Rgba8Srgb => wgpu::TextureFormat::Etc2Rgba8UnormSrgb,
            CompressedFormat::Astc4x4Unorm => wgpu::TextureFormat::Astc {
                block: AstcBlock::B4x4,
                channel: AstcChannel::Unorm,
            },
            CompressedFormat::Astc4x4Srgb => wgpu::TextureFormat::Astc {
                block: AstcBlock::B4x4,
                channel: AstcChannel::UnormSrgb,
            },
        },
    }
}

fn upload_texture(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData) -> GpuTexture {
    // Levels packed back to back, each trimmed to its exact size
    let mut bytes = Vec::with_capacity(data.byte_size());
    for (i, level) in data.levels.iter().enumerate() {
        let size = crate::loader::ktx2::level_size(data.format, data.width >> i, data.height >> i);
        bytes.extend_from_slice(&level[..size.min(level.len())]);
    }

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("material_texture"),
            size: wgpu::Extent3d {
                width: data.width,
                height: data.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: data.levels.len().max(1) as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(data.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &bytes,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}

fn upload_environment(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    map: &ReflectionMap,
    enabled: bool,
) -> GpuEnvironment {
    let texels: Vec<f16> = map.levels.iter().flat_map(|l| l.texels.iter().copied()).collect();
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some("reflection_map"),
            size: wgpu::Extent3d {
                width: map.width().max(1),
                height: map.height().max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: map.levels.len().max(1) as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(&texels),
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let uniform = EnvUniform {
        enabled: if enabled { 1.0 } else { 0.0 },
        max_lod: map.max_lod(),
        intensity: 1.0,
        _pad: 0.0,
    };
    let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("env_uniform_buffer"),
        contents: bytemuck::bytes_of(&uniform),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("env_map_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uniform_buffer.as_entire_binding(),
            },
        ],
    });
    GpuEnvironment { texture, bind_group }
}

fn linear_to_srgb(c: [f32; 3]) -> [f32; 3] {
    c.map(|v| {
        if v <= 0.0031308 {
            v * 12.92
        } else {
            1.055 * v.powf(1.0 / 2.4) - 0.055
        }
    })
}
