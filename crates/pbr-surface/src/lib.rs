//! glTF metallic-roughness surface shader for wgpu
//!
//! Image-based lighting samples a prefiltered equirectangular reflection map:
//! mip level `roughness * max_lod` for specular, the roughest level for
//! diffuse, combined through an analytic environment BRDF. A hemisphere
//! ambient light is always applied on top.
//!
//! ## Bind groups
//!
//! | group | contents                                     |
//! |-------|----------------------------------------------|
//! | 0     | camera (0), hemisphere light (1)             |
//! | 1     | material uniform, sampler, five textures     |
//! | 2     | model transform                              |
//! | 3     | reflection map, sampler, environment params  |
//!
//! ## Usage
//!
//! ```ignore
//! use pbr_surface::{create_bind_group_layouts, create_pipeline, PipelineConfig};
//!
//! let layouts = create_bind_group_layouts(&device);
//! let pipeline = create_pipeline(&device, &layouts, &PipelineConfig {
//!     format: surface_format,
//!     ..Default::default()
//! });
//! ```

mod params;

pub use params::{CameraUniform, EnvUniform, HemisphereLight, ModelUniform, PbrParams};

/// Shared WGSL prelude (camera block, tone mapping, equirect lookup)
pub const COMMON_SOURCE: &str = include_str!("shaders/common.wgsl");

/// Surface shader body; compile with [`surface_shader_source`]
pub const SURFACE_SOURCE: &str = include_str!("shaders/surface.wgsl");

/// Skybox shader body; compile with [`skybox_shader_source`]
pub const SKYBOX_SOURCE: &str = include_str!("shaders/skybox.wgsl");

/// Number of texture slots in the material bind group
pub const MATERIAL_TEXTURE_SLOTS: usize = 5;

/// Full surface shader module source
pub fn surface_shader_source() -> String {
    format!("{}\n{}", COMMON_SOURCE, SURFACE_SOURCE)
}

/// Full skybox shader module source
pub fn skybox_shader_source() -> String {
    format!("{}\n{}", COMMON_SOURCE, SKYBOX_SOURCE)
}

/// Vertex buffer layout for surface meshes
pub fn vertex_buffer_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // normal
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    }
}

/// Interleaved surface vertex
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, size: Option<u64>) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: size.and_then(std::num::NonZeroU64::new),
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Create bind group layouts for the surface and skybox pipelines
pub fn create_bind_group_layouts(device: &wgpu::Device) -> BindGroupLayouts {
    let camera_size = std::mem::size_of::<CameraUniform>() as u64;
    let light_size = std::mem::size_of::<HemisphereLight>() as u64;

    // Group 0: Camera + Light
    let camera_light = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pbr_surface_camera_light"),
        entries: &[
            uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT, Some(camera_size)),
            uniform_entry(1, wgpu::ShaderStages::FRAGMENT, Some(light_size)),
        ],
    });

    // Group 1: Material
    let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pbr_surface_material"),
        entries: &[
            uniform_entry(0, wgpu::ShaderStages::FRAGMENT, Some(std::mem::size_of::<PbrParams>() as u64)),
            sampler_entry(1),
            texture_entry(2), // base color
            texture_entry(3), // metallic-roughness
            texture_entry(4), // normal
            texture_entry(5), // occlusion
            texture_entry(6), // emissive
        ],
    });

    // Group 2: Model transform
    let model = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pbr_surface_model"),
        entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX, None)],
    });

    // Group 3: Environment map
    let environment = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pbr_surface_environment"),
        entries: &[
            texture_entry(0),
            sampler_entry(1),
            uniform_entry(2, wgpu::ShaderStages::FRAGMENT, None),
        ],
    });

    BindGroupLayouts {
        camera_light,
        material,
        model,
        environment,
    }
}

/// Bind group layouts for the surface shader
pub struct BindGroupLayouts {
    /// Group 0: Camera + Light uniforms
    pub camera_light: wgpu::BindGroupLayout,
    /// Group 1: Material parameters and textures
    pub material: wgpu::BindGroupLayout,
    /// Group 2: Model transform
    pub model: wgpu::BindGroupLayout,
    /// Group 3: Reflection map (group 1 in the skybox pipeline)
    pub environment: wgpu::BindGroupLayout,
}

/// Pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Debug label for the pipeline (defaults to "pbr_surface_pipeline")
    pub label: Option<&'static str>,
    /// Color target format
    pub format: wgpu::TextureFormat,
    /// Depth texture format
    pub depth_format: wgpu::TextureFormat,
    /// Enable alpha blending
    pub blend: bool,
    /// Cull mode (None for double-sided materials)
    pub cull_mode: Option<wgpu::Face>,
    /// Write to depth buffer (disable for transparency)
    pub depth_write: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label: None,
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
            depth_format: wgpu::TextureFormat::Depth32Float,
            blend: false,
            cull_mode: Some(wgpu::Face::Back),
            depth_write: true,
        }
    }
}

/// Create the surface render pipeline
pub fn create_pipeline(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    config: &PipelineConfig,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("pbr_surface_shader"),
        source: wgpu::ShaderSource::Wgsl(surface_shader_source().into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("pbr_surface_pipeline_layout"),
        bind_group_layouts: &[
            &layouts.camera_light,
            &layouts.material,
            &layouts.model,
            &layouts.environment,
        ],
        push_constant_ranges: &[],
    });

    let blend_state = if config.blend {
        Some(wgpu::BlendState::ALPHA_BLENDING)
    } else {
        Some(wgpu::BlendState::REPLACE)
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(config.label.unwrap_or("pbr_surface_pipeline")),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[vertex_buffer_layout()],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: config.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: config.depth_format,
            depth_write_enabled: config.depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: config.format,
                blend: blend_state,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

/// Simple vertex for skybox (position only)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkyboxVertex {
    pub position: [f32; 3],
}

/// Generate inverted sphere mesh for skybox
pub fn generate_sky_sphere(radius: f32, segments: u32, rings: u32) -> (Vec<SkyboxVertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = std::f32::consts::PI * ring as f32 / rings as f32;
        let y = radius * phi.cos();
        let r = radius * phi.sin();

        for seg in 0..=segments {
            let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
            vertices.push(SkyboxVertex { position: [r * theta.cos(), y, r * theta.sin()] });
        }
    }

    for ring in 0..rings {
        for seg in 0..segments {
            let curr = ring * (segments + 1) + seg;
            let next = curr + segments + 1;
            indices.extend_from_slice(&[curr, curr + 1, next, next, curr + 1, next + 1]);
        }
    }

    (vertices, indices)
}

/// Create skybox pipeline (renders the reflection map as background)
pub fn create_skybox_pipeline(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("skybox_shader"),
        source: wgpu::ShaderSource::Wgsl(skybox_shader_source().into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("skybox_pipeline_layout"),
        bind_group_layouts: &[&layouts.camera_light, &layouts.environment],
        push_constant_ranges: &[],
    });

    let skybox_vertex_layout = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<SkyboxVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("skybox_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_skybox"),
            compilation_options: Default::default(),
            buffers: &[skybox_vertex_layout],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // inside the sphere
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: wgpu::TextureFormat::Depth32Float,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual, // drawn at the far plane
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_skybox"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

/// Create a material bind group
///
/// `textures` order: base color, metallic-roughness, normal, occlusion, emissive.
pub fn create_material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    sampler: &wgpu::Sampler,
    textures: [&wgpu::TextureView; MATERIAL_TEXTURE_SLOTS],
) -> wgpu::BindGroup {
    let [base, mr, normal, occlusion, emissive] = textures;
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("material_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(base) },
            wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(mr) },
            wgpu::BindGroupEntry { binding: 4, resource: wgpu::BindingResource::TextureView(normal) },
            wgpu::BindGroupEntry { binding: 5, resource: wgpu::BindingResource::TextureView(occlusion) },
            wgpu::BindGroupEntry { binding: 6, resource: wgpu::BindingResource::TextureView(emissive) },
        ],
    })
}
