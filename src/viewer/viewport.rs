//! 3D Viewport widget for egui

use egui::{Response, Sense, Ui, Vec2};

use super::renderer::{FrameCamera, Renderer};
use crate::controller::Viewer;

/// Offscreen target shown as an egui image
pub struct Viewport {
    texture_id: Option<egui::TextureId>,
    render_texture: Option<RenderTexture>,
    last_size: Vec2,
}

struct RenderTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl Viewport {
    pub fn new() -> Self {
        Self {
            texture_id: None,
            render_texture: None,
            last_size: Vec2::ZERO,
        }
    }

    /// Show viewport UI, handle camera input and render one frame
    pub fn show(
        &mut self,
        ui: &mut Ui,
        render_state: &egui_wgpu::RenderState,
        viewer: &mut Viewer<Renderer>,
    ) -> Response {
        let _span = tracing::trace_span!("viewport_show").entered();
        let available = ui.available_size();
        let size = Vec2::new(available.x.max(64.0), available.y.max(64.0));
        let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());

        if size != self.last_size {
            viewer.resize(size.x, size.y);
            self.last_size = size;
        }

        self.handle_input(ui, &response, viewer);
        viewer.tick(ui.input(|i| i.stable_dt));

        let (width, height) = (size.x as u32, size.y as u32);
        self.ensure_render_texture(render_state, width, height);

        let camera = viewer.camera();
        let frame = FrameCamera {
            view_proj: camera.view_proj_matrix(),
            sky_view_proj: camera.sky_view_proj_matrix(),
            position: camera.position(),
        };
        if let Some(rt) = &self.render_texture {
            viewer.backend_mut().render(&rt.view, width, height, &frame);
        }

        if let Some(tex_id) = self.texture_id {
            ui.painter().image(
                tex_id,
                rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        response
    }

    fn ensure_render_texture(&mut self, render_state: &egui_wgpu::RenderState, width: u32, height: u32) {
        if self.render_texture.as_ref().is_some_and(|rt| rt.size == (width, height)) {
            return;
        }

        let device = &render_state.device;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("viewport_render_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: render_state.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Register with egui
        let tex_id = render_state
            .renderer
            .write()
            .register_native_texture(device, &view, wgpu::FilterMode::Linear);

        if let Some(old_id) = self.texture_id.take() {
            render_state.renderer.write().free_texture(&old_id);
        }

        self.texture_id = Some(tex_id);
        self.render_texture = Some(RenderTexture {
            texture,
            view,
            size: (width, height),
        });
    }

    fn handle_input(&mut self, ui: &Ui, response: &Response, viewer: &mut Viewer<Renderer>) {
        let camera = viewer.camera_mut();

        // Orbit with left mouse drag
        if response.dragged_by(egui::PointerButton::Primary) {
            let delta = response.drag_delta();
            camera.orbit(delta.x, delta.y);
        }

        // Pan with middle mouse drag
        if response.dragged_by(egui::PointerButton::Middle) {
            let delta = response.drag_delta();
            camera.pan(delta.x, delta.y);
        }

        // Zoom with right mouse drag
        if response.dragged_by(egui::PointerButton::Secondary) {
            let delta = response.drag_delta();
            camera.zoom(-delta.y * 2.0);
        }

        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll.abs() > 0.0 {
                camera.zoom(scroll);
            }
        }

        if response.clicked() {
            response.request_focus();
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}
