//! Main application state and UI

use std::sync::Arc;
use std::time::Duration;

use egui::{CentralPanel, Color32, RichText, SidePanel, TopBottomPanel};

use super::renderer::Renderer;
use super::viewport::Viewport;
use super::LaunchOptions;
use crate::controller::Viewer;
use crate::environment::MAX_INTENSITY;
use crate::loader::{AssetSource, DecoderCaps, LoadOrigin};
use crate::render_loop::RenderLoop;
use crate::worker::{self, WorkerHandle};

/// Main viewer application
pub struct ViewerApp {
    viewer: Viewer<Renderer>,
    viewport: Viewport,
    render_state: egui_wgpu::RenderState,
    asset_worker: WorkerHandle,
    env_worker: WorkerHandle,
    render_loop: RenderLoop,
    preset_names: Vec<String>,
    _trace_guard: Option<tracing_chrome::FlushGuard>,
}

impl ViewerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        options: LaunchOptions,
        trace_guard: Option<tracing_chrome::FlushGuard>,
    ) -> anyhow::Result<Self> {
        let render_state = cc
            .wgpu_render_state
            .clone()
            .ok_or_else(|| anyhow::anyhow!("wgpu renderer unavailable"))?;

        let caps = decoder_caps(render_state.device.features());
        tracing::info!(?caps, "decoder capabilities");

        let renderer = Renderer::new(
            render_state.device.clone(),
            render_state.queue.clone(),
            render_state.target_format,
        );
        let LaunchOptions {
            config,
            model,
            environment,
        } = options;
        let interval = Duration::from_millis(config.frame_interval_ms);
        let prefilter = config.prefilter;
        let initial_environment = environment.unwrap_or_else(|| config.initial_environment.clone());
        let mut viewer = Viewer::new(renderer, config, caps);
        let preset_names = viewer.environments().preset_names().map(str::to_string).collect();

        let ctx = cc.egui_ctx.clone();
        let waker: worker::Waker = Arc::new(move || ctx.request_repaint());
        let asset_worker = WorkerHandle::spawn("asset-loader", caps, prefilter, Some(waker.clone()));
        let env_worker = WorkerHandle::spawn("environment-decoder", caps, prefilter, Some(waker));

        // Keep damping animating between input events
        let ctx = cc.egui_ctx.clone();
        let render_loop = RenderLoop::start(interval, move || ctx.request_repaint());

        if let Some(ticket) = viewer.set_environment(&initial_environment) {
            worker::queue_environment(&env_worker, &mut viewer, ticket);
        }
        let (source, origin) = match model {
            Some(m) => (AssetSource::parse(&m), LoadOrigin::Explicit),
            None => (
                AssetSource::Path(viewer.config().default_model.clone()),
                LoadOrigin::Default,
            ),
        };
        let ticket = viewer.begin_load(source, origin);
        worker::queue_load(&asset_worker, &mut viewer, ticket);

        Ok(Self {
            viewer,
            viewport: Viewport::new(),
            render_state,
            asset_worker,
            env_worker,
            render_loop,
            preset_names,
            _trace_guard: trace_guard,
        })
    }

    fn load(&mut self, source: AssetSource, origin: LoadOrigin) {
        let ticket = self.viewer.begin_load(source, origin);
        worker::queue_load(&self.asset_worker, &mut self.viewer, ticket);
    }

    fn load_default(&mut self) {
        let path = self.viewer.config().default_model.clone();
        self.load(AssetSource::Path(path), LoadOrigin::Default);
    }

    fn set_environment(&mut self, name: &str) {
        if let Some(ticket) = self.viewer.set_environment(name) {
            worker::queue_environment(&self.env_worker, &mut self.viewer, ticket);
        }
    }

    fn open_file_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("glTF", &["glb", "gltf"])
            .pick_file()
        {
            self.load(AssetSource::Path(path), LoadOrigin::Explicit);
        }
    }

    fn process_worker_results(&mut self) {
        let _span = tracing::trace_span!("process_worker_results").entered();
        while let Some(result) = self.asset_worker.try_recv() {
            worker::deliver(&mut self.viewer, result);
        }
        while let Some(result) = self.env_worker.try_recv() {
            worker::deliver(&mut self.viewer, result);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        // One model at a time; the last drop wins
        let Some(file) = dropped.into_iter().last() else {
            return;
        };
        let source = match (file.path, file.bytes) {
            (Some(path), _) => AssetSource::Path(path),
            (None, Some(bytes)) => AssetSource::Bytes {
                name: file.name,
                bytes: bytes.to_vec(),
            },
            (None, None) => return,
        };
        self.load(source, LoadOrigin::Explicit);
    }

    fn drop_overlay(&self, ctx: &egui::Context) {
        if ctx.input(|i| i.raw.hovered_files.is_empty()) {
            return;
        }
        let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::Foreground, egui::Id::new("drop_overlay")));
        let rect = ctx.screen_rect();
        painter.rect_filled(rect, 0.0, Color32::from_black_alpha(160));
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            "Drop a .glb / .gltf file to load it",
            egui::FontId::proportional(24.0),
            Color32::WHITE,
        );
    }

    fn side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Model");
        ui.separator();

        match (self.viewer.subtree(), self.viewer.stats()) {
            (Some(subtree), Some(stats)) => {
                ui.label(format!("File: {}", subtree.name));
                ui.label(format!("Meshes: {}", stats.meshes));
                ui.label(format!("Vertices: {}", stats.vertices));
                ui.label(format!("Triangles: {}", stats.triangles));
                ui.label(format!("Materials: {}", stats.materials));
                ui.label(format!("Textures: {}", stats.textures));
            }
            _ => {
                ui.label("No model loaded");
            }
        }

        ui.horizontal(|ui| {
            if ui.button("Open...").clicked() {
                self.open_file_dialog();
            }
            if ui.button("Load default").clicked() {
                self.load_default();
            }
        });

        ui.separator();
        ui.label(RichText::new("Environment").strong());

        let mut selected = self.viewer.environments().requested().to_string();
        egui::ComboBox::from_id_salt("environment_preset")
            .selected_text(&selected)
            .show_ui(ui, |ui| {
                for name in &self.preset_names {
                    ui.selectable_value(&mut selected, name.clone(), name);
                }
            });
        if selected != self.viewer.environments().requested() {
            self.set_environment(&selected);
        }
        if self.viewer.environments().is_loading() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Decoding...");
            });
        }

        let mut show_background = self.viewer.environments().show_background();
        if ui.checkbox(&mut show_background, "Show background").changed() {
            self.viewer.set_show_background(show_background);
        }

        let mut intensity = self.viewer.intensity();
        if ui
            .add(egui::Slider::new(&mut intensity, 0.0..=MAX_INTENSITY).step_by(0.05).text("Intensity"))
            .changed()
        {
            self.viewer.set_intensity(intensity);
        }

        ui.separator();
        ui.label(RichText::new("Camera").strong());
        let pos = self.viewer.camera().position();
        ui.label(format!("Position: ({:.2}, {:.2}, {:.2})", pos.x, pos.y, pos.z));
        ui.label(format!("Distance: {:.2}", self.viewer.camera().distance()));
        ui.horizontal(|ui| {
            if ui.button("Frame (F)").clicked() {
                self.viewer.reframe();
            }
            if ui.button("Reset (H)").clicked() {
                self.viewer.reset_camera();
            }
        });
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let status = self.viewer.status();
            let color = if status.starts_with("Error") || status.starts_with("HDR load error") {
                Color32::from_rgb(230, 110, 100)
            } else {
                ui.visuals().text_color()
            };
            ui.label(RichText::new(status).color(color));

            if let Some(progress) = self.viewer.progress() {
                let bar = match progress.fraction() {
                    Some(f) => egui::ProgressBar::new(f).show_percentage(),
                    None => egui::ProgressBar::new(0.0).animate(true),
                };
                ui.add(bar.desired_width(160.0));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("FPS: {:.0}", ui.ctx().input(|i| 1.0 / i.stable_dt)));
            });
        });
    }
}

/// Texture decoders usable with the device's features
pub fn decoder_caps(features: wgpu::Features) -> DecoderCaps {
    DecoderCaps {
        bc: features.contains(wgpu::Features::TEXTURE_COMPRESSION_BC),
        etc2: features.contains(wgpu::Features::TEXTURE_COMPRESSION_ETC2),
        astc: features.contains(wgpu::Features::TEXTURE_COMPRESSION_ASTC),
        ..DecoderCaps::software()
    }
}

impl eframe::App for ViewerApp {
    fn on_exit(&mut self) {
        self.render_loop.stop();
        self.asset_worker.stop();
        self.env_worker.stop();
        self.viewer.clear_scene();
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let _span = tracing::trace_span!("viewer_update").entered();

        self.process_worker_results();
        self.handle_dropped_files(ctx);

        let typing = ctx.wants_keyboard_input();
        // H = Home camera (back to the last framed view)
        if !typing && ctx.input(|i| i.key_pressed(egui::Key::H)) {
            self.viewer.reset_camera();
        }
        // F = Fit view
        if !typing && ctx.input(|i| i.key_pressed(egui::Key::F)) {
            self.viewer.reframe();
        }

        TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.status_bar(ui);
        });

        SidePanel::right("side_panel")
            .default_width(220.0)
            .min_width(160.0)
            .resizable(true)
            .show(ctx, |ui| {
                self.side_panel(ui);
            });

        CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.viewport.show(ui, &self.render_state, &mut self.viewer);
            });

        self.drop_overlay(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_caps_from_features() {
        let caps = decoder_caps(wgpu::Features::TEXTURE_COMPRESSION_BC);
        assert!(caps.bc);
        assert!(!caps.etc2);
        assert!(!caps.astc);
        assert!(caps.meshopt && caps.ktx2);

        let none = decoder_caps(wgpu::Features::empty());
        assert_eq!(none, DecoderCaps::software());
    }
}
