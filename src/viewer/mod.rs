//! Interactive window: egui shell, wgpu renderer and input handling

mod app;
mod renderer;
mod viewport;

pub use app::decoder_caps;
pub use renderer::{material_params, FrameCamera, Renderer};

use anyhow::Result;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::ViewerConfig;

/// What to show when the window opens
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub config: ViewerConfig,
    /// Path or URL; `None` tries the configured default model
    pub model: Option<String>,
    /// Preset overriding `config.initial_environment`
    pub environment: Option<String>,
}

/// Open the viewer window and block until it closes
pub fn run(options: LaunchOptions) -> Result<()> {
    // wgpu and eframe log through `log`
    env_logger::init();

    let trace_guard = init_tracing();
    // Clamping warnings need a subscriber
    let options = LaunchOptions {
        config: options.config.validated(),
        ..options
    };

    // Friendly panic handler for GPU errors
    std::panic::set_hook(Box::new(|info| {
        let msg = info
            .payload()
            .downcast_ref::<String>()
            .map(|s| s.as_str())
            .or_else(|| info.payload().downcast_ref::<&str>().copied())
            .unwrap_or("Unknown error");

        if msg.contains("wgpu") || msg.contains("Buffer") || msg.contains("shader") {
            eprintln!("\n[GPU Error] {}", msg);
            eprintln!("\nThis is likely a driver or feature mismatch. Try updating your GPU drivers.");
        } else {
            eprintln!("\n[Error] {}", msg);
            if let Some(loc) = info.location() {
                eprintln!("  at {}:{}:{}", loc.file(), loc.line(), loc.column());
            }
        }
    }));

    let title = format!("Model Viewer {}", env!("CARGO_PKG_VERSION"));
    let options_window = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([options.config.window_width, options.config.window_height])
            .with_title(&title)
            .with_drag_and_drop(true),
        renderer: eframe::Renderer::Wgpu,
        wgpu_options: egui_wgpu::WgpuConfiguration {
            wgpu_setup: egui_wgpu::WgpuSetup::CreateNew(egui_wgpu::WgpuSetupCreateNew {
                device_descriptor: std::sync::Arc::new(|adapter| {
                    let base_limits = if adapter.get_info().backend == wgpu::Backend::Gl {
                        wgpu::Limits::downlevel_webgl2_defaults()
                    } else {
                        wgpu::Limits::default()
                    };
                    // Request only the block-compression families the adapter has
                    let compression = adapter.features()
                        & (wgpu::Features::TEXTURE_COMPRESSION_BC
                            | wgpu::Features::TEXTURE_COMPRESSION_ETC2
                            | wgpu::Features::TEXTURE_COMPRESSION_ASTC);
                    wgpu::DeviceDescriptor {
                        label: Some("model-viewer device"),
                        required_features: compression,
                        required_limits: wgpu::Limits {
                            max_texture_dimension_2d: 8192,
                            ..base_limits
                        },
                        ..Default::default()
                    }
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options_window,
        Box::new(move |cc| {
            let app = app::ViewerApp::new(cc, options, trace_guard)?;
            Ok(Box::new(app))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run: {}", e))
}

/// Install the global subscriber: `RUST_LOG`-style filter on stderr, plus a
/// Chrome trace file when `MODEL_VIEWER_TRACE=1`.
fn init_tracing() -> Option<tracing_chrome::FlushGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("model_viewer=info"));
    let fmt = tracing_subscriber::fmt::layer().with_target(false);

    if std::env::var("MODEL_VIEWER_TRACE").ok().as_deref() == Some("1") {
        let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
            .file("trace.json")
            .build();
        let subscriber = tracing_subscriber::registry().with(filter).with(fmt).with(chrome_layer);
        return tracing::subscriber::set_global_default(subscriber).ok().map(|_| guard);
    }

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt);
    let _ = tracing::subscriber::set_global_default(subscriber);
    None
}
