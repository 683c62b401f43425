//! Read-only viewer configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::prefilter::PrefilterSettings;

/// Name of the preset that disables image-based lighting
pub const NO_ENVIRONMENT: &str = "none";

/// One entry of the environment preset table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub name: String,
    /// Equirectangular `.hdr` / `.exr` panorama; `None` means ambient-only
    pub path: Option<PathBuf>,
}

impl PresetConfig {
    pub fn new(name: &str, path: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            path: path.map(PathBuf::from),
        }
    }
}

/// Viewer configuration, loaded once at startup and never written back
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    // Environment
    pub presets: Vec<PresetConfig>,
    pub initial_environment: String,
    pub show_background: bool,
    pub env_intensity: f32,
    pub prefilter: PrefilterSettings,

    // Scene
    pub default_model: PathBuf,
    /// sRGB background color used when no panorama is shown
    pub background_color: [u8; 3],

    // Camera
    pub fov_degrees: f32,
    pub framing_padding: f32,
    /// Orbit smoothing in seconds, 0 disables
    pub camera_damping: f32,

    // Window
    pub window_width: f32,
    pub window_height: f32,
    /// Repaint ticker interval in milliseconds
    pub frame_interval_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            presets: vec![
                PresetConfig::new(NO_ENVIRONMENT, None),
                PresetConfig::new("studio", Some("assets/studio1.hdr")),
                PresetConfig::new("sunset", Some("assets/studio2.hdr")),
                PresetConfig::new("neutral", Some("assets/studio3.hdr")),
            ],
            initial_environment: "studio".into(),
            show_background: true,
            env_intensity: 1.0,
            prefilter: PrefilterSettings::default(),
            default_model: PathBuf::from("assets/model.glb"),
            background_color: [0x0b, 0x0f, 0x14],
            fov_degrees: 50.0,
            framing_padding: crate::framing::DEFAULT_PADDING,
            camera_damping: 0.15,
            window_width: 1280.0,
            window_height: 720.0,
            frame_interval_ms: 16,
        }
    }
}

impl ViewerConfig {
    /// Read a JSON config; missing fields take defaults, relative preset
    /// paths resolve against the file's directory. Values are not clamped
    /// here: [`ViewerConfig::validated`] runs once logging is up.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: ViewerConfig = serde_json::from_str(&text)?;
        if let Some(dir) = path.parent() {
            for preset in &mut config.presets {
                if let Some(p) = preset.path.as_mut() {
                    if p.is_relative() {
                        *p = dir.join(&*p);
                    }
                }
            }
            if config.default_model.is_relative() {
                config.default_model = dir.join(&config.default_model);
            }
        }
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Clamp out-of-range values to defaults, warning about each
    pub fn validated(mut self) -> Self {
        let defaults = ViewerConfig::default();

        if !self.presets.iter().any(|p| p.name == NO_ENVIRONMENT) {
            tracing::warn!("preset table lacks '{}', adding it", NO_ENVIRONMENT);
            self.presets.insert(0, PresetConfig::new(NO_ENVIRONMENT, None));
        }
        let mut seen = std::collections::HashSet::new();
        self.presets.retain(|p| {
            let first = seen.insert(p.name.clone());
            if !first {
                tracing::warn!("duplicate preset '{}' ignored", p.name);
            }
            first
        });
        if !self.presets.iter().any(|p| p.name == self.initial_environment) {
            tracing::warn!(
                "initial environment '{}' is not a preset, using '{}'",
                self.initial_environment,
                NO_ENVIRONMENT
            );
            self.initial_environment = NO_ENVIRONMENT.into();
        }
        if !(self.framing_padding > 1.0 && self.framing_padding.is_finite()) {
            tracing::warn!("framing_padding {} must exceed 1.0", self.framing_padding);
            self.framing_padding = defaults.framing_padding;
        }
        if !(1.0..=179.0).contains(&self.fov_degrees) {
            tracing::warn!("fov_degrees {} out of range", self.fov_degrees);
            self.fov_degrees = defaults.fov_degrees;
        }
        if !(self.camera_damping >= 0.0 && self.camera_damping.is_finite()) {
            tracing::warn!("camera_damping {} must be >= 0", self.camera_damping);
            self.camera_damping = defaults.camera_damping;
        }
        if !(0.0..=crate::environment::MAX_INTENSITY).contains(&self.env_intensity) {
            tracing::warn!("env_intensity {} out of range", self.env_intensity);
            self.env_intensity = self.env_intensity.clamp(0.0, crate::environment::MAX_INTENSITY);
            if self.env_intensity.is_nan() {
                self.env_intensity = defaults.env_intensity;
            }
        }
        if self.window_width < 200.0 || self.window_height < 150.0 {
            tracing::warn!("window size too small, using defaults");
            self.window_width = defaults.window_width;
            self.window_height = defaults.window_height;
        }
        if self.frame_interval_ms == 0 {
            self.frame_interval_ms = defaults.frame_interval_ms;
        }
        self.prefilter = self.prefilter.validated();
        self
    }

    /// Background color as linear RGB
    pub fn background_linear(&self) -> [f32; 3] {
        self.background_color.map(srgb_to_linear)
    }
}

/// sRGB 8-bit channel to linear float
pub fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
