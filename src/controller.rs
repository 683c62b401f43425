//! The viewer controller: owns the displayed subtree, environment state,
//! camera and status, and exposes every user-facing operation.
//!
//! All methods run on one thread. Blocking work (asset and panorama
//! decoding) is handed out as tickets; results come back through
//! [`Viewer::finish_load`] and [`Viewer::finish_environment`].

use glam::Vec3;

use crate::backend::RenderBackend;
use crate::camera::OrbitCamera;
use crate::config::ViewerConfig;
use crate::environment::{EnvironmentManager, EnvironmentOutcome, EnvironmentRequest, EnvironmentTicket, MAX_INTENSITY};
use crate::error::{EnvironmentError, LoadError};
use crate::framing::frame_subtree;
use crate::lifecycle;
use crate::loader::{self, AssetSource, DecoderCaps, LoadOrigin, LoadedAsset};
use crate::prefilter::ReflectionMap;
use crate::scene::{SceneStats, Subtree};

/// Work order for loading one asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    /// Results tagged with an older epoch are discarded
    pub epoch: u64,
    pub source: AssetSource,
    pub origin: LoadOrigin,
}

/// Byte counters of the load in progress
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl LoadProgress {
    /// Completed fraction in `0..=1`, if the total is known
    pub fn fraction(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.loaded as f64 / total as f64).min(1.0) as f32),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PendingLoad {
    epoch: u64,
    origin: LoadOrigin,
    label: String,
}

pub struct Viewer<B: RenderBackend> {
    backend: B,
    config: ViewerConfig,
    caps: DecoderCaps,
    subtree: Option<Subtree>,
    stats: Option<SceneStats>,
    environments: EnvironmentManager,
    camera: OrbitCamera,
    intensity: f32,
    status: String,
    progress: Option<LoadProgress>,
    pending: Option<PendingLoad>,
    load_epoch: u64,
}

impl<B: RenderBackend> Viewer<B> {
    pub fn new(mut backend: B, config: ViewerConfig, caps: DecoderCaps) -> Self {
        let config = config.validated();
        let environments = EnvironmentManager::new(
            config.presets.clone(),
            config.background_linear(),
            config.show_background,
        );
        environments.initialize(&mut backend);
        let camera = OrbitCamera::new(
            Vec3::new(2.5, 1.5, 3.0),
            Vec3::ZERO,
            config.fov_degrees,
            config.camera_damping,
        );

        Self {
            backend,
            intensity: config.env_intensity,
            config,
            caps,
            subtree: None,
            stats: None,
            environments,
            camera,
            status: "Ready".into(),
            progress: None,
            pending: None,
            load_epoch: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn caps(&self) -> &DecoderCaps {
        &self.caps
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn environments(&self) -> &EnvironmentManager {
        &self.environments
    }

    pub fn subtree(&self) -> Option<&Subtree> {
        self.subtree.as_ref()
    }

    pub fn stats(&self) -> Option<SceneStats> {
        self.stats
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Progress of the current load, `None` when idle
    pub fn progress(&self) -> Option<LoadProgress> {
        self.progress
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    // ---- Asset loading ----

    /// Start replacing the displayed model.
    ///
    /// The current subtree is disposed right away; the returned ticket is
    /// decoded elsewhere and handed back to [`Viewer::finish_load`].
    pub fn begin_load(&mut self, source: AssetSource, origin: LoadOrigin) -> LoadTicket {
        self.clear_scene();
        self.load_epoch += 1;
        let label = source.label();
        tracing::info!(epoch = self.load_epoch, "Loading {}", label);
        self.status = format!("Loading {}...", label);
        self.progress = Some(LoadProgress::default());
        self.pending = Some(PendingLoad {
            epoch: self.load_epoch,
            origin,
            label,
        });
        LoadTicket {
            epoch: self.load_epoch,
            source,
            origin,
        }
    }

    /// Byte progress of the load tagged `epoch`
    pub fn report_progress(&mut self, epoch: u64, loaded: u64, total: Option<u64>) {
        let Some(pending) = self.pending.as_ref().filter(|p| p.epoch == epoch) else {
            return;
        };
        let progress = LoadProgress { loaded, total };
        self.status = match progress.fraction() {
            Some(f) => format!("Loading {}: {:.0}%", pending.label, f * 100.0),
            None => format!("Loading {}: {} KB", pending.label, loaded / 1024),
        };
        self.progress = Some(progress);
    }

    /// Install (or report) the outcome of the load tagged `epoch`.
    /// Returns `false` when a newer load has superseded it.
    pub fn finish_load(&mut self, epoch: u64, result: Result<LoadedAsset, LoadError>) -> bool {
        let Some(pending) = self.pending.take_if(|p| p.epoch == epoch) else {
            tracing::debug!(epoch, "discarding superseded load result");
            return false;
        };
        self.progress = None;

        match result {
            Ok(asset) => {
                let LoadedAsset { mut subtree, stats, .. } = asset;
                let draws = lifecycle::install(&mut subtree, &mut self.backend);
                self.backend.set_draw_list(draws);
                self.subtree = Some(subtree);
                self.stats = Some(stats);
                self.reframe();
                self.apply_intensity();
                self.status = format!("Loaded {}: {}", pending.label, stats);
            }
            Err(e) if pending.origin == LoadOrigin::Default => {
                tracing::info!("default model unavailable: {}", e);
                self.status = format!(
                    "Place your model at {} or pass --model <path|url>",
                    self.config.default_model.display()
                );
            }
            Err(e) => {
                tracing::error!("Failed to load {}: {}", pending.label, e);
                self.status = format!("Error: {}", e);
            }
        }
        true
    }

    /// Load on the calling thread
    pub fn load_blocking(&mut self, source: AssetSource, origin: LoadOrigin) -> bool {
        let ticket = self.begin_load(source, origin);
        let mut last = LoadProgress::default();
        let result = loader::load(&ticket.source, &self.caps, &mut |loaded, total| {
            last = LoadProgress { loaded, total };
        });
        self.report_progress(ticket.epoch, last.loaded, last.total);
        self.finish_load(ticket.epoch, result)
    }

    /// Dispose the displayed subtree and clear the draw list
    pub fn clear_scene(&mut self) {
        if let Some(mut old) = self.subtree.take() {
            let released = lifecycle::dispose(&mut old, &mut self.backend);
            tracing::debug!("released {} resources of {}", released.total(), old.name);
        }
        self.stats = None;
        self.backend.set_draw_list(Vec::new());
    }

    // ---- Environment ----

    /// Switch the lighting preset. A returned ticket must be decoded and
    /// passed to [`Viewer::finish_environment`].
    pub fn set_environment(&mut self, name: &str) -> Option<EnvironmentTicket> {
        match self.environments.set_environment(name, &mut self.backend) {
            Ok(EnvironmentRequest::Decode(ticket)) => {
                self.status = format!("Loading environment {}...", name);
                Some(ticket)
            }
            Ok(EnvironmentRequest::Applied | EnvironmentRequest::Cleared) => {
                self.apply_intensity();
                None
            }
            Ok(EnvironmentRequest::Unchanged | EnvironmentRequest::Pending) => None,
            Err(e) => {
                tracing::warn!("{}", e);
                self.status = format!("Error: {}", e);
                None
            }
        }
    }

    pub fn finish_environment(&mut self, ticket: &EnvironmentTicket, result: Result<ReflectionMap, EnvironmentError>) {
        match self.environments.finish(ticket, result, &mut self.backend) {
            Ok(EnvironmentOutcome::Applied) => {
                self.apply_intensity();
                if self.status.starts_with("Loading environment") {
                    self.status = format!("Environment: {}", ticket.preset);
                }
            }
            Ok(EnvironmentOutcome::Superseded) => {}
            Err(e) => {
                tracing::error!("environment '{}': {}", ticket.preset, e);
                self.status = format!("HDR load error: {}", e);
            }
        }
    }

    /// Switch and decode on the calling thread
    pub fn set_environment_blocking(&mut self, name: &str) {
        if let Some(ticket) = self.set_environment(name) {
            let result = ticket.decode(&self.config.prefilter);
            self.finish_environment(&ticket, result);
        }
    }

    pub fn set_show_background(&mut self, show: bool) {
        self.environments.set_show_background(show, &mut self.backend);
    }

    /// Set the image-based lighting scale on every material that has one
    pub fn set_intensity(&mut self, intensity: f32) {
        let intensity = if intensity.is_finite() { intensity.clamp(0.0, MAX_INTENSITY) } else { 1.0 };
        if intensity != self.intensity {
            self.intensity = intensity;
            self.apply_intensity();
        }
    }

    fn apply_intensity(&mut self) {
        let Some(subtree) = self.subtree.as_mut() else { return };
        let mut updated = 0;
        for slot in &mut subtree.materials {
            if slot.material.set_env_intensity(self.intensity) {
                if let Some(handle) = slot.gpu {
                    self.backend.update_material(handle, &slot.material);
                    updated += 1;
                }
            }
        }
        tracing::trace!(updated, intensity = self.intensity, "environment intensity applied");
    }

    // ---- Camera / viewport ----

    pub fn resize(&mut self, width: f32, height: f32) {
        self.camera.set_aspect(width, height);
    }

    /// Advance camera smoothing by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.camera.update(dt);
    }

    /// Frame the current subtree; `false` if there is nothing to frame
    pub fn reframe(&mut self) -> bool {
        let framing = self.subtree.as_ref().and_then(|s| {
            frame_subtree(s, self.camera.fov, self.camera.aspect, self.config.framing_padding)
        });
        match framing {
            Some(f) => {
                tracing::debug!(distance = f.distance, "camera framed");
                self.camera.apply_framing(&f);
                true
            }
            None => false,
        }
    }

    pub fn reset_camera(&mut self) {
        self.camera.reset();
    }
}
