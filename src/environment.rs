//! Environment presets: decode tickets, cache and application.
//!
//! Decoding happens off the UI thread. [`EnvironmentManager::set_environment`]
//! hands out an [`EnvironmentTicket`] on a cache miss; the decoded map comes
//! back through [`EnvironmentManager::finish`]. Every request bumps a token,
//! and a completed decode is always cached but only applied when its preset
//! is still the latest request.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::backend::{Background, EnvironmentHandle, RenderBackend};
use crate::config::{PresetConfig, NO_ENVIRONMENT};
use crate::error::EnvironmentError;
use crate::prefilter::{self, PrefilterSettings, ReflectionMap};

/// Upper bound of the lighting intensity control
pub const MAX_INTENSITY: f32 = 2.0;

/// A computed environment: the prefiltered reflection map is both the
/// lighting source and, at its sharpest level, the background texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnvironmentEntry {
    pub handle: EnvironmentHandle,
    pub width: u32,
    pub height: u32,
    pub levels: usize,
}

/// Work order for decoding one preset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentTicket {
    pub preset: String,
    pub path: PathBuf,
    pub token: u64,
}

impl EnvironmentTicket {
    /// Decode and prefilter the panorama (blocking)
    pub fn decode(&self, settings: &PrefilterSettings) -> Result<ReflectionMap, EnvironmentError> {
        prefilter::load_reflection_map(&self.path, settings)
    }
}

/// Immediate result of a preset switch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvironmentRequest {
    /// Same preset as the current request
    Unchanged,
    /// `none`: lighting cleared, flat background
    Cleared,
    /// Served from the cache
    Applied,
    /// Cache miss; run the ticket and pass the result to `finish`
    Decode(EnvironmentTicket),
    /// A decode for this preset is already running
    Pending,
}

/// Result of a completed decode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentOutcome {
    /// Cached and now active
    Applied,
    /// Cached (or dropped on failure); a newer request owns the display
    Superseded,
}

pub struct EnvironmentManager {
    presets: Vec<PresetConfig>,
    cache: HashMap<String, EnvironmentEntry>,
    /// Preset most recently asked for
    requested: String,
    /// Preset whose lighting is in effect
    active: String,
    latest_token: u64,
    /// Preset -> newest token waiting on its decode
    in_flight: HashMap<String, u64>,
    show_background: bool,
    background_color: [f32; 3],
    decodes_issued: usize,
}

impl EnvironmentManager {
    pub fn new(presets: Vec<PresetConfig>, background_color: [f32; 3], show_background: bool) -> Self {
        Self {
            presets,
            cache: HashMap::new(),
            requested: NO_ENVIRONMENT.into(),
            active: NO_ENVIRONMENT.into(),
            latest_token: 0,
            in_flight: HashMap::new(),
            show_background,
            background_color,
            decodes_issued: 0,
        }
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.name.as_str())
    }

    pub fn requested(&self) -> &str {
        &self.requested
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn show_background(&self) -> bool {
        self.show_background
    }

    /// True while the requested preset is still decoding
    pub fn is_loading(&self) -> bool {
        self.in_flight.contains_key(&self.requested)
    }

    pub fn entry(&self, name: &str) -> Option<&EnvironmentEntry> {
        self.cache.get(name)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Tickets handed out so far
    pub fn decodes_issued(&self) -> usize {
        self.decodes_issued
    }

    /// Put the backend in the `none` state
    pub fn initialize<B: RenderBackend + ?Sized>(&self, backend: &mut B) {
        backend.set_lighting(None);
        backend.set_background(Background::Color(self.background_color));
    }

    /// Switch to preset `name`
    pub fn set_environment<B: RenderBackend + ?Sized>(
        &mut self,
        name: &str,
        backend: &mut B,
    ) -> Result<EnvironmentRequest, EnvironmentError> {
        if name == self.requested {
            return Ok(EnvironmentRequest::Unchanged);
        }
        let preset = self
            .presets
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| EnvironmentError::UnknownPreset(name.to_string()))?;
        let path = preset.path.clone();

        self.latest_token += 1;
        let token = self.latest_token;
        self.requested = name.to_string();

        let Some(path) = path else {
            self.initialize(backend);
            self.active = name.to_string();
            tracing::debug!("environment cleared");
            return Ok(EnvironmentRequest::Cleared);
        };

        if let Some(entry) = self.cache.get(name).copied() {
            self.apply(name, &entry, backend);
            return Ok(EnvironmentRequest::Applied);
        }

        if let Some(waiting) = self.in_flight.get_mut(name) {
            *waiting = token;
            return Ok(EnvironmentRequest::Pending);
        }

        self.in_flight.insert(name.to_string(), token);
        self.decodes_issued += 1;
        tracing::debug!(preset = name, token, "environment decode requested");
        Ok(EnvironmentRequest::Decode(EnvironmentTicket {
            preset: name.to_string(),
            path,
            token,
        }))
    }

    /// Accept a finished decode for `ticket`
    pub fn finish<B: RenderBackend + ?Sized>(
        &mut self,
        ticket: &EnvironmentTicket,
        result: Result<ReflectionMap, EnvironmentError>,
        backend: &mut B,
    ) -> Result<EnvironmentOutcome, EnvironmentError> {
        let newest = self.in_flight.remove(&ticket.preset).unwrap_or(ticket.token);
        let is_latest = newest == self.latest_token;

        let map = match result {
            Ok(map) => map,
            Err(e) if is_latest => {
                // Keep showing what was active; allow re-selecting the preset
                self.requested = self.active.clone();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("superseded environment '{}' failed: {}", ticket.preset, e);
                return Ok(EnvironmentOutcome::Superseded);
            }
        };

        let entry = match self.cache.get(&ticket.preset) {
            Some(entry) => *entry,
            None => {
                let entry = EnvironmentEntry {
                    handle: backend.create_environment(&map),
                    width: map.width(),
                    height: map.height(),
                    levels: map.levels.len(),
                };
                self.cache.insert(ticket.preset.clone(), entry);
                entry
            }
        };

        if is_latest {
            self.apply(&ticket.preset, &entry, backend);
            Ok(EnvironmentOutcome::Applied)
        } else {
            tracing::debug!(preset = %ticket.preset, "environment cached, superseded");
            Ok(EnvironmentOutcome::Superseded)
        }
    }

    /// Toggle the panorama background; takes effect immediately
    pub fn set_show_background<B: RenderBackend + ?Sized>(&mut self, show: bool, backend: &mut B) {
        self.show_background = show;
        backend.set_background(self.background_for(&self.active));
    }

    fn background_for(&self, name: &str) -> Background {
        match self.cache.get(name) {
            Some(entry) if self.show_background => Background::Environment(entry.handle),
            _ => Background::Color(self.background_color),
        }
    }

    fn apply<B: RenderBackend + ?Sized>(&mut self, name: &str, entry: &EnvironmentEntry, backend: &mut B) {
        backend.set_lighting(Some(entry.handle));
        self.active = name.to_string();
        backend.set_background(self.background_for(name));
        tracing::info!("Environment: {}", name);
    }
}
