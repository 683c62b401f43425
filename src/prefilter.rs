//! Panorama decoding and reflection-map prefiltering.
//!
//! A reflection map is an equirectangular mip chain: level 0 is the sharp
//! panorama (also used as the background), each further level halves the
//! resolution and blurs with a wider lobe, so the shader can pick a level
//! from surface roughness. Blurring is a separable Gaussian that wraps in
//! longitude and widens toward the poles to follow the projection's
//! horizontal stretch.

use std::path::Path;
use std::time::Instant;

use half::f16;
use image::Rgba32FImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

/// Largest finite value stored in the f16 texture
const F16_CLAMP: f32 = 65000.0;
/// Angular standard deviation (radians) of the roughest level
const MAX_LOBE: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterSettings {
    /// Level 0 is downsampled until its width is at most this
    pub max_width: u32,
    /// Number of roughness levels including level 0
    pub levels: u32,
}

impl Default for PrefilterSettings {
    fn default() -> Self {
        Self {
            max_width: 1024,
            levels: 7,
        }
    }
}

impl PrefilterSettings {
    pub fn validated(self) -> Self {
        Self {
            max_width: self.max_width.clamp(8, 8192),
            levels: self.levels.clamp(1, 12),
        }
    }
}

/// One level of a reflection map, RGBA f16
#[derive(Clone, Debug)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<f16>,
}

impl MipLevel {
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.texels[i].to_f32(),
            self.texels[i + 1].to_f32(),
            self.texels[i + 2].to_f32(),
            self.texels[i + 3].to_f32(),
        ]
    }
}

/// Prefiltered equirectangular environment
#[derive(Clone, Debug)]
pub struct ReflectionMap {
    pub levels: Vec<MipLevel>,
}

impl ReflectionMap {
    pub fn width(&self) -> u32 {
        self.levels.first().map_or(0, |l| l.width)
    }

    pub fn height(&self) -> u32 {
        self.levels.first().map_or(0, |l| l.height)
    }

    /// Index of the roughest level
    pub fn max_lod(&self) -> f32 {
        self.levels.len().saturating_sub(1) as f32
    }
}

/// Working image: linear RGBA f32, row-major
#[derive(Clone)]
struct Plane {
    width: usize,
    height: usize,
    data: Vec<[f32; 4]>,
}

impl Plane {
    fn from_image(image: &Rgba32FImage) -> Self {
        let data = image
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                // Alpha is meaningless for lighting
                [sanitize(r), sanitize(g), sanitize(b), 1.0]
            })
            .collect();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data,
        }
    }

    /// 2x2 box downsample, clamping odd edges
    fn halved(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut data = vec![[0.0f32; 4]; width * height];
        data.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            let y0 = (y * 2).min(self.height - 1);
            let y1 = (y * 2 + 1).min(self.height - 1);
            for (x, out) in row.iter_mut().enumerate() {
                let x0 = (x * 2).min(self.width - 1);
                let x1 = (x * 2 + 1).min(self.width - 1);
                let taps = [
                    self.data[y0 * self.width + x0],
                    self.data[y0 * self.width + x1],
                    self.data[y1 * self.width + x0],
                    self.data[y1 * self.width + x1],
                ];
                for c in 0..4 {
                    out[c] = taps.iter().map(|t| t[c]).sum::<f32>() * 0.25;
                }
            }
        });
        Plane { width, height, data }
    }

    /// Blur with angular standard deviation `sigma` radians
    fn blurred(&self, sigma: f32) -> Plane {
        let texel_angle = std::f32::consts::TAU / self.width as f32;
        let sigma_px = sigma / texel_angle;
        if sigma_px < 0.3 {
            return self.clone();
        }
        self.blur_horizontal(sigma_px).blur_vertical(sigma_px)
    }

    fn blur_horizontal(&self, sigma_px: f32) -> Plane {
        let (w, h) = (self.width, self.height);
        let mut data = vec![[0.0f32; 4]; w * h];
        data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            // Rows near the poles cover less angle per texel
            let theta = std::f32::consts::PI * (y as f32 + 0.5) / h as f32;
            let stretch = 1.0 / theta.sin().max(0.05);
            let kernel = gaussian_kernel(sigma_px * stretch, w / 2);
            let src = &self.data[y * w..(y + 1) * w];
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = [0.0f32; 4];
                for (k, weight) in kernel.iter() {
                    let sx = (x as isize + k).rem_euclid(w as isize) as usize;
                    for c in 0..4 {
                        acc[c] += src[sx][c] * weight;
                    }
                }
                *out = acc;
            }
        });
        Plane { width: w, height: h, data }
    }

    fn blur_vertical(&self, sigma_px: f32) -> Plane {
        let (w, h) = (self.width, self.height);
        let kernel = gaussian_kernel(sigma_px, h);
        let mut data = vec![[0.0f32; 4]; w * h];
        data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (k, weight) in kernel.iter() {
                let sy = (y as isize + k).clamp(0, h as isize - 1) as usize;
                let src = &self.data[sy * w..(sy + 1) * w];
                for (out, texel) in row.iter_mut().zip(src) {
                    for c in 0..4 {
                        out[c] += texel[c] * weight;
                    }
                }
            }
        });
        Plane { width: w, height: h, data }
    }

    fn into_level(self) -> MipLevel {
        let texels = self
            .data
            .iter()
            .flat_map(|t| t.iter().map(|&v| f16::from_f32(v.min(F16_CLAMP))))
            .collect();
        MipLevel {
            width: self.width as u32,
            height: self.height as u32,
            texels,
        }
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// Normalized `(offset, weight)` taps, radius capped at `max_radius`
fn gaussian_kernel(sigma: f32, max_radius: usize) -> Vec<(isize, f32)> {
    let radius = ((sigma * 2.5).ceil() as usize).clamp(1, max_radius.max(1)) as isize;
    let mut taps: Vec<(isize, f32)> = (-radius..=radius)
        .map(|k| {
            let x = k as f32 / sigma;
            (k, (-0.5 * x * x).exp())
        })
        .collect();
    let sum: f32 = taps.iter().map(|(_, w)| w).sum();
    for tap in &mut taps {
        tap.1 /= sum;
    }
    taps
}

/// Build the roughness mip chain for an equirectangular panorama
pub fn prefilter(image: &Rgba32FImage, settings: &PrefilterSettings) -> ReflectionMap {
    let _span = tracing::info_span!("prefilter").entered();
    let settings = settings.validated();

    let mut base = Plane::from_image(image);
    while base.width > settings.max_width as usize && base.width > 1 {
        base = base.halved();
    }

    let level_count = settings.levels as usize;
    let mut levels = Vec::with_capacity(level_count);
    let mut current = base.clone();
    levels.push(base.into_level());

    for i in 1..level_count {
        if current.width < 8 || current.height < 4 {
            break;
        }
        let roughness = i as f32 / (level_count - 1) as f32;
        let halved = current.halved();
        let blurred = halved.blurred(roughness * roughness * MAX_LOBE);
        levels.push(blurred.into_level());
        current = halved;
    }

    ReflectionMap { levels }
}

/// Decode an `.hdr` / `.exr` panorama into linear RGBA
pub fn decode_panorama(path: &Path) -> Result<Rgba32FImage, EnvironmentError> {
    let _span = tracing::info_span!("decode_panorama").entered();
    let image = image::ImageReader::open(path)?.with_guessed_format()?.decode()?;
    if image.width() == 0 || image.height() == 0 {
        return Err(EnvironmentError::EmptyPanorama(path.to_path_buf()));
    }
    Ok(image.to_rgba32f())
}

/// Decode and prefilter a panorama file
pub fn load_reflection_map(path: &Path, settings: &PrefilterSettings) -> Result<ReflectionMap, EnvironmentError> {
    let start = Instant::now();
    let image = decode_panorama(path)?;
    let map = prefilter(&image, settings);
    tracing::info!(
        "Environment {:?}: {}x{} source, {} levels in {:.0?}",
        path,
        image.width(),
        image.height(),
        map.levels.len(),
        start.elapsed()
    );
    Ok(map)
}
