//! Camera auto-framing from a world-space bounding box.

use glam::Vec3;

use crate::scene::{Bounds, Subtree};

/// Default multiplier on the fit distance
pub const DEFAULT_PADDING: f32 = 1.3;

/// Camera placement that frames a bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Framing {
    /// Orbit target (box center)
    pub target: Vec3,
    pub position: Vec3,
    /// Padded fit distance `d`
    pub distance: f32,
    /// Distance needed to fit the box height in the vertical FOV
    pub fit_height: f32,
    /// Distance needed to fit the box width given the aspect ratio
    pub fit_width: f32,
    pub near: f32,
    pub far: f32,
}

/// Frame `bounds` for a camera with vertical FOV `fov_y_deg` and `aspect`.
///
/// `fit_h = max / (2 tan(fov/2))`, `fit_w = fit_h / aspect`,
/// `d = padding * max(fit_h, fit_w)`. The camera goes to
/// `center + (d, d/2, d)` with `near = d/100`, `far = d*100`.
/// Returns `None` for an empty or degenerate box.
pub fn frame_bounds(bounds: &Bounds, fov_y_deg: f32, aspect: f32, padding: f32) -> Option<Framing> {
    if !bounds.is_valid() {
        return None;
    }
    let size = bounds.size();
    let max_size = size.max_element();
    if max_size <= 0.0 || !max_size.is_finite() {
        return None;
    }

    let center = bounds.center();
    let half_fov = (fov_y_deg.to_radians() * 0.5).tan();
    let fit_height = max_size / (2.0 * half_fov);
    let fit_width = fit_height / aspect.max(f32::EPSILON);
    let distance = padding * fit_height.max(fit_width);

    Some(Framing {
        target: center,
        position: center + Vec3::new(distance, distance * 0.5, distance),
        distance,
        fit_height,
        fit_width,
        near: distance / 100.0,
        far: distance * 100.0,
    })
}

/// Frame the world bounds of every renderable node in `subtree`
pub fn frame_subtree(subtree: &Subtree, fov_y_deg: f32, aspect: f32, padding: f32) -> Option<Framing> {
    frame_bounds(&subtree.world_bounds(), fov_y_deg, aspect, padding)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Bounds {
        Bounds::from_min_max(Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    #[test]
    fn test_offsets_and_planes() {
        let f = frame_bounds(&unit_box(), 50.0, 1.0, 1.3).unwrap();
        let offset = f.position - f.target;
        assert!((offset.x - f.distance).abs() < 1e-5);
        assert!((offset.y - f.distance * 0.5).abs() < 1e-5);
        assert!((offset.z - f.distance).abs() < 1e-5);
        assert!((f.near - f.distance / 100.0).abs() < 1e-6);
        assert!((f.far - f.distance * 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_narrow_aspect_uses_width() {
        let wide = frame_bounds(&unit_box(), 50.0, 2.0, 1.3).unwrap();
        let narrow = frame_bounds(&unit_box(), 50.0, 0.5, 1.3).unwrap();
        // Wide: height-driven; narrow: width-driven
        assert!((wide.distance - 1.3 * wide.fit_height).abs() < 1e-5);
        assert!((narrow.distance - 1.3 * narrow.fit_width).abs() < 1e-5);
        assert!(narrow.distance > wide.distance);
    }

    #[test]
    fn test_deterministic() {
        let a = frame_bounds(&unit_box(), 50.0, 1.5, 1.3);
        let b = frame_bounds(&unit_box(), 50.0, 1.5, 1.3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_and_point_bounds() {
        assert!(frame_bounds(&Bounds::empty(), 50.0, 1.0, 1.3).is_none());
        let point = Bounds::from_min_max(Vec3::ONE, Vec3::ONE);
        assert!(frame_bounds(&point, 50.0, 1.0, 1.3).is_none());
    }
}
