//! Orbit camera built on a dolly rig

use dolly::prelude::*;
use glam::{Mat4, Vec3};

use crate::framing::Framing;

const OPENGL_TO_WGPU_MATRIX: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
]);

pub fn wgpu_projection(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    // wgpu uses 0..1 depth; no Y flip needed for NDC orientation.
    OPENGL_TO_WGPU_MATRIX * Mat4::perspective_rh_gl(fov_y, aspect, near, far)
}

const MIN_DISTANCE: f32 = 1e-4;
const MAX_DISTANCE: f32 = 1e6;

/// Orbit target, arm length and angles the rig is built from
#[derive(Clone, Copy, Debug, PartialEq)]
struct Pose {
    target: Vec3,
    distance: f32,
    yaw_deg: f32,
    pitch_deg: f32,
}

impl Pose {
    /// Pose that places the camera at `position` looking at `target`
    fn looking_at(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let distance = offset.length().max(MIN_DISTANCE);
        let dir = offset / distance;
        Self {
            target,
            distance,
            yaw_deg: dir.x.atan2(dir.z).to_degrees(),
            pitch_deg: -dir.y.clamp(-1.0, 1.0).asin().to_degrees(),
        }
    }
}

fn point(v: Vec3) -> mint::Point3<f32> {
    mint::Point3 { x: v.x, y: v.y, z: v.z }
}

/// Orbit camera rig for the 3D viewport
///
/// Rotation and position are smoothed by `damping` (seconds); a rig rebuilt
/// by [`OrbitCamera::apply_framing`] lands on its pose on the next update.
pub struct OrbitCamera {
    rig: CameraRig,
    damping: f32,
    home: Pose,
    /// Vertical FOV in degrees
    pub fov: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Viewport width / height
    pub aspect: f32,
}

impl OrbitCamera {
    /// Camera at `position` orbiting `target`
    pub fn new(position: Vec3, target: Vec3, fov: f32, damping: f32) -> Self {
        let home = Pose::looking_at(position, target);
        Self {
            rig: build_rig(&home, damping),
            damping,
            home,
            fov,
            near: 0.01,
            far: 1000.0,
            aspect: 1.0,
        }
    }

    /// Orbit around target (drag)
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        let sensitivity = 0.4;
        let yp = self.rig.driver_mut::<YawPitch>();
        yp.rotate_yaw_pitch(-delta_x * sensitivity, -delta_y * sensitivity);
        yp.pitch_degrees = yp.pitch_degrees.clamp(-89.0, 89.0);
    }

    /// Pan target in the screen plane (middle drag)
    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        let right: Vec3 = self.rig.final_transform.right();
        let up: Vec3 = self.rig.final_transform.up();
        let sensitivity = 0.002 * self.distance();
        let offset = right * (-delta_x * sensitivity) + up * (delta_y * sensitivity);

        let target = self.target() + offset;
        self.rig.driver_mut::<Position>().position = point(target);
        self.rig.driver_mut::<LookAt>().target = point(target);
    }

    /// Dolly in/out (scroll); positive delta moves closer
    pub fn zoom(&mut self, delta: f32) {
        let arm = self.rig.driver_mut::<Arm>();
        let factor = (1.0 - delta * 0.002).clamp(0.5, 1.5);
        arm.offset.z = (arm.offset.z * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Move to the pose described by `framing` and make it the new home
    pub fn apply_framing(&mut self, framing: &Framing) {
        self.near = framing.near;
        self.far = framing.far;
        self.home = Pose::looking_at(framing.position, framing.target);
        self.rig = build_rig(&self.home, self.damping);
    }

    /// Return to the last framed (or initial) view
    pub fn reset(&mut self) {
        self.rig = build_rig(&self.home, self.damping);
    }

    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn target(&self) -> Vec3 {
        let p = self.rig.driver::<Position>().position;
        Vec3::new(p.x, p.y, p.z)
    }

    /// Get current distance from target
    pub fn distance(&self) -> f32 {
        self.rig.driver::<Arm>().offset.z
    }

    /// Advance smoothing (call each frame)
    pub fn update(&mut self, dt: f32) {
        self.rig.update(dt);
    }

    /// Get camera position
    pub fn position(&self) -> Vec3 {
        let p = self.rig.final_transform.position;
        Vec3::new(p.x, p.y, p.z)
    }

    /// Get view matrix
    pub fn view_matrix(&self) -> Mat4 {
        let t = &self.rig.final_transform;
        let pos = self.position();
        let fwd: Vec3 = t.forward();
        let up: Vec3 = t.up();
        Mat4::look_at_rh(pos, pos + fwd, up)
    }

    /// Get projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        wgpu_projection(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_proj_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View-projection without translation (sky sphere)
    pub fn sky_view_proj_matrix(&self) -> Mat4 {
        let mut view = self.view_matrix();
        view.w_axis = glam::Vec4::W;
        self.projection_matrix() * view
    }
}

fn build_rig(pose: &Pose, damping: f32) -> CameraRig {
    let mut rig = CameraRig::builder()
        .with(Position::new(point(pose.target)))
        .with(YawPitch::new().yaw_degrees(pose.yaw_deg).pitch_degrees(pose.pitch_deg))
        .with(Smooth::new_rotation(damping))
        .with(Arm::new(mint::Vector3 { x: 0.0, y: 0.0, z: pose.distance }))
        .with(Smooth::new_position(damping))
        .with(LookAt::new(point(pose.target)).tracking_smoothness(0.0))
        .build();
    // Settle on the pose before any smoothing applies
    rig.update(0.0);
    rig
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(Vec3::new(2.5, 1.5, 3.0), Vec3::ZERO, 50.0, 0.0)
    }
}
