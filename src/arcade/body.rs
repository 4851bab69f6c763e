// ==============================================================================
// body.rs — PHYSICS ENGINE SEAM
// ------------------------------------------------------------------------------
// The arcade core never integrates anything itself. Everything it knows about
// the chassis comes through CarBody, and everything it does to the chassis is a
// force / torque / impulse / velocity change submitted through CarBody.
//
// The only hard write is teleport(), used by respawn.
//
// cast_wheel_arc() is a provided method: a fan of parallel rays spread along
// the wheel's rolling direction. The nearest hit by distance to the wheel
// origin approximates a cylindrical tire footprint.
// ==============================================================================

use std::f32::consts::FRAC_PI_2;

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use serde::Serialize;

use crate::config::CarSettings;

pub type Vec3 = Vector3<f32>;
pub type Pos3 = Point3<f32>;

pub const WHEEL_ARC_RAYS: usize = 16;
const WHEEL_ARC_SPREAD: f32 = 0.9 * FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ground,
    Water,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceTag {
    Tarmac,
    Dirt,
    Water,
    Unknown,
}

impl SurfaceTag {
    pub fn from_user_data(data: u128) -> Self {
        match data {
            0 => SurfaceTag::Tarmac,
            1 => SurfaceTag::Dirt,
            2 => SurfaceTag::Water,
            _ => SurfaceTag::Unknown,
        }
    }

    pub fn user_data(self) -> u128 {
        match self {
            SurfaceTag::Tarmac => 0,
            SurfaceTag::Dirt => 1,
            SurfaceTag::Water => 2,
            SurfaceTag::Unknown => 99,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub point: Pos3,
    pub distance: f32,
    pub tag: SurfaceTag,
}

pub trait CarBody {
    fn pose(&self) -> Isometry3<f32>;
    fn mass(&self) -> f32;
    fn linvel(&self) -> Vec3;
    fn angvel(&self) -> Vec3;
    fn velocity_at_point(&self, point: &Pos3) -> Vec3;

    /// Single ray against one layer. `distance` is measured along `dir`.
    fn cast_ray(&self, origin: Pos3, dir: Vec3, max_dist: f32, layer: Layer) -> Option<RayHit>;

    fn apply_force_at_position(&mut self, force: Vec3, point: Pos3);
    fn apply_force(&mut self, force: Vec3);
    fn apply_torque(&mut self, torque: Vec3);
    fn apply_impulse(&mut self, impulse: Vec3);
    fn add_velocity_change(&mut self, dv: Vec3);
    fn add_angular_velocity_change(&mut self, dw: Vec3);

    /// Hard reset: pose set, velocities and accumulated forces cleared.
    fn teleport(&mut self, pose: Isometry3<f32>);

    /// Nearest hit of a 16-ray fan; `distance` is from `origin` to the hit point.
    fn cast_wheel_arc(
        &self,
        origin: Pos3,
        forward: Vec3,
        down: Vec3,
        radius: f32,
        reach: f32,
        layer: Layer,
    ) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;

        for i in 0..WHEEL_ARC_RAYS {
            let t = i as f32 / (WHEEL_ARC_RAYS - 1) as f32;
            let theta = -WHEEL_ARC_SPREAD + 2.0 * WHEEL_ARC_SPREAD * t;
            let start = origin + forward * (radius * theta.sin());

            let Some(hit) = self.cast_ray(start, down, reach, layer) else { continue };
            let distance = (hit.point - origin).norm();

            if best.map_or(true, |b| distance < b.distance) {
                best = Some(RayHit { distance, ..hit });
            }
        }

        best
    }
}

/// Chassis basis and axle anchors for one step, in world space.
#[derive(Debug, Clone, Copy)]
pub struct CarFrame {
    pub pose: Isometry3<f32>,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub front_axle: Pos3,
    pub rear_axle: Pos3,
    pub com: Pos3,
}

impl CarFrame {
    pub fn new(pose: Isometry3<f32>, car: &CarSettings) -> Self {
        let rot = pose.rotation;
        let forward = rot * Vec3::z();
        let up = rot * Vec3::y();
        let right = forward.cross(&up);

        let half_wb = car.wheelbase * 0.5;
        let h = car.wheel_mount_height;
        let [cx, cy, cz] = car.com_offset;

        Self {
            pose,
            forward,
            right,
            up,
            front_axle: pose * Pos3::new(0.0, h, half_wb),
            rear_axle: pose * Pos3::new(0.0, h, -half_wb),
            com: pose * Pos3::new(cx, cy, cz),
        }
    }

    /// Velocity with the component along the chassis up axis removed.
    pub fn flatten(&self, v: Vec3) -> Vec3 {
        v - self.up * v.dot(&self.up)
    }

    /// Chassis forward rotated about up by a steer angle (positive = right).
    pub fn steered_forward(&self, steer_angle: f32) -> Vec3 {
        steer_rotation(&self.up, steer_angle) * self.forward
    }

    pub fn steered_right(&self, steer_angle: f32) -> Vec3 {
        steer_rotation(&self.up, steer_angle) * self.right
    }
}

#[inline]
pub fn steer_rotation(up: &Vec3, steer_angle: f32) -> UnitQuaternion<f32> {
    UnitQuaternion::from_scaled_axis(*up * -steer_angle)
}

#[inline]
pub fn safe_normalize(v: Vec3) -> Option<Vec3> {
    let n = v.norm();
    if n > 1e-6 && n.is_finite() { Some(v / n) } else { None }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

// ------------------------------------------------------------------------------
// Test double: flat ground at a fixed height, optional water plane, explicit
// integrator. Rotation can be locked to keep suspension tests one-dimensional.
// ------------------------------------------------------------------------------
#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    pub struct FlatGround {
        pub pose: Isometry3<f32>,
        pub linvel: Vec3,
        pub angvel: Vec3,
        pub mass: f32,
        pub ground_y: f32,
        pub water_y: Option<f32>,
        pub lock_rotation: bool,
        pub gravity: bool,
        pub force: Vec3,
        pub torque: Vec3,
        pub teleports: usize,
    }

    impl FlatGround {
        pub fn new(mass: f32, height: f32) -> Self {
            Self {
                pose: Isometry3::translation(0.0, height, 0.0),
                linvel: Vec3::zeros(),
                angvel: Vec3::zeros(),
                mass,
                ground_y: 0.0,
                water_y: None,
                lock_rotation: true,
                gravity: true,
                force: Vec3::zeros(),
                torque: Vec3::zeros(),
                teleports: 0,
            }
        }

        pub fn integrate(&mut self, dt: f32) {
            let g = if self.gravity { Vec3::new(0.0, -9.81, 0.0) } else { Vec3::zeros() };
            self.linvel += (self.force / self.mass + g) * dt;
            self.pose.translation.vector += self.linvel * dt;

            if !self.lock_rotation {
                self.angvel += self.torque / self.mass * dt;
                let dq = UnitQuaternion::from_scaled_axis(self.angvel * dt);
                self.pose.rotation = dq * self.pose.rotation;
            }

            self.force = Vec3::zeros();
            self.torque = Vec3::zeros();
        }
    }

    impl CarBody for FlatGround {
        fn pose(&self) -> Isometry3<f32> {
            self.pose
        }

        fn mass(&self) -> f32 {
            self.mass
        }

        fn linvel(&self) -> Vec3 {
            self.linvel
        }

        fn angvel(&self) -> Vec3 {
            self.angvel
        }

        fn velocity_at_point(&self, point: &Pos3) -> Vec3 {
            let r = point.coords - self.pose.translation.vector;
            self.linvel + self.angvel.cross(&r)
        }

        fn cast_ray(&self, origin: Pos3, dir: Vec3, max_dist: f32, layer: Layer) -> Option<RayHit> {
            let (plane, tag) = match layer {
                Layer::Ground => (self.ground_y, SurfaceTag::Tarmac),
                Layer::Water => (self.water_y?, SurfaceTag::Water),
            };
            if dir.y > -1e-6 {
                return None;
            }
            let t = (origin.y - plane) / -dir.y;
            if !(0.0..=max_dist).contains(&t) {
                return None;
            }
            Some(RayHit { point: origin + dir * t, distance: t, tag })
        }

        fn apply_force_at_position(&mut self, force: Vec3, point: Pos3) {
            self.force += force;
            let r = point.coords - self.pose.translation.vector;
            self.torque += r.cross(&force);
        }

        fn apply_force(&mut self, force: Vec3) {
            self.force += force;
        }

        fn apply_torque(&mut self, torque: Vec3) {
            self.torque += torque;
        }

        fn apply_impulse(&mut self, impulse: Vec3) {
            self.linvel += impulse / self.mass;
        }

        fn add_velocity_change(&mut self, dv: Vec3) {
            self.linvel += dv;
        }

        fn add_angular_velocity_change(&mut self, dw: Vec3) {
            self.angvel += dw;
        }

        fn teleport(&mut self, pose: Isometry3<f32>) {
            self.pose = pose;
            self.linvel = Vec3::zeros();
            self.angvel = Vec3::zeros();
            self.force = Vec3::zeros();
            self.torque = Vec3::zeros();
            self.teleports += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::FlatGround;
    use super::*;

    #[test]
    fn arc_picks_nearest_hit_straight_below() {
        let body = FlatGround::new(1000.0, 0.0);
        let origin = Pos3::new(0.0, 0.5, 0.0);
        let hit = body
            .cast_wheel_arc(origin, Vec3::z(), -Vec3::y(), 0.3, 1.0, Layer::Ground)
            .unwrap();
        // Even ray count: the two centre rays straddle the axle.
        assert!((hit.distance - 0.5).abs() < 0.01);
        assert_eq!(hit.tag, SurfaceTag::Tarmac);
    }

    #[test]
    fn arc_misses_when_out_of_reach() {
        let body = FlatGround::new(1000.0, 0.0);
        let origin = Pos3::new(0.0, 3.0, 0.0);
        assert!(body.cast_wheel_arc(origin, Vec3::z(), -Vec3::y(), 0.3, 1.0, Layer::Ground).is_none());
    }

    #[test]
    fn water_layer_is_separate() {
        let mut body = FlatGround::new(1000.0, 0.0);
        let origin = Pos3::new(0.0, 0.5, 0.0);
        assert!(body.cast_ray(origin, -Vec3::y(), 1.0, Layer::Water).is_none());
        body.water_y = Some(0.2);
        let hit = body.cast_ray(origin, -Vec3::y(), 1.0, Layer::Water).unwrap();
        assert!((hit.distance - 0.3).abs() < 1e-5);
        assert_eq!(hit.tag, SurfaceTag::Water);
    }

    #[test]
    fn frame_axes_are_right_handed() {
        let frame = CarFrame::new(Isometry3::identity(), &CarSettings::coupe());
        assert!((frame.forward - Vec3::z()).norm() < 1e-6);
        assert!((frame.up - Vec3::y()).norm() < 1e-6);
        assert!((frame.right - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn positive_steer_turns_right() {
        let frame = CarFrame::new(Isometry3::identity(), &CarSettings::coupe());
        let f = frame.steered_forward(0.3);
        assert!(f.dot(&frame.right) > 0.0);
        assert!((f.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn move_towards_does_not_overshoot() {
        assert_eq!(move_towards(0.0, 1.0, 5.0), 1.0);
        assert_eq!(move_towards(0.0, 1.0, 0.25), 0.25);
        assert_eq!(move_towards(1.0, -1.0, 0.5), 0.5);
    }
}
