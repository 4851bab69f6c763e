// ==============================================================================
// wheel.rs — WHEEL CONTACT MODEL (ARC RAYCAST + SUSPENSION + HYDROPLANING)
// ------------------------------------------------------------------------------
// Per wheel, per step:
// 1) cast the wheel arc against the ground layer and the water layer
// 2) pick the contact:
//      - water nearer than ground, fast enough, and not already "wet" last
//        step -> ride the water surface (hydroplaning)
//      - otherwise the ground hit; water only marks the wheel wet so a car
//        that is already submerged does not pop onto the surface
// 3) compression = (rest_travel + radius) - |contact - origin|, clamped to
//    [0, travel]
// 4) force = (compression - rest_target) * k + (d compression / dt) * c along
//    the chassis up axis, at the wheel anchor
//
// The force is RETURNED. The orchestration step applies all four suspension
// forces before any other force.
//
// Known jitter source: the nearest hit is taken independently every step, so
// at grazing angles the contact point can jump between rays for one tick.
// ==============================================================================

use std::f32::consts::PI;
use std::fmt;

use serde::Serialize;

use crate::arcade::body::{CarBody, CarFrame, Layer, Pos3, SurfaceTag, Vec3};
use crate::config::CarSettings;

const AIR_RPM_DECAY: f32 = 0.98;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum WheelId { FL, FR, RL, RR }

impl WheelId {
    pub const ALL: [WheelId; 4] = [WheelId::FL, WheelId::FR, WheelId::RL, WheelId::RR];

    pub fn is_front(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::FR)
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, WheelId::RL | WheelId::RR)
    }

    pub fn is_left(&self) -> bool {
        matches!(self, WheelId::FL | WheelId::RL)
    }
}

impl fmt::Display for WheelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WheelId::FL => "FL",
            WheelId::FR => "FR",
            WheelId::RL => "RL",
            WheelId::RR => "RR",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WheelForce {
    pub force: Vec3,
    pub at: Pos3,
}

#[derive(Debug, Clone)]
pub struct Wheel {
    pub id: WheelId,
    pub offset: Pos3,             // anchor in chassis local space
    pub radius: f32,
    pub steering: bool,
    pub drive: bool,

    pub grounded: bool,
    pub hydroplaning: bool,
    pub wet: bool,                // water under the wheel without hydroplaning last step
    pub compression: f32,
    pub prev_compression: f32,
    pub suspension_force: Vec3,
    pub contact_point: Pos3,
    pub surface: Option<SurfaceTag>,
    pub rpm: f32,
}

impl Wheel {
    pub fn new(id: WheelId, offset: Pos3, radius: f32) -> Self {
        Self {
            id,
            offset,
            radius,
            steering: id.is_front(),
            drive: id.is_rear(),
            grounded: false,
            hydroplaning: false,
            wet: false,
            compression: 0.0,
            prev_compression: 0.0,
            suspension_force: Vec3::zeros(),
            contact_point: offset,
            surface: None,
            rpm: 0.0,
        }
    }

    /// Four wheels laid out from the car's wheelbase / track / mount height.
    pub fn layout(car: &CarSettings) -> [Wheel; 4] {
        let r = car.wheel_radius();
        let hx = car.track_width * 0.5;
        let hz = car.wheelbase * 0.5;
        let y = car.wheel_mount_height;

        WheelId::ALL.map(|id| {
            // +X is the car's left
            let x = if id.is_left() { hx } else { -hx };
            let z = if id.is_front() { hz } else { -hz };
            Wheel::new(id, Pos3::new(x, y, z), r)
        })
    }

    /// Transient state back to spawn values.
    pub fn reset(&mut self) {
        self.grounded = false;
        self.hydroplaning = false;
        self.wet = false;
        self.compression = 0.0;
        self.prev_compression = 0.0;
        self.suspension_force = Vec3::zeros();
        self.contact_point = self.offset;
        self.surface = None;
        self.rpm = 0.0;
    }

    pub fn forward(&self, frame: &CarFrame, steer_angle: f32) -> Vec3 {
        if self.steering { frame.steered_forward(steer_angle) } else { frame.forward }
    }

    /// Ray-cast, pick ground or water, update compression. Returns the
    /// suspension force for this step (zero when airborne).
    pub fn update_contact<B: CarBody + ?Sized>(
        &mut self,
        body: &B,
        frame: &CarFrame,
        car: &CarSettings,
        steer_angle: f32,
        dt: f32,
    ) -> WheelForce {
        let origin = frame.pose * self.offset;
        let forward = self.forward(frame, steer_angle);
        let down = -frame.up;
        let reach = car.suspension_rest_travel + self.radius;

        let ground = body.cast_wheel_arc(origin, forward, down, self.radius, reach, Layer::Ground);
        let water = body.cast_wheel_arc(origin, forward, down, self.radius, reach, Layer::Water);

        let planar_speed = frame.flatten(body.velocity_at_point(&origin)).norm();

        let contact = match water {
            Some(w) if ground.map_or(true, |g| w.distance < g.distance) => {
                if planar_speed > car.hydroplane_speed && !self.wet {
                    self.hydroplaning = true;
                    self.wet = false;
                    Some(w)
                } else {
                    self.hydroplaning = false;
                    self.wet = true;
                    ground
                }
            }
            _ => {
                self.hydroplaning = false;
                self.wet = false;
                ground
            }
        };

        self.prev_compression = self.compression;

        let Some(hit) = contact else {
            self.grounded = false;
            self.compression = 0.0;
            self.surface = None;
            self.suspension_force = Vec3::zeros();
            return WheelForce { force: Vec3::zeros(), at: origin };
        };

        self.grounded = true;
        self.contact_point = hit.point;
        self.surface = Some(hit.tag);
        self.compression = compression(car.suspension_rest_travel, self.radius, hit.distance, car.suspension_travel);

        let magnitude = suspension_force(
            self.compression,
            self.prev_compression,
            car.suspension_rest_target,
            car.spring_strength,
            car.spring_damper,
            dt,
        );
        self.suspension_force = frame.up * magnitude;

        WheelForce { force: self.suspension_force, at: origin }
    }

    /// Wheel spin from the contact point speed; coasts down while airborne.
    pub fn update_rpm<B: CarBody + ?Sized>(&mut self, body: &B, frame: &CarFrame, steer_angle: f32) {
        if !self.grounded || self.radius <= 0.0 {
            self.rpm *= AIR_RPM_DECAY;
            return;
        }
        let v = body.velocity_at_point(&self.contact_point);
        let forward_speed = v.dot(&self.forward(frame, steer_angle));
        self.rpm = forward_speed / (2.0 * PI * self.radius) * 60.0;
    }
}

#[inline]
pub fn compression(rest_travel: f32, radius: f32, distance: f32, travel: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    ((rest_travel + radius) - distance).clamp(0.0, travel)
}

#[inline]
pub fn suspension_force(
    compression: f32,
    prev_compression: f32,
    rest_target: f32,
    spring_strength: f32,
    spring_damper: f32,
    dt: f32,
) -> f32 {
    let spring = (compression - rest_target) * spring_strength;
    let damper = if dt > 0.0 {
        ((compression - prev_compression) / dt) * spring_damper
    } else {
        0.0
    };
    spring + damper
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcade::body::mock::FlatGround;

    const DT: f32 = 1.0 / 60.0;

    fn front_left(car: &CarSettings) -> Wheel {
        Wheel::layout(car)[0].clone()
    }

    #[test]
    fn compression_stays_within_travel() {
        let travel = 0.3;
        let mut d = -1.0;
        while d < 2.0 {
            let c = compression(0.35, 0.34, d, travel);
            assert!((0.0..=travel).contains(&c), "d={d} c={c}");
            d += 0.01;
        }
        assert_eq!(compression(0.35, 0.34, f32::NAN, travel), 0.0);
    }

    #[test]
    fn spring_force_is_continuous_at_clamp_edges() {
        let k = 35_000.0;
        let below = suspension_force(compression(0.35, 0.34, 0.39 + 1e-4, 0.3), 0.3, 0.0, k, 0.0, DT);
        let above = suspension_force(compression(0.35, 0.34, 0.39 - 1e-4, 0.3), 0.3, 0.0, k, 0.0, DT);
        assert!((below - above).abs() < k * 1e-3);
    }

    #[test]
    fn damper_opposes_nothing_without_dt() {
        assert_eq!(suspension_force(0.1, 0.0, 0.0, 100.0, 1000.0, 0.0), 10.0);
    }

    #[test]
    fn grounded_wheel_pushes_up() {
        let car = CarSettings::coupe();
        let body = FlatGround::new(car.mass, 0.6);
        let frame = CarFrame::new(body.pose, &car);
        let mut wheel = front_left(&car);

        let out = wheel.update_contact(&body, &frame, &car, 0.0, DT);
        assert!(wheel.grounded);
        assert!(!wheel.hydroplaning);
        assert!(out.force.y > 0.0);
        assert!(wheel.compression > 0.0 && wheel.compression <= car.suspension_travel);
    }

    #[test]
    fn airborne_wheel_has_no_force() {
        let car = CarSettings::coupe();
        let body = FlatGround::new(car.mass, 5.0);
        let frame = CarFrame::new(body.pose, &car);
        let mut wheel = front_left(&car);

        let out = wheel.update_contact(&body, &frame, &car, 0.0, DT);
        assert!(!wheel.grounded);
        assert_eq!(out.force, Vec3::zeros());
        assert_eq!(wheel.compression, 0.0);
    }

    #[test]
    fn fast_wheel_rides_water() {
        let car = CarSettings::coupe();
        let mut body = FlatGround::new(car.mass, 0.6);
        body.water_y = Some(0.3);
        body.linvel = Vec3::new(0.0, 0.0, car.hydroplane_speed + 5.0);
        let frame = CarFrame::new(body.pose, &car);
        let mut wheel = front_left(&car);

        wheel.update_contact(&body, &frame, &car, 0.0, DT);
        assert!(wheel.hydroplaning);
        assert_eq!(wheel.surface, Some(SurfaceTag::Water));
    }

    #[test]
    fn submerged_wheel_does_not_pop_onto_water() {
        let car = CarSettings::coupe();
        let mut body = FlatGround::new(car.mass, 0.6);
        body.water_y = Some(0.3);
        let frame = CarFrame::new(body.pose, &car);
        let mut wheel = front_left(&car);

        // Slow: wet, on the ground.
        wheel.update_contact(&body, &frame, &car, 0.0, DT);
        assert!(wheel.wet);
        assert!(!wheel.hydroplaning);
        assert_eq!(wheel.surface, Some(SurfaceTag::Tarmac));

        // Now fast, but it was already in the water last step.
        body.linvel = Vec3::new(0.0, 0.0, car.hydroplane_speed + 5.0);
        wheel.update_contact(&body, &frame, &car, 0.0, DT);
        assert!(!wheel.hydroplaning);
        assert_eq!(wheel.surface, Some(SurfaceTag::Tarmac));
    }

    #[test]
    fn rpm_follows_ground_speed() {
        let car = CarSettings::coupe();
        let mut body = FlatGround::new(car.mass, 0.6);
        body.linvel = Vec3::new(0.0, 0.0, 10.0);
        let frame = CarFrame::new(body.pose, &car);
        let mut wheel = front_left(&car);

        wheel.update_contact(&body, &frame, &car, 0.0, DT);
        wheel.update_rpm(&body, &frame, 0.0);
        let expected = 10.0 / (2.0 * PI * wheel.radius) * 60.0;
        assert!((wheel.rpm - expected).abs() < 1e-2);
    }

    #[test]
    fn layout_places_steering_up_front() {
        let wheels = Wheel::layout(&CarSettings::coupe());
        assert!(wheels[0].steering && !wheels[0].drive);
        assert!(wheels[3].drive && !wheels[3].steering);
        assert!(wheels[0].offset.z > 0.0 && wheels[2].offset.z < 0.0);

        let mut w = wheels[2].clone();
        w.rpm = 500.0;
        w.grounded = true;
        w.reset();
        assert_eq!(w.rpm, 0.0);
        assert!(!w.grounded);
    }
}
