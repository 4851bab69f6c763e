// ==============================================================================
// airborne.rs — AIR CONTROL + SELF-RIGHTING
// ------------------------------------------------------------------------------
// No wheel grounded:
// - first airborne step: keep only the yaw (flat spin) part of angular velocity
// - then per axis, spin rate moves toward input * max_air_spin at
//   air_spin_accel, and back toward zero when the input is released
//     pitch -> chassis right      (pitch input, positive = nose up)
//     yaw   -> chassis up         (steer input, positive = clockwise from above)
//     roll  -> chassis forward    (steer input while air-roll is held)
// - upside down, close to the ground and slow: torque rolling up back to +Y
// ==============================================================================

use tracing::debug;

use crate::arcade::body::{CarBody, CarFrame, Layer, Pos3, Vec3, move_towards, safe_normalize};
use crate::config::CarSettings;

pub const SELF_RIGHT_HEIGHT: f32 = 2.0;    // m, ray reach below the chassis
pub const SELF_RIGHT_MAX_SPEED: f32 = 3.0; // m/s

#[derive(Debug, Clone, Copy, Default)]
pub struct AirInput {
    pub steer: f32,
    pub pitch: f32,
    pub air_roll: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AirState {
    pub airborne_steps: u32,
}

impl AirState {
    pub fn reset(&mut self) {
        self.airborne_steps = 0;
    }

    pub fn landed(&mut self) {
        self.airborne_steps = 0;
    }

    pub fn step<B: CarBody + ?Sized>(&mut self, body: &mut B, frame: &CarFrame, car: &CarSettings, input: &AirInput, dt: f32) {
        let mut angvel = body.angvel();
        if !angvel.iter().all(|c| c.is_finite()) {
            return;
        }

        if self.airborne_steps == 0 {
            let yaw = frame.up * angvel.dot(&frame.up);
            body.add_angular_velocity_change(yaw - angvel);
            angvel = yaw;
            debug!("left the ground");
        }
        self.airborne_steps = self.airborne_steps.saturating_add(1);

        let steer = input.steer.clamp(-1.0, 1.0);
        let pitch = input.pitch.clamp(-1.0, 1.0);
        let (yaw_in, roll_in) = if input.air_roll { (0.0, steer) } else { (-steer, 0.0) };

        let max_delta = car.air_spin_accel * dt;
        let mut change = Vec3::zeros();
        for (axis, amount) in [(frame.right, pitch), (frame.up, yaw_in), (frame.forward, roll_in)] {
            let current = angvel.dot(&axis);
            let target = amount * car.max_air_spin;
            change += axis * (move_towards(current, target, max_delta) - current);
        }
        body.add_angular_velocity_change(change);

        self.self_right(body, frame, car);
    }

    fn self_right<B: CarBody + ?Sized>(&self, body: &mut B, frame: &CarFrame, car: &CarSettings) {
        if frame.up.y >= 0.0 || body.linvel().norm() > SELF_RIGHT_MAX_SPEED {
            return;
        }
        let origin = Pos3::from(frame.pose.translation.vector);
        if body.cast_ray(origin, -Vec3::y(), SELF_RIGHT_HEIGHT, Layer::Ground).is_none() {
            return;
        }
        let axis = safe_normalize(frame.up.cross(&Vec3::y())).unwrap_or(frame.forward);
        body.apply_torque(axis * car.self_right_torque * body.mass());
    }
}
