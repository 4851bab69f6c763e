// ==============================================================================
// grip.rs — TIRE LATERAL GRIP + DRIFT STATE MACHINE
// ------------------------------------------------------------------------------
// Per axle:
//   v_flat       = contact point velocity on the ground plane
//   lateral      = v_flat . lateral_dir
//   wanted_accel = -lateral * slip_coefficient / dt
//   force        = lateral_dir * wanted_accel * grip * (mass * 0.5)
//
// Steering axle owns the drift state:
//   enter when |wanted_accel| >  max_cornering_accel          (not hydroplaning)
//   exit  when |wanted_accel| <= max_cornering_accel * (1 - DRIFT_HYSTERESIS)
// While drifting grip = 0.5 / (|wanted_accel| / max_cornering_accel).
// While hydroplaning grip is the settings' hydroplane_grip.
// Drive axle grip is additionally scaled by forward traction.
//
// current_grip relaxes toward 1 after a drift instead of snapping back.
// Drift boost: while drifting, a push along the steered forward direction
// proportional to throttle and |lateral force| keeps the slide from bleeding
// all of its speed.
// ==============================================================================

use crate::arcade::body::{CarFrame, Pos3, Vec3, move_towards};
use crate::config::CarSettings;

pub const DRIFT_HYSTERESIS: f32 = 0.02;
pub const GRIP_RECOVERY_RATE: f32 = 2.0; // grip per second

#[derive(Debug, Clone)]
pub struct DriftState {
    pub drifting: bool,
    pub start_position: Pos3,
    pub start_time: f32,
    pub distance: f32,          // current drift, start -> now
    pub time: f32,
}

impl Default for DriftState {
    fn default() -> Self {
        Self {
            drifting: false,
            start_position: Pos3::origin(),
            start_time: 0.0,
            distance: 0.0,
            time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftChange {
    Started,
    Ended { distance: f32, time: f32 },
}

#[derive(Debug, Clone)]
pub struct GripState {
    pub current_grip: f32,
    pub drift: DriftState,
}

impl Default for GripState {
    fn default() -> Self {
        Self {
            current_grip: 1.0,
            drift: DriftState::default(),
        }
    }
}

/// Contact data for one axle, averaged over its grounded wheels.
#[derive(Debug, Clone, Copy)]
pub struct AxleContact {
    pub point: Pos3,
    pub lateral: Vec3,
    pub velocity: Vec3,         // point velocity (world)
    pub grounded: bool,
    pub hydroplaning: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LateralForce {
    pub force: Vec3,
    pub wanted_accel: f32,
}

impl LateralForce {
    pub fn zero() -> Self {
        Self { force: Vec3::zeros(), wanted_accel: 0.0 }
    }
}

#[inline]
pub fn wanted_lateral_accel(flat_velocity: Vec3, lateral: Vec3, slip_coefficient: f32, dt: f32) -> f32 {
    if dt <= 0.0 || !flat_velocity.iter().all(|c| c.is_finite()) {
        return 0.0;
    }
    -flat_velocity.dot(&lateral) * slip_coefficient / dt
}

#[inline]
pub fn drift_grip(wanted_accel: f32, max_cornering_accel: f32) -> f32 {
    let ratio = wanted_accel.abs() / max_cornering_accel.max(1e-3);
    if ratio <= 0.0 { 1.0 } else { 0.5 / ratio }
}

impl GripState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Drift on/off from the steering axle's wanted acceleration.
    pub fn update_drift(
        &mut self,
        wanted_accel: f32,
        max_cornering_accel: f32,
        hydroplaning: bool,
        position: Pos3,
        time: f32,
    ) -> Option<DriftChange> {
        let demand = wanted_accel.abs();

        if self.drift.drifting {
            self.drift.distance = (position - self.drift.start_position).norm();
            self.drift.time = time - self.drift.start_time;

            let recovered = demand <= max_cornering_accel * (1.0 - DRIFT_HYSTERESIS);
            if recovered || hydroplaning {
                self.drift.drifting = false;
                return Some(DriftChange::Ended {
                    distance: self.drift.distance,
                    time: self.drift.time,
                });
            }
            None
        } else if demand > max_cornering_accel && !hydroplaning {
            self.drift = DriftState {
                drifting: true,
                start_position: position,
                start_time: time,
                distance: 0.0,
                time: 0.0,
            };
            Some(DriftChange::Started)
        } else {
            None
        }
    }

    /// Grip for this step; also relaxes current_grip when not drifting.
    pub fn axle_grip(&mut self, wanted_accel: f32, car: &CarSettings, hydroplaning: bool, dt: f32) -> f32 {
        if self.drift.drifting {
            self.current_grip = drift_grip(wanted_accel, car.max_cornering_accel).min(1.0);
        } else {
            self.current_grip = move_towards(self.current_grip, 1.0, GRIP_RECOVERY_RATE * dt);
        }

        if hydroplaning { car.hydroplane_grip } else { self.current_grip }
    }
}

/// Lateral force for one axle at its contact point. Airborne axles give zero.
pub fn lateral_force(
    frame: &CarFrame,
    axle: &AxleContact,
    grip: f32,
    car: &CarSettings,
    mass: f32,
    dt: f32,
) -> LateralForce {
    if !axle.grounded {
        return LateralForce::zero();
    }
    let flat = frame.flatten(axle.velocity);
    let wanted_accel = wanted_lateral_accel(flat, axle.lateral, car.slip_coefficient, dt);

    LateralForce {
        force: axle.lateral * wanted_accel * grip * (mass * 0.5),
        wanted_accel,
    }
}

/// Push along the steered forward direction while drifting.
pub fn drift_boost(frame: &CarFrame, steer_angle: f32, throttle: f32, lateral: &LateralForce, car: &CarSettings) -> Vec3 {
    frame.steered_forward(steer_angle) * throttle.max(0.0) * lateral.force.norm() * car.drift_boost
}

/// Yaw help toward the steer input while sliding.
pub fn drift_yaw_torque(frame: &CarFrame, steer_input: f32, car: &CarSettings, mass: f32) -> Vec3 {
    // positive steer turns right, i.e. negative rotation about up
    -frame.up * steer_input * car.drift_control * mass
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Isometry3;

    const DT: f32 = 1.0 / 60.0;

    fn frame() -> CarFrame {
        CarFrame::new(Isometry3::identity(), &CarSettings::coupe())
    }

    #[test]
    fn lateral_force_opposes_slide() {
        let car = CarSettings::coupe();
        let f = frame();
        let axle = AxleContact {
            point: f.rear_axle,
            lateral: f.right,
            velocity: f.right * 1.0,
            grounded: true,
            hydroplaning: false,
        };
        let out = lateral_force(&f, &axle, 1.0, &car, car.mass, DT);
        assert!(out.force.dot(&f.right) < 0.0);
        assert!((out.wanted_accel + car.slip_coefficient / DT).abs() < 1e-3);
    }

    #[test]
    fn no_force_in_the_air_or_without_dt() {
        let car = CarSettings::coupe();
        let f = frame();
        let axle = AxleContact {
            point: f.rear_axle,
            lateral: f.right,
            velocity: f.right * 3.0,
            grounded: false,
            hydroplaning: false,
        };
        assert_eq!(lateral_force(&f, &axle, 1.0, &car, car.mass, DT).force, Vec3::zeros());
        assert_eq!(wanted_lateral_accel(f.right, f.right, 1.0, 0.0), 0.0);
    }

    #[test]
    fn drift_enters_above_threshold_and_exits_below_band() {
        let mut g = GripState::default();
        let max = 10.0;
        let p = Pos3::origin();

        assert_eq!(g.update_drift(10.5, max, false, p, 0.0), Some(DriftChange::Started));
        assert!(g.drift.drifting);

        // Exactly at the limit: still sliding (inside the band).
        assert_eq!(g.update_drift(10.0, max, false, p, 0.1), None);
        assert!(g.drift.drifting);

        let end = g.update_drift(5.0, max, false, Pos3::new(3.0, 0.0, 4.0), 1.0);
        assert_eq!(end, Some(DriftChange::Ended { distance: 5.0, time: 1.0 }));
        assert!(!g.drift.drifting);
    }

    #[test]
    fn drift_does_not_flicker_under_noise() {
        let mut g = GripState::default();
        let max = 10.0;
        g.update_drift(10.2, max, false, Pos3::origin(), 0.0);

        let mut changes = 0;
        for i in 0..200 {
            let noise = if i % 2 == 0 { 1.009 } else { 0.991 };
            if g.update_drift(max * noise, max, false, Pos3::origin(), i as f32 * DT).is_some() {
                changes += 1;
            }
        }
        assert_eq!(changes, 0);
        assert!(g.drift.drifting);
    }

    #[test]
    fn hydroplaning_blocks_and_ends_drift() {
        let mut g = GripState::default();
        assert_eq!(g.update_drift(50.0, 10.0, true, Pos3::origin(), 0.0), None);
        g.update_drift(50.0, 10.0, false, Pos3::origin(), 0.0);
        assert!(matches!(g.update_drift(50.0, 10.0, true, Pos3::origin(), 0.5), Some(DriftChange::Ended { .. })));
    }

    #[test]
    fn grip_drops_while_drifting_then_relaxes() {
        let car = CarSettings::coupe();
        let mut g = GripState::default();
        let wanted = car.max_cornering_accel * 2.0;
        g.update_drift(wanted, car.max_cornering_accel, false, Pos3::origin(), 0.0);

        let grip = g.axle_grip(wanted, &car, false, DT);
        assert!((grip - 0.25).abs() < 1e-5);

        g.update_drift(0.0, car.max_cornering_accel, false, Pos3::origin(), 0.1);
        let next = g.axle_grip(0.0, &car, false, DT);
        assert!(next > 0.25 && next < 1.0);

        for _ in 0..120 {
            g.axle_grip(0.0, &car, false, DT);
        }
        assert_eq!(g.current_grip, 1.0);
    }

    #[test]
    fn hydroplane_grip_is_fixed() {
        let car = CarSettings::coupe();
        let mut g = GripState::default();
        assert_eq!(g.axle_grip(3.0, &car, true, DT), car.hydroplane_grip);
    }

    #[test]
    fn drift_boost_follows_steer_and_throttle() {
        let car = CarSettings::coupe();
        let f = frame();
        let lat = LateralForce { force: f.right * 1000.0, wanted_accel: 20.0 };
        assert_eq!(drift_boost(&f, 0.2, 0.0, &lat, &car), Vec3::zeros());
        let push = drift_boost(&f, 0.2, 1.0, &lat, &car);
        assert!(push.dot(&f.forward) > 0.0);
        assert!(push.dot(&f.right) > 0.0);
    }
}
