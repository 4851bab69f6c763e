// ==============================================================================
// assist.rs — FORWARD DRIVE FORCE + STABILITY ASSISTS
// ------------------------------------------------------------------------------
// Drive (grounded, in gear, clutch out, ignition on):
//   k      = power(rpm) * sign(gear) * boost * (1 - tcs_fraction * tcs_braking)
//   F      = k * throttle                     (N along chassis forward)
//   wanted = |F| / mass - drag * v^2
//   wanted > burnout_threshold:
//     burnout allowed  -> forward_traction -> (burnout / wanted)^2
//                         (min 0.5 when already burning out or hydroplaning)
//     launch control   -> throttle solved so wanted = 0.9 * burnout
//   otherwise forward_traction -> 1
//
// TCS (steering axle): bicycle model a = v^2 tan(delta) / wheelbase.
//   a > max_cornering -> delta clamped so a = 0.9 * max, tcs_fraction recorded
//   0.8..1.0 of max   -> "grip edge" time for scoring
//
// Brakes never reverse the flat velocity within a step; below 1 mph they stop
// the car outright.
// ==============================================================================

use crate::arcade::body::{CarFrame, Vec3, lerp, safe_normalize};
use crate::arcade::drivetrain::DrivetrainState;
use crate::config::{CarSettings, EngineSettings, MPH_PER_MS};

pub const LCS_TARGET: f32 = 0.9;
pub const TCS_TARGET: f32 = 0.9;
pub const GRIP_EDGE_LOW: f32 = 0.8;
pub const TRACTION_LERP: f32 = 0.1;
pub const BURNOUT_TRACTION_CAP: f32 = 0.5;
pub const BRAKE_STAND_SPEED: f32 = 5.0;       // m/s
pub const BURNOUT_SIDE_KICK: f32 = 2.0;       // 1/s
pub const ENGINE_BRAKE_MIN_SPEED: f32 = 0.01; // m/s
pub const BRAKE_SNAP_SPEED: f32 = 1.0 / MPH_PER_MS;
pub const HANDBRAKE_DEBOUNCE: f32 = 0.1;      // s
pub const ASSIST_DISABLE_BUFFER: f32 = 0.5;   // s

/// Drive force at the rear axle for full throttle, before gear sign and assists.
pub fn engine_power(engine: &EngineSettings, rpm: f32) -> f32 {
    if engine.redline <= 0.0 {
        return 0.0;
    }
    engine.max_power * engine.power_curve.get_output((rpm / engine.redline).clamp(0.0, 1.0))
}

#[derive(Debug, Clone, Copy)]
pub struct DriveInput {
    pub throttle: f32,
    pub brake: f32,
    pub analog: bool,           // controller-style throttle
    pub speed: f32,             // m/s
    pub hydroplaning: bool,
    pub boost_multiplier: f32,  // 1 when not boosting
    pub mass: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveOutcome {
    pub force: f32,             // signed, along chassis forward, before traction scaling
    pub throttle: f32,          // throttle after launch control
    pub wanted_accel: f32,
}

/// Drive force + burnout / launch-control bookkeeping on the drivetrain state.
pub fn drive_force(car: &CarSettings, engine: &EngineSettings, state: &mut DrivetrainState, input: &DriveInput) -> DriveOutcome {
    let mass = input.mass.max(1e-3);
    let throttle = input.throttle.clamp(0.0, 1.0);
    let per_throttle = engine_power(engine, state.engine_rpm)
        * state.gear_sign()
        * input.boost_multiplier
        * (1.0 - state.tcs_fraction * car.tcs_braking);

    let drag_accel = car.drag * input.speed * input.speed;
    let wanted = (per_throttle * throttle).abs() / mass - drag_accel;
    let mut effective = throttle;

    if wanted > car.burnout_threshold {
        let brake_stand = input.speed < BRAKE_STAND_SPEED && input.brake > 0.5 && throttle > 0.5;
        let over_limit = wanted - car.burnout_threshold > car.lcs_limit && !input.analog;

        if over_limit || brake_stand || !car.lcs_enabled {
            let mut target = (car.burnout_threshold / wanted).powi(2);
            if state.burning_out || input.hydroplaning {
                target = target.min(BURNOUT_TRACTION_CAP);
            }
            state.forward_traction = lerp(state.forward_traction, target, TRACTION_LERP);
            state.burning_out = true;
            state.lcs_active = false;
        } else {
            if per_throttle.abs() > 1e-3 {
                effective = ((LCS_TARGET * car.burnout_threshold + drag_accel) * mass / per_throttle.abs()).clamp(0.0, throttle);
            }
            state.lcs_active = true;
            state.burning_out = false;
            relax_traction(state);
        }
    } else {
        state.lcs_active = false;
        state.burning_out = false;
        relax_traction(state);
    }

    DriveOutcome {
        force: per_throttle * effective,
        throttle: effective,
        wanted_accel: (per_throttle * effective).abs() / mass - drag_accel,
    }
}

pub fn relax_traction(state: &mut DrivetrainState) {
    state.forward_traction = lerp(state.forward_traction, 1.0, TRACTION_LERP);
    if state.forward_traction > 0.9999 {
        state.forward_traction = 1.0;
    }
}

/// Rotates the part of the drive force that fights the slide toward the
/// direction of travel.
pub fn drift_redirect(force: Vec3, flat_velocity: Vec3, drift_control: f32) -> Vec3 {
    let Some(dir) = safe_normalize(flat_velocity) else { return force };
    let along = dir * force.dot(&dir);
    let wasted = force - along;
    let k = drift_control.clamp(0.0, 1.0);
    along + wasted * (1.0 - k) + dir * (wasted.norm() * k)
}

/// Spinning rear end kicking the car further sideways.
pub fn burnout_side_kick(frame: &CarFrame, flat_velocity: Vec3, forward_traction: f32, mass: f32) -> Vec3 {
    let lateral = flat_velocity.dot(&frame.right);
    frame.right * lateral * (1.0 - forward_traction) * mass * BURNOUT_SIDE_KICK
}

/// Engine braking along chassis forward. Never reverses the car within a step.
pub fn engine_brake_force(engine: &EngineSettings, rpm: f32, forward_speed: f32, mass: f32, dt: f32) -> f32 {
    if forward_speed.abs() < ENGINE_BRAKE_MIN_SPEED || engine.redline <= 0.0 || dt <= 0.0 {
        return 0.0;
    }
    let magnitude = (rpm / engine.redline).clamp(0.0, 1.0) * engine.engine_braking * mass;
    -forward_speed.signum() * magnitude.min(forward_speed.abs() * mass / dt)
}

// --------------------------------------------------------------------------
// Traction control
// --------------------------------------------------------------------------

#[inline]
pub fn cornering_accel(speed: f32, steer_angle: f32, wheelbase: f32) -> f32 {
    if wheelbase <= 0.0 {
        return 0.0;
    }
    speed * speed * steer_angle.abs().tan() / wheelbase
}

#[derive(Debug, Clone, Copy)]
pub struct TcsInput {
    pub steer_angle: f32,
    pub speed: f32,
    pub drifting: bool,
    pub hydroplaning: bool,
    pub forward_traction: f32,
    pub assists_disabled: bool,
    pub grounded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcsResult {
    pub angle: f32,
    pub fraction: f32,
    pub at_edge: bool,
}

pub fn traction_control(car: &CarSettings, input: &TcsInput) -> TcsResult {
    let accel = cornering_accel(input.speed, input.steer_angle, car.wheelbase);
    let max = car.max_cornering_accel;

    let engaged = car.tcs_enabled
        && input.grounded
        && !input.drifting
        && !input.hydroplaning
        && input.forward_traction >= 0.999
        && !input.assists_disabled;

    if engaged && accel > max && input.speed > 1e-3 {
        let limited = (TCS_TARGET * max * car.wheelbase / (input.speed * input.speed)).atan();
        let angle = limited.min(input.steer_angle.abs()) * input.steer_angle.signum();
        return TcsResult {
            angle,
            fraction: 1.0 - angle.abs() / input.steer_angle.abs(),
            at_edge: false,
        };
    }

    TcsResult {
        angle: input.steer_angle,
        fraction: 0.0,
        at_edge: input.grounded && accel >= GRIP_EDGE_LOW * max && accel <= max,
    }
}

// --------------------------------------------------------------------------
// Brakes
// --------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrakeAction {
    None,
    Force(Vec3),
    /// Velocity change that cancels the remaining flat velocity.
    Stop(Vec3),
}

pub fn brake(flat_velocity: Vec3, decel: f32, mass: f32, dt: f32) -> BrakeAction {
    let speed = flat_velocity.norm();
    if decel <= 0.0 || dt <= 0.0 || !speed.is_finite() || speed < 1e-6 {
        return BrakeAction::None;
    }
    if speed < BRAKE_SNAP_SPEED {
        return BrakeAction::Stop(-flat_velocity);
    }
    let magnitude = (decel * mass).min(speed * mass / dt);
    BrakeAction::Force(-flat_velocity / speed * magnitude)
}

/// Debounced handbrake; a pull also disables assists for a short buffer.
#[derive(Debug, Clone, Default)]
pub struct Handbrake {
    held_for: f32,
    disabled_until: f32,
}

impl Handbrake {
    /// True once the handbrake has been held past the debounce window.
    pub fn update(&mut self, held: bool, time: f32, dt: f32) -> bool {
        if !held {
            self.held_for = 0.0;
            return false;
        }
        self.held_for += dt;
        if self.held_for >= HANDBRAKE_DEBOUNCE {
            self.disabled_until = time + ASSIST_DISABLE_BUFFER;
            true
        } else {
            false
        }
    }

    pub fn assists_disabled(&self, time: f32) -> bool {
        time < self.disabled_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcade::drivetrain::EngineState;
    use nalgebra::Isometry3;

    const DT: f32 = 1.0 / 60.0;

    fn running(gear: i32, rpm: f32) -> DrivetrainState {
        let mut s = DrivetrainState::new();
        s.engine = EngineState::Running;
        s.gear = gear;
        s.engine_rpm = rpm;
        s
    }

    fn input(throttle: f32) -> DriveInput {
        DriveInput {
            throttle,
            brake: 0.0,
            analog: false,
            speed: 0.0,
            hydroplaning: false,
            boost_multiplier: 1.0,
            mass: 1200.0,
        }
    }

    #[test]
    fn reverse_pushes_backwards() {
        let car = CarSettings::coupe();
        let engine = EngineSettings::coupe();
        let mut s = running(-1, 2000.0);
        let out = drive_force(&car, &engine, &mut s, &input(0.3));
        assert!(out.force < 0.0);
    }

    #[test]
    fn launch_control_caps_throttle_near_burnout() {
        let mut car = CarSettings::coupe();
        car.burnout_threshold = 6.0;
        car.lcs_limit = 10.0;
        let engine = EngineSettings::coupe();
        let mut s = running(1, 4900.0);

        let out = drive_force(&car, &engine, &mut s, &input(1.0));
        assert!(s.lcs_active);
        assert!(out.throttle < 1.0);
        assert!((out.wanted_accel - LCS_TARGET * car.burnout_threshold).abs() < 1e-3);
        assert_eq!(s.forward_traction, 1.0);
    }

    #[test]
    fn burnout_drops_forward_traction() {
        let mut car = CarSettings::coupe();
        car.lcs_enabled = false;
        car.burnout_threshold = 4.0;
        let engine = EngineSettings::coupe();
        let mut s = running(1, 4900.0);

        let out = drive_force(&car, &engine, &mut s, &input(1.0));
        assert!(s.burning_out);
        assert_eq!(out.throttle, 1.0);
        let target = (car.burnout_threshold / out.wanted_accel).powi(2);
        assert!((s.forward_traction - lerp(1.0, target, TRACTION_LERP)).abs() < 1e-5);

        for _ in 0..200 {
            drive_force(&car, &engine, &mut s, &input(1.0));
        }
        assert!(s.forward_traction <= BURNOUT_TRACTION_CAP + 1e-4);
    }

    #[test]
    fn brake_stand_forces_burnout_even_with_lcs() {
        let mut car = CarSettings::coupe();
        car.burnout_threshold = 6.0;
        car.lcs_limit = 10.0;
        let engine = EngineSettings::coupe();
        let mut s = running(1, 4900.0);
        let mut inp = input(1.0);
        inp.brake = 1.0;
        drive_force(&car, &engine, &mut s, &inp);
        assert!(s.burning_out);
        assert!(!s.lcs_active);
    }

    #[test]
    fn tcs_clamps_to_limit() {
        let car = CarSettings::coupe();
        for speed in [8.0_f32, 15.0, 30.0, 60.0] {
            for steer in [0.05_f32, 0.2, -0.4] {
                let inp = TcsInput {
                    steer_angle: steer,
                    speed,
                    drifting: false,
                    hydroplaning: false,
                    forward_traction: 1.0,
                    assists_disabled: false,
                    grounded: true,
                };
                let out = traction_control(&car, &inp);
                let raw = cornering_accel(speed, steer, car.wheelbase);
                let got = cornering_accel(speed, out.angle, car.wheelbase);
                assert!(got <= car.max_cornering_accel + 1e-3);
                assert!(got <= raw + 1e-4);
                assert_eq!(out.angle.signum(), steer.signum());
                if raw <= car.max_cornering_accel {
                    assert_eq!(out.angle, steer);
                }
            }
        }
    }

    #[test]
    fn tcs_stays_out_while_drifting_or_after_handbrake() {
        let car = CarSettings::coupe();
        let mut inp = TcsInput {
            steer_angle: 0.4,
            speed: 30.0,
            drifting: true,
            hydroplaning: false,
            forward_traction: 1.0,
            assists_disabled: false,
            grounded: true,
        };
        assert_eq!(traction_control(&car, &inp).angle, 0.4);
        inp.drifting = false;
        inp.assists_disabled = true;
        assert_eq!(traction_control(&car, &inp).fraction, 0.0);
    }

    #[test]
    fn brake_never_reverses_and_snaps() {
        let v = Vec3::new(0.0, 0.0, 0.3);
        assert_eq!(brake(v, 12.0, 1000.0, DT), BrakeAction::Stop(-v));

        let v = Vec3::new(0.0, 0.0, 2.0);
        match brake(v, 1000.0, 1000.0, DT) {
            BrakeAction::Force(f) => assert!((f.z + 2.0 * 1000.0 / DT).abs() < 1.0),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(brake(Vec3::zeros(), 12.0, 1000.0, DT), BrakeAction::None);
    }

    #[test]
    fn engine_braking_is_zero_at_rest() {
        let engine = EngineSettings::coupe();
        assert_eq!(engine_brake_force(&engine, 3000.0, 0.0, 1200.0, DT), 0.0);
        assert!(engine_brake_force(&engine, 3000.0, 10.0, 1200.0, DT) < 0.0);
        assert!(engine_brake_force(&engine, 3000.0, -10.0, 1200.0, DT) > 0.0);
    }

    #[test]
    fn handbrake_debounce_and_buffer() {
        let mut hb = Handbrake::default();
        assert!(!hb.update(true, 0.0, 0.06));
        assert!(hb.update(true, 0.1, 0.06));
        assert!(!hb.update(false, 0.2, 0.06));
        assert!(hb.assists_disabled(0.5));
        assert!(!hb.assists_disabled(0.7));
    }

    #[test]
    fn redirect_keeps_magnitude_direction_of_travel() {
        let velocity = Vec3::new(1.0, 0.0, 0.0);
        let force = Vec3::new(0.0, 0.0, 100.0);
        let out = drift_redirect(force, velocity, 1.0);
        assert!((out - Vec3::new(100.0, 0.0, 0.0)).norm() < 1e-3);
        assert_eq!(drift_redirect(force, Vec3::zeros(), 1.0), force);
    }

    #[test]
    fn side_kick_needs_wheel_spin() {
        let frame = CarFrame::new(Isometry3::identity(), &CarSettings::coupe());
        let slide = frame.right * 2.0;
        assert_eq!(burnout_side_kick(&frame, slide, 1.0, 1200.0), Vec3::zeros());
        assert!(burnout_side_kick(&frame, slide, 0.5, 1200.0).dot(&frame.right) > 0.0);
    }
}
