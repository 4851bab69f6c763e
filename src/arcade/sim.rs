// ==============================================================================
// sim.rs — PER-CAR ORCHESTRATION STEP
// ------------------------------------------------------------------------------
// CarSim owns every piece of mutable per-car state and runs one fixed step:
//
//   0) clock, pending respawn, collision check, due transitions
//   1) wheel contact (all four suspension forces applied before anything else)
//   2) wheel rpm, steering curve + traction control
//   3) drivetrain (rpm, clutch, shift grading, stall) -> events / effects
//   4) grounded: lateral grip per axle, drift, drive / burnout / LCS,
//      engine braking, brakes, handbrake
//      airborne: air control, self-righting
//   5) transition effects (lurch, traction penalty, collision damping),
//      aero, race data, snapshot
//
// Everything goes to the body as forces / impulses / velocity changes through
// CarBody. The only hard write is teleport() on respawn.
// ==============================================================================

use std::sync::Arc;

use nalgebra::Isometry3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::arcade::airborne::{AirInput, AirState};
use crate::arcade::assist::{self, BrakeAction, DriveInput, Handbrake, TcsInput};
use crate::arcade::body::{CarBody, CarFrame, Layer, Pos3, RayHit, Vec3, lerp};
use crate::arcade::drivetrain::{DriveEffect, DriveOutput, DrivetrainInput, DrivetrainState, EngineState};
use crate::arcade::grip::{self, AxleContact, DriftChange, GripState};
use crate::arcade::telemetry::{CarEvent, RaceData, RaceTelemetrySnapshot, TelemetryRecorder};
use crate::arcade::transitions::{Clock, TransitionKind, Transitions};
use crate::arcade::wheel::Wheel;
use crate::config::{CarSettings, EngineSettings, MPH_PER_MS};

pub const STALL_BRAKE: f32 = 0.3;             // fraction of forward momentum
pub const MONEY_SHIFT_KICK: f32 = 40.0;       // N*m per kg, pitch
pub const START_KICK: f32 = 2.0;              // N*m per kg, roll
pub const LURCH_ACCEL: f32 = 6.0;             // m/s^2 per unit severity
pub const TRACTION_PENALTY_FLOOR: f32 = 0.4;
pub const COLLISION_DAMPING_RATE: f32 = 4.0;  // 1/s
pub const RECORDER_CAPACITY: usize = 60 * 60 * 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CarInput {
    pub throttle: f32,      // 0..1
    pub brake: f32,         // 0..1
    pub steer: f32,         // -1..1, positive = right
    pub handbrake: bool,
    pub pitch: f32,         // -1..1, air control
    pub air_roll: bool,
    pub analog: bool,       // controller-style throttle, never pushed past the launch control limit
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CarCommand {
    Throttle(f32),
    Brake(f32),
    Steer(f32),
    Handbrake(bool),
    Pitch(f32),
    AirRoll(bool),
    Analog(bool),
    GearUp,
    GearDown,
    SetGear(i32),
    ClutchIn,
    ClutchOut,
    Boost,
    StartEngine,
    Respawn,
    AutoShift(bool),
    AntiStall(bool),
    Record(bool),
}

/// Forwards to the real body and sums every velocity change the core asks for,
/// so anything left over next step can be blamed on a collision.
struct TrackedBody<'a, B: CarBody + ?Sized> {
    inner: &'a mut B,
    dt: f32,
    requested: Vec3,
    teleported: bool,
}

impl<'a, B: CarBody + ?Sized> TrackedBody<'a, B> {
    fn new(inner: &'a mut B, dt: f32) -> Self {
        Self { inner, dt, requested: Vec3::zeros(), teleported: false }
    }

    fn per_kg(&self) -> f32 {
        let m = self.inner.mass();
        if m > 0.0 { 1.0 / m } else { 0.0 }
    }
}

impl<B: CarBody + ?Sized> CarBody for TrackedBody<'_, B> {
    fn pose(&self) -> Isometry3<f32> {
        self.inner.pose()
    }

    fn mass(&self) -> f32 {
        self.inner.mass()
    }

    fn linvel(&self) -> Vec3 {
        self.inner.linvel()
    }

    fn angvel(&self) -> Vec3 {
        self.inner.angvel()
    }

    fn velocity_at_point(&self, point: &Pos3) -> Vec3 {
        self.inner.velocity_at_point(point)
    }

    fn cast_ray(&self, origin: Pos3, dir: Vec3, max_dist: f32, layer: Layer) -> Option<RayHit> {
        self.inner.cast_ray(origin, dir, max_dist, layer)
    }

    fn apply_force_at_position(&mut self, force: Vec3, point: Pos3) {
        let dv = force * self.per_kg() * self.dt;
        self.requested += dv;
        self.inner.apply_force_at_position(force, point);
    }

    fn apply_force(&mut self, force: Vec3) {
        let dv = force * self.per_kg() * self.dt;
        self.requested += dv;
        self.inner.apply_force(force);
    }

    fn apply_torque(&mut self, torque: Vec3) {
        self.inner.apply_torque(torque);
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        let dv = impulse * self.per_kg();
        self.requested += dv;
        self.inner.apply_impulse(impulse);
    }

    fn add_velocity_change(&mut self, dv: Vec3) {
        self.requested += dv;
        self.inner.add_velocity_change(dv);
    }

    fn add_angular_velocity_change(&mut self, dw: Vec3) {
        self.inner.add_angular_velocity_change(dw);
    }

    fn teleport(&mut self, pose: Isometry3<f32>) {
        self.teleported = true;
        self.inner.teleport(pose);
    }
}

pub struct CarSim {
    pub car: Arc<CarSettings>,
    pub engine: Arc<EngineSettings>,
    pub wheels: [Wheel; 4],
    pub drivetrain: DrivetrainState,
    pub grip: GripState,
    pub air: AirState,
    pub input: CarInput,
    pub race: RaceData,

    handbrake: Handbrake,
    transitions: Transitions,
    clock: Clock,
    rng: StdRng,
    events: Vec<CarEvent>,
    spawn_pose: Isometry3<f32>,
    steer_angle: f32,
    throttle: f32,
    braking: bool,
    respawn_requested: bool,
    last_velocity: Option<Vec3>,
    requested_dv: Vec3,
    recorder: TelemetryRecorder,
    snapshot: RaceTelemetrySnapshot,
}

impl CarSim {
    pub fn new(car: Arc<CarSettings>, engine: Arc<EngineSettings>, spawn_pose: Isometry3<f32>, seed: u64) -> Self {
        let wheels = Wheel::layout(&car);
        let snapshot = RaceTelemetrySnapshot {
            tick: 0,
            position: spawn_pose.translation.vector.into(),
            orientation: spawn_pose.rotation.coords.into(),
            speed: 0.0,
            engine_rpm: 0.0,
            gear: 0,
            steer_angle: 0.0,
            throttle: 0.0,
            drifting: false,
            boosting: false,
            braking: false,
        };

        Self {
            car,
            engine,
            wheels,
            drivetrain: DrivetrainState::new(),
            grip: GripState::default(),
            air: AirState::default(),
            input: CarInput::default(),
            race: RaceData::default(),
            handbrake: Handbrake::default(),
            transitions: Transitions::new(),
            clock: Clock::default(),
            rng: StdRng::seed_from_u64(seed),
            events: Vec::new(),
            spawn_pose,
            steer_angle: 0.0,
            throttle: 0.0,
            braking: false,
            respawn_requested: false,
            last_velocity: None,
            requested_dv: Vec3::zeros(),
            recorder: TelemetryRecorder::new(RECORDER_CAPACITY),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> RaceTelemetrySnapshot {
        self.snapshot
    }

    pub fn recorder(&self) -> &TelemetryRecorder {
        &self.recorder
    }

    pub fn drain_events(&mut self) -> Vec<CarEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_spawn_pose(&mut self, pose: Isometry3<f32>) {
        self.spawn_pose = pose;
    }

    pub fn spawn_pose(&self) -> Isometry3<f32> {
        self.spawn_pose
    }

    pub fn steer_angle(&self) -> f32 {
        self.steer_angle
    }

    pub fn is_boosting(&self) -> bool {
        self.transitions.is_active(TransitionKind::Boost)
    }

    pub fn transitions(&self) -> &Transitions {
        &self.transitions
    }

    /// Mean rpm of the driven wheels.
    pub fn drive_wheel_rpm(&self) -> f32 {
        let (sum, n) = self
            .wheels
            .iter()
            .filter(|w| w.drive)
            .fold((0.0, 0), |(s, n), w| (s + w.rpm, n + 1));
        if n == 0 { 0.0 } else { sum / n as f32 }
    }

    // --------------------------------------------------------------------------
    // Commands
    // --------------------------------------------------------------------------

    /// Returns false when the command was rejected (guard, range, state).
    pub fn apply_command(&mut self, command: CarCommand) -> bool {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        let engine = Arc::clone(&self.engine);
        let mut out = DriveOutput::default();

        let accepted = match command {
            CarCommand::Throttle(v) => {
                self.input.throttle = finite(v).clamp(0.0, 1.0);
                true
            }
            CarCommand::Brake(v) => {
                self.input.brake = finite(v).clamp(0.0, 1.0);
                true
            }
            CarCommand::Steer(v) => {
                self.input.steer = finite(v).clamp(-1.0, 1.0);
                true
            }
            CarCommand::Pitch(v) => {
                self.input.pitch = finite(v).clamp(-1.0, 1.0);
                true
            }
            CarCommand::Handbrake(on) => {
                self.input.handbrake = on;
                true
            }
            CarCommand::AirRoll(on) => {
                self.input.air_roll = on;
                true
            }
            CarCommand::Analog(on) => {
                self.input.analog = on;
                true
            }
            CarCommand::GearUp => self.drivetrain.shift_up(&engine, &mut self.transitions, &self.clock),
            CarCommand::GearDown => self.drivetrain.shift_down(&engine, &mut self.transitions, &self.clock),
            CarCommand::SetGear(gear) => self.drivetrain.select_gear(&engine, gear, &mut self.transitions, &mut out),
            CarCommand::ClutchIn => {
                self.drivetrain.clutch_in = true;
                true
            }
            CarCommand::ClutchOut => {
                self.drivetrain.clutch_in = false;
                true
            }
            CarCommand::Boost => self.start_boost(),
            CarCommand::StartEngine => self.drivetrain.start_engine(&engine, &mut self.transitions, &self.clock, &mut out),
            CarCommand::Respawn => {
                self.respawn_requested = true;
                true
            }
            CarCommand::AutoShift(on) => {
                self.drivetrain.auto_shift = on;
                true
            }
            CarCommand::AntiStall(on) => {
                self.drivetrain.anti_stall = on;
                true
            }
            CarCommand::Record(on) => {
                self.recorder.recording = on;
                if on {
                    self.recorder.clear();
                }
                true
            }
        };

        if !accepted {
            debug!(?command, "command rejected");
        }
        self.absorb(out);
        accepted
    }

    fn start_boost(&mut self) -> bool {
        if !self.transitions.schedule(TransitionKind::Boost, &self.clock, self.car.boost_duration) {
            return false;
        }
        self.race.boost_count += 1;
        self.events.push(CarEvent::BoostStarted);
        true
    }

    /// Events into the outbox, shift grades / gear changes / stalls into race data.
    fn absorb(&mut self, out: DriveOutput) {
        if let Some(grade) = out.grade {
            self.race.record_shift_grade(grade.quality(), grade.is_perfect());
        }
        for event in &out.events {
            match event {
                CarEvent::GearChanged { .. } => self.race.total_shifts += 1,
                CarEvent::EngineStall { .. } => self.race.stalls += 1,
                _ => {}
            }
        }
        self.events.extend(out.events);
    }

    // --------------------------------------------------------------------------
    // Respawn
    // --------------------------------------------------------------------------

    /// Hard reset to the stored spawn pose. Pending transitions are superseded.
    pub fn respawn<B: CarBody + ?Sized>(&mut self, body: &mut B) {
        self.respawn_requested = false;
        body.teleport(self.spawn_pose);

        for wheel in &mut self.wheels {
            wheel.reset();
        }
        self.grip.reset();
        self.air.reset();
        self.handbrake = Handbrake::default();
        self.steer_angle = 0.0;
        self.throttle = 0.0;
        self.braking = false;
        self.last_velocity = None;
        self.requested_dv = Vec3::zeros();

        self.transitions.supersede();
        let engine = Arc::clone(&self.engine);
        self.drivetrain.reset_transients(&engine);

        // superseded start / recovery sequences are restarted from scratch
        let mut out = DriveOutput::default();
        match self.drivetrain.engine {
            EngineState::Starting => {
                self.drivetrain.engine = EngineState::Off;
                self.drivetrain.start_engine(&engine, &mut self.transitions, &self.clock, &mut out);
            }
            EngineState::Stalled if engine.auto_restart => {
                self.transitions
                    .schedule(TransitionKind::StallRecovery, &self.clock, engine.stall_recovery_delay);
            }
            _ => {}
        }
        self.absorb(out);

        info!(tick = self.clock.tick, "car respawned");
        self.events.push(CarEvent::Respawned);
    }

    // --------------------------------------------------------------------------
    // Step
    // --------------------------------------------------------------------------

    pub fn step<B: CarBody + ?Sized>(&mut self, body: &mut B, dt: f32) {
        if !(dt > 0.0 && dt.is_finite()) {
            return;
        }
        self.clock.advance(dt);

        if self.respawn_requested {
            self.respawn(&mut *body);
        }
        self.detect_collision(&*body);

        let car = Arc::clone(&self.car);
        let engine = Arc::clone(&self.engine);
        let mut body = TrackedBody::new(body, dt);
        let mut out = DriveOutput::default();

        self.resume_transitions(&engine, &mut out);

        let frame = CarFrame::new(body.pose(), &car);
        let mass = body.mass();
        let linvel = body.linvel();
        let speed = linvel.norm();
        let flat_velocity = frame.flatten(linvel);
        let forward_speed = linvel.dot(&frame.forward);

        // 1) suspension, all four first
        let prev_steer = self.steer_angle;
        let forces: Vec<_> = self
            .wheels
            .iter_mut()
            .map(|w| w.update_contact(&body, &frame, &car, prev_steer, dt))
            .collect();
        for f in &forces {
            body.apply_force_at_position(f.force, f.at);
        }

        let front_grounded = self.wheels.iter().any(|w| w.steering && w.grounded);
        let rear_grounded = self.wheels.iter().any(|w| w.drive && w.grounded);
        let any_grounded = self.wheels.iter().any(|w| w.grounded);
        let front_hydro = self.wheels.iter().any(|w| w.steering && w.hydroplaning);
        let rear_hydro = self.wheels.iter().any(|w| w.drive && w.hydroplaning);

        // 2) steering + traction control
        let handbrake_on = self.handbrake.update(self.input.handbrake, self.clock.time, dt);
        let steer_factor = car.steer_curve.get_output(speed * MPH_PER_MS);
        let raw_steer = self.input.steer * car.max_steer_radians() * steer_factor;
        let tcs = assist::traction_control(
            &car,
            &TcsInput {
                steer_angle: raw_steer,
                speed,
                drifting: self.grip.drift.drifting,
                hydroplaning: front_hydro,
                forward_traction: self.drivetrain.forward_traction,
                assists_disabled: self.handbrake.assists_disabled(self.clock.time),
                grounded: front_grounded,
            },
        );
        self.steer_angle = tcs.angle;
        self.drivetrain.tcs_fraction = tcs.fraction;
        if tcs.at_edge {
            self.race.grip_edge_time += dt;
        }

        for wheel in &mut self.wheels {
            wheel.update_rpm(&body, &frame, self.steer_angle);
        }

        // 3) drivetrain
        let boosting = self.transitions.is_active(TransitionKind::Boost);
        let drive_input = DrivetrainInput {
            throttle: self.input.throttle,
            grounded: rear_grounded,
            drive_wheel_rpm: self.drive_wheel_rpm(),
            speed,
            boosting,
            launch_max_speed: car.launch_max_speed,
        };
        self.drivetrain
            .step(&engine, &drive_input, &mut self.transitions, &self.clock, &mut self.rng, &mut out);
        for effect in &out.effects {
            self.apply_effect(&mut body, &frame, *effect, forward_speed);
        }

        // drift state from the steering axle
        let front = AxleContact {
            point: frame.front_axle,
            lateral: frame.steered_right(self.steer_angle),
            velocity: body.velocity_at_point(&frame.front_axle),
            grounded: front_grounded,
            hydroplaning: front_hydro,
        };
        let front_wanted = if front.grounded {
            grip::wanted_lateral_accel(frame.flatten(front.velocity), front.lateral, car.slip_coefficient, dt)
        } else {
            0.0
        };
        let position = Pos3::from(frame.pose.translation.vector);
        match self
            .grip
            .update_drift(front_wanted, car.max_cornering_accel, front_hydro, position, self.clock.time)
        {
            Some(DriftChange::Started) => {
                debug!("drift started");
                self.events.push(CarEvent::DriftStarted);
            }
            Some(DriftChange::Ended { distance, time }) => {
                self.race.longest_drift = self.race.longest_drift.max(distance);
                self.race.total_drift_distance += distance;
                self.race.total_drift_time += time;
                self.events.push(CarEvent::DriftEnded { distance, time });
            }
            None => {}
        }

        // 4) forces
        self.throttle = 0.0;
        self.braking = false;
        if any_grounded {
            self.air.landed();

            let front_grip = self.grip.axle_grip(front_wanted, &car, front_hydro, dt);
            let front_force = grip::lateral_force(&frame, &front, front_grip, &car, mass, dt);
            body.apply_force_at_position(front_force.force, frame.front_axle);

            let rear = AxleContact {
                point: frame.rear_axle,
                lateral: frame.right,
                velocity: body.velocity_at_point(&frame.rear_axle),
                grounded: rear_grounded,
                hydroplaning: rear_hydro,
            };
            let rear_base = if rear_hydro { car.hydroplane_grip } else { self.grip.current_grip };
            let rear_grip = rear_base * self.drivetrain.forward_traction;
            let rear_force = grip::lateral_force(&frame, &rear, rear_grip, &car, mass, dt);
            body.apply_force_at_position(rear_force.force, frame.rear_axle);

            let drifting = self.grip.drift.drifting;
            if drifting {
                body.apply_force(grip::drift_boost(&frame, self.steer_angle, self.input.throttle, &front_force, &car));
                body.apply_torque(grip::drift_yaw_torque(&frame, self.input.steer, &car, mass));
            }

            let driving = self.drivetrain.produces_drive() && rear_grounded && self.input.throttle > 0.0;
            if driving {
                let outcome = assist::drive_force(
                    &car,
                    &engine,
                    &mut self.drivetrain,
                    &DriveInput {
                        throttle: self.input.throttle,
                        brake: self.input.brake,
                        analog: self.input.analog,
                        speed,
                        hydroplaning: rear_hydro,
                        boost_multiplier: if boosting { car.boost_multiplier } else { 1.0 },
                        mass,
                    },
                );
                self.throttle = outcome.throttle;

                let mut push = frame.forward * outcome.force * self.drivetrain.forward_traction;
                if drifting {
                    push = assist::drift_redirect(push, flat_velocity, car.drift_control);
                }
                body.apply_force_at_position(push, frame.rear_axle);

                let kick = assist::burnout_side_kick(&frame, flat_velocity, self.drivetrain.forward_traction, mass);
                body.apply_force_at_position(kick, frame.rear_axle);
            } else {
                assist::relax_traction(&mut self.drivetrain);
                self.drivetrain.burning_out = false;
                self.drivetrain.lcs_active = false;
                if rear_grounded {
                    let f = assist::engine_brake_force(&engine, self.drivetrain.engine_rpm, forward_speed, mass, dt);
                    body.apply_force_at_position(frame.forward * f, frame.rear_axle);
                }
            }

            if self.input.brake > 0.0 {
                self.braking = true;
                let decel = car.brake_decel * self.input.brake;
                match assist::brake(flat_velocity, decel, mass, dt) {
                    BrakeAction::Force(f) => body.apply_force(f),
                    BrakeAction::Stop(dv) => body.add_velocity_change(dv),
                    BrakeAction::None => {}
                }
            }

            if handbrake_on && rear_grounded {
                self.braking = true;
                let rear_flat = frame.flatten(rear.velocity);
                match assist::brake(rear_flat, car.handbrake_decel, mass, dt) {
                    BrakeAction::Force(f) => body.apply_force_at_position(f, frame.rear_axle),
                    BrakeAction::Stop(dv) => body.add_velocity_change(dv),
                    BrakeAction::None => {}
                }
            }

            let downforce = -frame.up * speed * speed * car.downforce_ratio * mass;
            body.apply_force(downforce);
        } else {
            assist::relax_traction(&mut self.drivetrain);
            let air_input = AirInput {
                steer: self.input.steer,
                pitch: self.input.pitch,
                air_roll: self.input.air_roll,
            };
            self.air.step(&mut body, &frame, &car, &air_input, dt);
        }

        // 5) timed effects + aero
        self.apply_transition_effects(&mut body, &frame, mass);

        if speed > 0.0 && speed.is_finite() {
            body.apply_force(-linvel * speed * car.drag * mass);
        }

        self.requested_dv = body.requested;
        if body.teleported {
            self.last_velocity = None;
        }

        self.absorb(out);
        self.race.max_speed = self.race.max_speed.max(speed);
        self.write_snapshot(&frame, speed, boosting);
    }

    fn resume_transitions(&mut self, engine: &EngineSettings, out: &mut DriveOutput) {
        for transition in self.transitions.advance(self.clock.tick) {
            match transition.kind {
                TransitionKind::EngineStart => self.drivetrain.finish_start(engine, out),
                TransitionKind::GearShift { to } => {
                    let wheel_rpm = self.drive_wheel_rpm();
                    self.drivetrain.finish_shift(engine, to, wheel_rpm, out);
                }
                TransitionKind::StallRecovery => {
                    if self.drivetrain.engine == EngineState::Stalled {
                        self.drivetrain.start_engine(engine, &mut self.transitions, &self.clock, out);
                    }
                }
                TransitionKind::Boost => debug!("boost finished"),
                TransitionKind::Lurch { .. } | TransitionKind::TractionPenalty | TransitionKind::CollisionDamping => {}
            }
        }
    }

    fn apply_effect<B: CarBody + ?Sized>(&mut self, body: &mut B, frame: &CarFrame, effect: DriveEffect, forward_speed: f32) {
        let mass = body.mass();
        match effect {
            DriveEffect::LaunchBoost => body.add_velocity_change(frame.forward * (self.car.launch_boost / MPH_PER_MS)),
            DriveEffect::StallBrake => body.apply_impulse(-frame.forward * forward_speed * mass * STALL_BRAKE),
            DriveEffect::MoneyShiftKick => body.apply_torque(frame.right * MONEY_SHIFT_KICK * mass),
            DriveEffect::StartKick => body.apply_torque(frame.forward * START_KICK * mass),
        }
    }

    fn apply_transition_effects<B: CarBody + ?Sized>(&mut self, body: &mut B, frame: &CarFrame, mass: f32) {
        let now = self.clock.tick;

        if let Some(t) = self.transitions.active(TransitionKind::Lurch { severity: 0.0 }) {
            if let TransitionKind::Lurch { severity } = t.kind {
                let fade = 1.0 - t.progress(now);
                body.apply_force(frame.forward * severity * LURCH_ACCEL * mass * fade);
            }
        }

        if let Some(t) = self.transitions.active(TransitionKind::TractionPenalty) {
            let cap = lerp(TRACTION_PENALTY_FLOOR, 1.0, t.progress(now));
            self.drivetrain.forward_traction = self.drivetrain.forward_traction.min(cap);
        }

        if self.transitions.is_active(TransitionKind::CollisionDamping) {
            let angvel = body.angvel();
            if angvel.iter().all(|c| c.is_finite()) {
                let k = (COLLISION_DAMPING_RATE * self.clock.dt).min(1.0);
                body.add_angular_velocity_change(-angvel * k);
            }
        }
    }

    /// Velocity change the core did not ask for since last step.
    fn detect_collision<B: CarBody + ?Sized>(&mut self, body: &B) {
        let now = body.linvel();
        let expected = self.last_velocity.map(|v| v + self.requested_dv);
        self.last_velocity = Some(now);

        let Some(expected) = expected else { return };
        let impact = (now - expected).norm();
        if !impact.is_finite() || impact <= self.car.collision_delta_v {
            return;
        }

        self.race.collisions += 1;
        self.events.push(CarEvent::CollisionWithDamage { impact });
        self.transitions
            .schedule(TransitionKind::CollisionDamping, &self.clock, self.car.collision_damping_time);
        info!(impact, "collision");
    }

    fn write_snapshot(&mut self, frame: &CarFrame, speed: f32, boosting: bool) {
        self.snapshot = RaceTelemetrySnapshot {
            tick: self.clock.tick,
            position: frame.pose.translation.vector.into(),
            orientation: frame.pose.rotation.coords.into(),
            speed,
            engine_rpm: self.drivetrain.engine_rpm,
            gear: self.drivetrain.gear,
            steer_angle: self.steer_angle,
            throttle: self.throttle,
            drifting: self.grip.drift.drifting,
            boosting,
            braking: self.braking,
        };
        self.recorder.push(self.snapshot);
    }
}
