// ==============================================================================
// drivetrain.rs — ENGINE + GEARBOX + CLUTCH STATE MACHINE
// ------------------------------------------------------------------------------
// Engine:  OFF -> STARTING -> RUNNING <-> STALLED
// Gear:    -1 reverse, 0 neutral, 1..N forward
// Clutch:  pedal in (free revving) / out (rpm driven by the wheels)
//
// RUNNING, per step:
//   target = max(idle + wobble, ignition ? throttle * redline : 0)
//   ideal  = rpm -> target at throttle_response (engine inertia)
//   in gear, clutch out:
//     wheel = wheel_rpm * diff * ratio(gear) * sign(gear)
//     first engaged step -> shift grade (launch / perfect / normal / bad)
//     rpm = lerp(ideal, wheel, grounded ? clutch_ratio : 0)
//     rpm = lerp(rpm, ideal, 1 - forward_traction)     (wheel spin)
//   neutral / clutch in: rpm = ideal
//   clutch_ratio -> 1 at clutch_sharpness
//   > redline - 100  : auto upshift, or fuel cut (+ occasional backfire)
//   > redline + 500  : money shift, forced stall + torque kick (latched)
//   < stall_rpm in gear, clutch out, throttle <= 0.3 : stall (or anti-stall idle)
//
// Paddle / automatic shifts are timed: clutch forced in and fuel cut for
// shift_duration, then the gear changes and rpm is resynced from the wheels.
// change_gear() itself is pure state mutation.
//
// Nothing here touches the chassis. Physical consequences come back as
// DriveEffect values for the orchestration step to turn into forces.
// ==============================================================================

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::arcade::body::lerp;
use crate::arcade::telemetry::CarEvent;
use crate::arcade::transitions::{Clock, TransitionKind, Transitions};
use crate::config::EngineSettings;

pub const IDLE_WOBBLE_RPM: f32 = 40.0;
pub const IDLE_WOBBLE_FREQ: f32 = 7.0;
pub const STARTER_FREQ: f32 = 25.0;
pub const LIMITER_MARGIN: f32 = 100.0;
pub const MONEY_SHIFT_MARGIN: f32 = 500.0;
pub const STALL_THROTTLE: f32 = 0.3;
pub const RPM_SPINDOWN: f32 = 3000.0;     // rpm per second with the engine dead
pub const LURCH_TIME: f32 = 0.3;
pub const TRACTION_PENALTY_TIME: f32 = 0.6;
pub const BACKFIRE_INTERVAL: f32 = 0.25;
pub const BACKFIRE_CHANCE: f64 = 0.3;
pub const DOWNSHIFT_BACKFIRE_CHANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Off,
    Starting,
    Running,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftGrade {
    PerfectLaunch,
    Perfect,
    Normal { quality: f32 },
    Bad { rpm_diff: f32 },
}

impl ShiftGrade {
    pub fn quality(&self) -> f32 {
        match *self {
            ShiftGrade::PerfectLaunch | ShiftGrade::Perfect => 1.0,
            ShiftGrade::Normal { quality } => quality,
            ShiftGrade::Bad { .. } => 0.0,
        }
    }

    pub fn is_perfect(&self) -> bool {
        matches!(self, ShiftGrade::PerfectLaunch | ShiftGrade::Perfect)
    }
}

/// Physical side effects the chassis layer must apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveEffect {
    LaunchBoost,
    StallBrake,
    MoneyShiftKick,
    StartKick,
}

#[derive(Debug, Default)]
pub struct DriveOutput {
    pub events: Vec<CarEvent>,
    pub effects: Vec<DriveEffect>,
    pub grade: Option<ShiftGrade>,
}

#[derive(Debug, Clone, Copy)]
pub struct DrivetrainInput {
    pub throttle: f32,
    pub grounded: bool,
    pub drive_wheel_rpm: f32,   // mean rpm of the driven wheels
    pub speed: f32,             // m/s
    pub boosting: bool,
    pub launch_max_speed: f32,  // m/s, from the car settings
}

#[derive(Debug, Clone)]
pub struct DrivetrainState {
    pub engine: EngineState,
    pub gear: i32,
    pub last_gear: i32,
    pub engine_rpm: f32,
    pub ideal_rpm: f32,
    pub wheel_rpm: f32,             // wheel-derived engine rpm
    pub clutch_in: bool,            // pedal
    pub forced_clutch_in: bool,     // held by a timed shift
    pub clutch_ratio: f32,
    pub fuel_cut: bool,
    pub forward_traction: f32,
    pub changing_gear: bool,

    // assists
    pub auto_shift: bool,
    pub anti_stall: bool,

    // assist layer bookkeeping (written by assist.rs)
    pub tcs_fraction: f32,
    pub burning_out: bool,
    pub lcs_active: bool,

    was_engaged: bool,
    engaged_gear: i32,
    skip_grade: bool,
    money_shift_latched: bool,
    last_backfire: f32,
}

impl DrivetrainState {
    pub fn new() -> Self {
        Self {
            engine: EngineState::Off,
            gear: 0,
            last_gear: 0,
            engine_rpm: 0.0,
            ideal_rpm: 0.0,
            wheel_rpm: 0.0,
            clutch_in: false,
            forced_clutch_in: false,
            clutch_ratio: 1.0,
            fuel_cut: false,
            forward_traction: 1.0,
            changing_gear: false,
            auto_shift: false,
            anti_stall: false,
            tcs_fraction: 0.0,
            burning_out: false,
            lcs_active: false,
            was_engaged: false,
            engaged_gear: 0,
            skip_grade: false,
            money_shift_latched: false,
            last_backfire: f32::NEG_INFINITY,
        }
    }

    pub fn clutch_disengaged(&self) -> bool {
        self.clutch_in || self.forced_clutch_in
    }

    /// In gear with the clutch out.
    pub fn engaged(&self) -> bool {
        self.gear != 0 && !self.clutch_disengaged()
    }

    pub fn is_running(&self) -> bool {
        self.engine == EngineState::Running
    }

    /// Whether the drivetrain may push the car this step.
    pub fn produces_drive(&self) -> bool {
        self.is_running() && !self.fuel_cut && !self.changing_gear && self.engaged()
    }

    pub fn gear_sign(&self) -> f32 {
        self.gear.signum() as f32
    }

    pub fn wheel_engine_rpm(cfg: &EngineSettings, drive_wheel_rpm: f32, gear: i32) -> f32 {
        drive_wheel_rpm * cfg.diff_ratio * cfg.gear_ratio(gear) * gear.signum() as f32
    }

    /// Respawn: everything transient back to a clean, running-if-it-was state.
    pub fn reset_transients(&mut self, cfg: &EngineSettings) {
        self.gear = 0;
        self.last_gear = 0;
        self.clutch_in = false;
        self.forced_clutch_in = false;
        self.clutch_ratio = 1.0;
        self.fuel_cut = false;
        self.forward_traction = 1.0;
        self.changing_gear = false;
        self.tcs_fraction = 0.0;
        self.burning_out = false;
        self.lcs_active = false;
        self.was_engaged = false;
        self.engaged_gear = 0;
        self.skip_grade = false;
        self.money_shift_latched = false;
        self.wheel_rpm = 0.0;
        self.engine_rpm = if self.is_running() { cfg.idle_rpm } else { 0.0 };
        self.ideal_rpm = self.engine_rpm;
    }

    // --------------------------------------------------------------------------
    // Engine start / stall
    // --------------------------------------------------------------------------

    pub fn start_engine(&mut self, cfg: &EngineSettings, transitions: &mut Transitions, clock: &Clock, out: &mut DriveOutput) -> bool {
        if !matches!(self.engine, EngineState::Off | EngineState::Stalled) {
            return false;
        }
        if !transitions.schedule(TransitionKind::EngineStart, clock, cfg.start_duration) {
            return false;
        }
        self.engine = EngineState::Starting;
        out.events.push(CarEvent::EngineStarting);
        true
    }

    pub fn finish_start(&mut self, cfg: &EngineSettings, out: &mut DriveOutput) {
        if self.engine != EngineState::Starting {
            return;
        }
        self.engine = EngineState::Running;
        self.engine_rpm = cfg.idle_rpm;
        self.ideal_rpm = cfg.idle_rpm;
        self.fuel_cut = false;
        info!("engine running");
        out.events.push(CarEvent::EngineStart);
        out.effects.push(DriveEffect::StartKick);
    }

    fn stall(&mut self, cfg: &EngineSettings, transitions: &mut Transitions, clock: &Clock, money_shift: bool, out: &mut DriveOutput) {
        self.engine = EngineState::Stalled;
        self.fuel_cut = false;
        self.burning_out = false;
        info!(rpm = self.engine_rpm, gear = self.gear, money_shift, "engine stalled");
        out.events.push(CarEvent::EngineStall { money_shift });
        out.effects.push(DriveEffect::StallBrake);

        if cfg.auto_restart {
            transitions.schedule(TransitionKind::StallRecovery, clock, cfg.stall_recovery_delay);
        }
    }

    // --------------------------------------------------------------------------
    // Gears
    // --------------------------------------------------------------------------

    /// Pure state change. Out-of-range or same-gear requests are ignored.
    pub fn change_gear(&mut self, cfg: &EngineSettings, to: i32, out: &mut DriveOutput) -> bool {
        if to < -1 || to > cfg.top_gear() || to == self.gear {
            return false;
        }
        let from = self.gear;
        self.last_gear = from;
        self.gear = to;
        debug!(from, to, "gear changed");
        out.events.push(CarEvent::GearChanged { from, to });
        true
    }

    /// Explicit gear selection. Cancels any timed shift in flight.
    pub fn select_gear(
        &mut self,
        cfg: &EngineSettings,
        to: i32,
        transitions: &mut Transitions,
        out: &mut DriveOutput,
    ) -> bool {
        if to < -1 || to > cfg.top_gear() {
            return false;
        }
        if self.changing_gear {
            self.changing_gear = false;
            self.forced_clutch_in = false;
            self.fuel_cut = false;
        }
        transitions.cancel(TransitionKind::GearShift { to });
        self.skip_grade = false;
        self.change_gear(cfg, to, out)
    }

    /// Start a timed shift. Rejected while one is pending or when out of range.
    pub fn request_shift(&mut self, cfg: &EngineSettings, to: i32, transitions: &mut Transitions, clock: &Clock) -> bool {
        if self.changing_gear || to < -1 || to > cfg.top_gear() || to == self.gear {
            return false;
        }
        if !transitions.schedule(TransitionKind::GearShift { to }, clock, cfg.shift_duration) {
            return false;
        }
        self.changing_gear = true;
        self.forced_clutch_in = true;
        self.fuel_cut = true;
        true
    }

    pub fn shift_up(&mut self, cfg: &EngineSettings, transitions: &mut Transitions, clock: &Clock) -> bool {
        self.request_shift(cfg, self.gear + 1, transitions, clock)
    }

    pub fn shift_down(&mut self, cfg: &EngineSettings, transitions: &mut Transitions, clock: &Clock) -> bool {
        self.request_shift(cfg, self.gear - 1, transitions, clock)
    }

    /// Timed shift came due: change gear, resync rpm from the wheels, release.
    pub fn finish_shift(&mut self, cfg: &EngineSettings, to: i32, drive_wheel_rpm: f32, out: &mut DriveOutput) {
        if !self.changing_gear {
            debug!(to, "stale gear shift ignored");
            return;
        }
        self.change_gear(cfg, to, out);

        if self.is_running() {
            let synced = Self::wheel_engine_rpm(cfg, drive_wheel_rpm, self.gear);
            self.engine_rpm = synced.max(cfg.idle_rpm);
            self.ideal_rpm = self.engine_rpm;
        }
        self.changing_gear = false;
        self.forced_clutch_in = false;
        self.fuel_cut = false;
        // only the engagement this resync produces goes ungraded
        self.skip_grade = self.engaged();
    }

    // --------------------------------------------------------------------------
    // Per-step update
    // --------------------------------------------------------------------------

    pub fn step<R: Rng>(
        &mut self,
        cfg: &EngineSettings,
        input: &DrivetrainInput,
        transitions: &mut Transitions,
        clock: &Clock,
        rng: &mut R,
        out: &mut DriveOutput,
    ) {
        let dt = clock.dt;

        match self.engine {
            EngineState::Off | EngineState::Stalled => {
                self.engine_rpm = (self.engine_rpm - RPM_SPINDOWN * dt).max(0.0);
                self.ideal_rpm = self.engine_rpm;
                if self.engine_rpm < cfg.redline {
                    self.money_shift_latched = false;
                }
                self.was_engaged = false;
                return;
            }
            EngineState::Starting => {
                self.engine_rpm = cfg.idle_rpm * (0.75 + 0.25 * (clock.time * STARTER_FREQ).sin());
                self.ideal_rpm = self.engine_rpm;
                self.was_engaged = false;
                return;
            }
            EngineState::Running => {}
        }

        let throttle = input.throttle.clamp(0.0, 1.0);

        // 1) target
        let wobble = IDLE_WOBBLE_RPM * (clock.time * IDLE_WOBBLE_FREQ).sin();
        let ignition = !self.fuel_cut;
        let target = (cfg.idle_rpm + wobble).max(if ignition { throttle * cfg.redline } else { 0.0 });

        // 2) inertia
        let rate = (cfg.throttle_response * dt).clamp(0.0, 1.0);
        let ideal = lerp(self.engine_rpm, target, rate);
        self.ideal_rpm = ideal;

        // 3-4, 7) clutch coupling
        let engaged = self.engaged();
        if engaged {
            let wheel = Self::wheel_engine_rpm(cfg, input.drive_wheel_rpm, self.gear);
            self.wheel_rpm = wheel;

            if !self.was_engaged || self.engaged_gear != self.gear {
                if self.skip_grade {
                    self.skip_grade = false;
                } else {
                    self.grade_engagement(cfg, ideal, wheel, input, transitions, clock, rng, out);
                }
            }

            let blend = if input.grounded { self.clutch_ratio } else { 0.0 };
            let rpm = lerp(ideal, wheel, blend);
            self.engine_rpm = lerp(rpm, ideal, 1.0 - self.forward_traction);
        } else {
            self.engine_rpm = ideal;
            self.skip_grade = false;
        }
        self.was_engaged = engaged;
        self.engaged_gear = self.gear;

        // 5) clutch relaxes toward fully engaged
        self.clutch_ratio = (self.clutch_ratio + cfg.clutch_sharpness * dt).min(1.0);

        // 6) money shift
        if self.engine_rpm > cfg.redline + MONEY_SHIFT_MARGIN {
            if self.auto_shift {
                self.engine_rpm = cfg.redline;
            } else if !self.money_shift_latched && !input.boosting {
                self.money_shift_latched = true;
                out.events.push(CarEvent::MoneyShift { rpm: self.engine_rpm });
                out.effects.push(DriveEffect::MoneyShiftKick);
                self.stall(cfg, transitions, clock, true, out);
                return;
            }
        } else if self.engine_rpm < cfg.redline {
            self.money_shift_latched = false;
        }

        // 6) limiter
        if self.engine_rpm > cfg.redline - LIMITER_MARGIN {
            let can_upshift = self.auto_shift && engaged && self.gear >= 1 && self.gear < cfg.top_gear();
            if !(can_upshift && self.request_shift(cfg, self.gear + 1, transitions, clock)) {
                self.fuel_cut = true;
                if clock.time - self.last_backfire > BACKFIRE_INTERVAL && rng.gen_bool(BACKFIRE_CHANCE) {
                    self.last_backfire = clock.time;
                    out.events.push(CarEvent::Backfire);
                }
            }
        } else if !self.changing_gear {
            self.fuel_cut = false;
        }

        // automatic downshift
        if self.auto_shift && engaged && self.gear > 1 && self.engine_rpm < cfg.auto_downshift_rpm {
            let lower = Self::wheel_engine_rpm(cfg, input.drive_wheel_rpm, self.gear - 1);
            if lower < cfg.redline * 0.85 {
                self.request_shift(cfg, self.gear - 1, transitions, clock);
            }
        }

        // 6) stall
        if engaged && self.engine_rpm < cfg.stall_rpm && throttle <= STALL_THROTTLE {
            if self.anti_stall {
                self.engine_rpm = cfg.idle_rpm;
            } else {
                self.stall(cfg, transitions, clock, false, out);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn grade_engagement<R: Rng>(
        &mut self,
        cfg: &EngineSettings,
        ideal: f32,
        wheel: f32,
        input: &DrivetrainInput,
        transitions: &mut Transitions,
        clock: &Clock,
        rng: &mut R,
        out: &mut DriveOutput,
    ) {
        let diff = ideal - wheel;
        let max_diff = cfg.max_rpm_diff.max(1.0);

        let launch = self.gear == 1
            && (ideal - cfg.peak_power_rpm()).abs() <= cfg.perfect_shift_window
            && input.speed < input.launch_max_speed;

        let grade = if launch {
            self.clutch_ratio = 1.0;
            out.events.push(CarEvent::PerfectLaunch);
            out.effects.push(DriveEffect::LaunchBoost);
            ShiftGrade::PerfectLaunch
        } else if diff.abs() > max_diff {
            self.clutch_ratio = rng.gen_range(0.1..=0.5);
            let severity = diff.signum() * (diff.abs() / max_diff).min(3.0);
            transitions.schedule(TransitionKind::Lurch { severity }, clock, LURCH_TIME);
            transitions.schedule(TransitionKind::TractionPenalty, clock, TRACTION_PENALTY_TIME);
            out.events.push(CarEvent::BadShift { rpm_diff: diff });
            if diff < 0.0 && rng.gen_bool(DOWNSHIFT_BACKFIRE_CHANCE) {
                self.last_backfire = clock.time;
                out.events.push(CarEvent::Backfire);
            }
            ShiftGrade::Bad { rpm_diff: diff }
        } else if diff.abs() <= cfg.perfect_shift_window && wheel < cfg.redline - LIMITER_MARGIN {
            self.clutch_ratio = 1.0;
            out.events.push(CarEvent::PerfectShift);
            ShiftGrade::Perfect
        } else {
            let frac = diff.abs() / max_diff;
            self.clutch_ratio = 1.0 - 0.5 * frac;
            ShiftGrade::Normal { quality: 1.0 - frac }
        };

        debug!(?grade, ideal, wheel, gear = self.gear, "clutch engaged");
        out.grade = Some(grade);
    }
}

impl Default for DrivetrainState {
    fn default() -> Self {
        Self::new()
    }
}
