// ==============================================================================
// config.rs — CAR / ENGINE TUNING + SERVER CONFIG
// ------------------------------------------------------------------------------
// CarSettings and EngineSettings are immutable tuning data. They are built once
// (preset or TOML file), wrapped in Arc and shared read-only by every car that
// uses them (players, ghosts, AI).
//
// ServerConfig comes from env vars:
// - ARCADE_BIND      websocket bind address   (default 0.0.0.0:9001)
// - ARCADE_TICK_HZ   fixed physics rate       (default 60)
// - ARCADE_SETTINGS  optional TOML file with [car] / [engine] tables
// - ARCADE_RECORD    "1"/"true" to record telemetry frames
// ==============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::curve::LinearCurve;

pub const MPH_PER_MS: f32 = 2.236_94;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CarSettings {
    pub mass: f32,                      // kg

    // --- Geometry ---
    pub wheelbase: f32,                 // meters (front axle to rear axle)
    pub track_width: f32,               // meters (left to right)
    pub wheel_mount_height: f32,        // chassis-local y of the suspension anchor
    pub wheel_bounds: [f32; 3],         // wheel mesh half extents [x, y, z]
    pub chassis_half_extents: [f32; 3], // [hx, hy, hz] meters
    pub com_offset: [f32; 3],           // local center of mass

    // --- Suspension ---
    pub suspension_rest_travel: f32,    // ray reach below anchor (excluding radius)
    pub suspension_travel: f32,         // max compression
    pub suspension_rest_target: f32,    // compression with zero spring force
    pub spring_strength: f32,           // N/m
    pub spring_damper: f32,             // N*s/m

    // --- Steering ---
    pub steer_curve: LinearCurve,       // mph -> steer factor
    pub max_steer_angle: f32,           // degrees

    // --- Tires / drift ---
    pub slip_coefficient: f32,          // fraction of lateral speed cancelled per step
    pub max_cornering_accel: f32,       // m/s^2, drift threshold
    pub drift_boost: f32,               // forward push per unit lateral force while drifting
    pub drift_control: f32,             // yaw assist + redirect of wasted drive force

    // --- Assists ---
    pub tcs_enabled: bool,
    pub tcs_braking: f32,               // 0..1 drive penalty per unit tcs fraction
    pub lcs_enabled: bool,
    pub lcs_limit: f32,                 // m/s^2 over burnout threshold before LCS gives up
    pub burnout_threshold: f32,         // m/s^2

    // --- Brakes ---
    pub brake_decel: f32,               // m/s^2
    pub handbrake_decel: f32,           // m/s^2 (rear axle)

    // --- Aero ---
    pub drag: f32,                      // 1/m, accel = drag * v^2
    pub downforce_ratio: f32,           // 1/m, accel = ratio * v^2

    // --- Air control ---
    pub air_spin_accel: f32,            // rad/s^2
    pub max_air_spin: f32,              // rad/s
    pub self_right_torque: f32,         // N*m per kg

    // --- Water ---
    pub hydroplane_speed: f32,          // m/s
    pub hydroplane_grip: f32,           // 0..1

    // --- Boost / launch ---
    pub boost_multiplier: f32,
    pub boost_duration: f32,            // s
    pub launch_boost: f32,              // mph velocity change on a perfect launch
    pub launch_max_speed: f32,          // m/s, above this a 1st gear engagement is not a launch

    // --- Collisions ---
    pub collision_delta_v: f32,         // m/s unexplained velocity change per tick
    pub collision_damping_time: f32,    // s
}

impl CarSettings {
    /// Light rear-drive coupe; the default preset.
    pub fn coupe() -> Self {
        Self {
            mass: 1200.0,

            wheelbase: 2.6,
            track_width: 1.6,
            wheel_mount_height: -0.2,
            wheel_bounds: [0.12, 0.34, 0.34],
            chassis_half_extents: [0.9, 0.4, 2.1],
            com_offset: [0.0, -0.25, 0.0],

            suspension_rest_travel: 0.35,
            suspension_travel: 0.3,
            suspension_rest_target: 0.0,
            spring_strength: 35_000.0,
            spring_damper: 3_500.0,

            steer_curve: LinearCurve::new(vec![(0.0, 1.0), (20.0, 0.8), (60.0, 0.35), (120.0, 0.2)]),
            max_steer_angle: 32.0,

            slip_coefficient: 0.12,
            max_cornering_accel: 14.0,
            drift_boost: 0.35,
            drift_control: 0.6,

            tcs_enabled: true,
            tcs_braking: 0.5,
            lcs_enabled: true,
            lcs_limit: 3.0,
            burnout_threshold: 9.0,

            brake_decel: 12.0,
            handbrake_decel: 16.0,

            drag: 0.0012,
            downforce_ratio: 0.0015,

            air_spin_accel: 6.0,
            max_air_spin: 3.0,
            self_right_torque: 8.0,

            hydroplane_speed: 22.0,
            hydroplane_grip: 0.15,

            boost_multiplier: 1.6,
            boost_duration: 2.5,
            launch_boost: 8.0,
            launch_max_speed: 2.0,

            collision_delta_v: 6.0,
            collision_damping_time: 0.6,
        }
    }

    /// Heavy, soft, slow-steering pickup.
    pub fn truck() -> Self {
        Self {
            mass: 2600.0,
            wheelbase: 3.3,
            track_width: 1.8,
            wheel_bounds: [0.16, 0.42, 0.42],
            chassis_half_extents: [1.0, 0.55, 2.6],
            spring_strength: 60_000.0,
            spring_damper: 7_000.0,
            suspension_travel: 0.4,
            max_steer_angle: 28.0,
            max_cornering_accel: 10.0,
            burnout_threshold: 7.0,
            drag: 0.0018,
            downforce_ratio: 0.0005,
            ..Self::coupe()
        }
    }

    /// Wheel radius derived from the wheel mesh bounds.
    pub fn wheel_radius(&self) -> f32 {
        self.wheel_bounds[1].max(self.wheel_bounds[2])
    }

    pub fn max_steer_radians(&self) -> f32 {
        self.max_steer_angle.to_radians()
    }
}

impl Default for CarSettings {
    fn default() -> Self {
        Self::coupe()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub redline: f32,                   // rpm
    pub idle_rpm: f32,
    pub stall_rpm: f32,
    pub diff_ratio: f32,
    pub gear_ratios: Vec<f32>,          // index 0 = 1st gear
    pub reverse_ratio: f32,
    pub power_curve: LinearCurve,       // rpm / redline -> torque fraction
    pub max_power: f32,                 // N at the rear axle
    pub engine_braking: f32,            // m/s^2 at redline
    pub throttle_response: f32,         // 1/s
    pub clutch_sharpness: f32,          // clutch ratio per second
    pub max_rpm_diff: f32,              // rpm, beyond this a shift is bad
    pub perfect_shift_window: f32,      // rpm
    pub shift_duration: f32,            // s, paddle / automatic shift
    pub start_duration: f32,            // s, length of the starter cue
    pub stall_recovery_delay: f32,      // s
    pub auto_restart: bool,
    pub auto_downshift_rpm: f32,
}

impl EngineSettings {
    pub fn coupe() -> Self {
        Self {
            redline: 7000.0,
            idle_rpm: 900.0,
            stall_rpm: 500.0,
            diff_ratio: 3.9,
            gear_ratios: vec![3.6, 2.2, 1.5, 1.1, 0.9, 0.75],
            reverse_ratio: 3.4,
            power_curve: LinearCurve::new(vec![(0.0, 0.45), (0.3, 0.7), (0.7, 1.0), (0.9, 0.9), (1.0, 0.75)]),
            max_power: 11_500.0,
            engine_braking: 2.5,
            throttle_response: 6.0,
            clutch_sharpness: 1.5,
            max_rpm_diff: 1800.0,
            perfect_shift_window: 250.0,
            shift_duration: 0.25,
            start_duration: 1.2,
            stall_recovery_delay: 1.5,
            auto_restart: true,
            auto_downshift_rpm: 2200.0,
        }
    }

    pub fn top_gear(&self) -> i32 {
        self.gear_ratios.len() as i32
    }

    /// Ratio for a gear index (-1 reverse, 0 neutral, 1..N forward).
    pub fn gear_ratio(&self, gear: i32) -> f32 {
        match gear {
            -1 => self.reverse_ratio,
            g if g >= 1 => self.gear_ratios.get(g as usize - 1).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn peak_power_rpm(&self) -> f32 {
        self.power_curve.peak_x() * self.redline
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::coupe()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    car: CarSettings,
    #[serde(default)]
    engine: EngineSettings,
}

/// Load a TOML settings file; omitted fields keep the coupe preset.
pub fn load_settings(path: &Path) -> Result<(CarSettings, EngineSettings)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path.display()))?;
    parse_settings(&text).with_context(|| format!("parsing settings file {}", path.display()))
}

pub fn parse_settings(text: &str) -> Result<(CarSettings, EngineSettings)> {
    let file: SettingsFile = toml::from_str(text)?;
    Ok((file.car, file.engine))
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub tick_hz: u32,
    pub settings_path: Option<PathBuf>,
    pub record_telemetry: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9001".to_string(),
            tick_hz: 60,
            settings_path: None,
            record_telemetry: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("ARCADE_BIND") {
            config.bind = bind;
        }
        if let Some(hz) = std::env::var("ARCADE_TICK_HZ").ok().and_then(|v| v.parse().ok()) {
            config.tick_hz = hz;
        }
        if let Ok(path) = std::env::var("ARCADE_SETTINGS") {
            config.settings_path = Some(path.into());
        }
        if let Ok(record) = std::env::var("ARCADE_RECORD") {
            config.record_telemetry = matches!(record.as_str(), "1" | "true" | "TRUE" | "True");
        }
        config
    }

    pub fn dt(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }
}
