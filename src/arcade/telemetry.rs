// ==============================================================================
// telemetry.rs — SNAPSHOTS, RACE DATA, EVENTS
// ------------------------------------------------------------------------------
// Everything the core hands to the outside world:
// - RaceTelemetrySnapshot: immutable per-step value (replay / ghosts / dash)
// - RaceData: running totals read by scoring and UI
// - CarEvent: fire-and-forget notifications for audio / VFX / achievements
// - TelemetryRecorder: bounded buffer of snapshots while recording is on
// ==============================================================================

use std::collections::VecDeque;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RaceTelemetrySnapshot {
    pub tick: u64,
    pub position: [f32; 3],
    pub orientation: [f32; 4], // quaternion (i, j, k, w)
    pub speed: f32,            // m/s
    pub engine_rpm: f32,
    pub gear: i32,
    pub steer_angle: f32,      // radians
    pub throttle: f32,
    pub drifting: bool,
    pub boosting: bool,
    pub braking: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RaceData {
    pub max_speed: f32,
    pub boost_count: u32,
    pub longest_drift: f32,
    pub total_drift_distance: f32,
    pub total_drift_time: f32,
    pub total_shifts: u32,
    pub graded_shifts: u32,
    pub perfect_shifts: u32,
    pub shift_quality: f32,     // sum of grades, 0..1 each
    pub grip_edge_time: f32,
    pub stalls: u32,
    pub collisions: u32,
}

impl RaceData {
    /// Mean shift grade, 0 before the first graded shift.
    pub fn average_shift_quality(&self) -> f32 {
        if self.graded_shifts == 0 {
            0.0
        } else {
            self.shift_quality / self.graded_shifts as f32
        }
    }

    pub fn record_shift_grade(&mut self, quality: f32, perfect: bool) {
        self.graded_shifts += 1;
        self.shift_quality += quality.clamp(0.0, 1.0);
        if perfect {
            self.perfect_shifts += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CarEvent {
    EngineStarting,
    EngineStart,
    EngineStall { money_shift: bool },
    GearChanged { from: i32, to: i32 },
    PerfectShift,
    PerfectLaunch,
    BadShift { rpm_diff: f32 },
    Backfire,
    MoneyShift { rpm: f32 },
    BoostStarted,
    DriftStarted,
    DriftEnded { distance: f32, time: f32 },
    CollisionWithDamage { impact: f32 },
    Respawned,
}

#[derive(Debug)]
pub struct TelemetryRecorder {
    pub recording: bool,
    capacity: usize,
    frames: VecDeque<RaceTelemetrySnapshot>,
}

impl TelemetryRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            recording: false,
            capacity: capacity.max(1),
            frames: VecDeque::new(),
        }
    }

    pub fn push(&mut self, snapshot: RaceTelemetrySnapshot) {
        if !self.recording {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(snapshot);
    }

    pub fn frames(&self) -> impl Iterator<Item = &RaceTelemetrySnapshot> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tick: u64) -> RaceTelemetrySnapshot {
        RaceTelemetrySnapshot {
            tick,
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
            speed: 0.0,
            engine_rpm: 900.0,
            gear: 0,
            steer_angle: 0.0,
            throttle: 0.0,
            drifting: false,
            boosting: false,
            braking: false,
        }
    }

    #[test]
    fn recorder_ignores_frames_when_off() {
        let mut rec = TelemetryRecorder::new(4);
        rec.push(snap(1));
        assert_eq!(rec.len(), 0);
    }

    #[test]
    fn recorder_keeps_latest_frames() {
        let mut rec = TelemetryRecorder::new(3);
        rec.recording = true;
        for i in 0..5 {
            rec.push(snap(i));
        }
        let ticks: Vec<u64> = rec.frames().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn shift_quality_average() {
        let mut data = RaceData::default();
        assert_eq!(data.average_shift_quality(), 0.0);
        data.record_shift_grade(1.0, true);
        data.record_shift_grade(0.5, false);
        assert!((data.average_shift_quality() - 0.75).abs() < 1e-6);
        assert_eq!(data.perfect_shifts, 1);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_string(&CarEvent::GearChanged { from: 1, to: 2 }).unwrap();
        assert_eq!(json, r#"{"kind":"gear_changed","from":1,"to":2}"#);
    }
}
