// ==============================================================================
// transitions.rs — COOPERATIVE TIMED TRANSITIONS
// ------------------------------------------------------------------------------
// Engine start, gear-shift delay, stall recovery, lurch, boost, collision
// damping... anything that "waits" is a record { kind, start_tick,
// duration_ticks, epoch } advanced once per tick by the orchestration step.
//
// Rules:
// - at most one pending transition per slot (kind discriminant); a second
//   schedule() for the same slot is rejected, never queued
// - supersede() bumps the epoch (respawn). Older records are dropped when they
//   come due and never block new schedules
// - cancel() drops the live record of one slot (explicit gear selection)
// - the resumer re-checks world state itself; expiry only says "time is up"
// ==============================================================================

use std::mem::discriminant;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionKind {
    EngineStart,
    GearShift { to: i32 },
    StallRecovery,
    Lurch { severity: f32 },
    TractionPenalty,
    CollisionDamping,
    Boost,
}

impl TransitionKind {
    fn same_slot(&self, other: &TransitionKind) -> bool {
        discriminant(self) == discriminant(other)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub kind: TransitionKind,
    pub start_tick: u64,
    pub duration_ticks: u64,
    pub epoch: u32,
}

impl Transition {
    pub fn due(&self, now: u64) -> bool {
        now >= self.start_tick + self.duration_ticks
    }

    /// 0 at schedule time, 1 when due.
    pub fn progress(&self, now: u64) -> f32 {
        if self.duration_ticks == 0 {
            return 1.0;
        }
        (now.saturating_sub(self.start_tick) as f32 / self.duration_ticks as f32).clamp(0.0, 1.0)
    }
}

/// Fixed-step clock owned by the orchestration step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    pub tick: u64,
    pub dt: f32,
    pub time: f32,
}

impl Clock {
    pub fn advance(&mut self, dt: f32) {
        self.tick += 1;
        self.dt = dt;
        self.time += dt;
    }

    pub fn ticks_for(&self, seconds: f32) -> u64 {
        if self.dt <= 0.0 {
            return 1;
        }
        (seconds / self.dt).round().max(1.0) as u64
    }
}

#[derive(Debug, Default)]
pub struct Transitions {
    pending: Vec<Transition>,
    epoch: u32,
}

impl Transitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TransitionKind, clock: &Clock, seconds: f32) -> bool {
        if self.live().any(|t| t.kind.same_slot(&kind)) {
            debug!(?kind, "transition already pending, request rejected");
            return false;
        }
        self.pending.push(Transition {
            kind,
            start_tick: clock.tick,
            duration_ticks: clock.ticks_for(seconds),
            epoch: self.epoch,
        });
        true
    }

    /// Pops every due transition of the current epoch; stale ones are dropped.
    pub fn advance(&mut self, now: u64) -> Vec<Transition> {
        let epoch = self.epoch;
        let mut due = Vec::new();
        self.pending.retain(|t| {
            if !t.due(now) {
                return true;
            }
            if t.epoch == epoch {
                due.push(*t);
            } else {
                debug!(kind = ?t.kind, "dropping superseded transition");
            }
            false
        });
        due
    }

    /// Drops the live record in `kind`'s slot. Returns whether one was pending.
    pub fn cancel(&mut self, kind: TransitionKind) -> bool {
        let epoch = self.epoch;
        let before = self.pending.len();
        self.pending.retain(|t| t.epoch != epoch || !t.kind.same_slot(&kind));
        self.pending.len() != before
    }

    pub fn supersede(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn active(&self, kind: TransitionKind) -> Option<&Transition> {
        self.live().find(|t| t.kind.same_slot(&kind))
    }

    pub fn is_active(&self, kind: TransitionKind) -> bool {
        self.active(kind).is_some()
    }

    fn live(&self) -> impl Iterator<Item = &Transition> {
        let epoch = self.epoch;
        self.pending.iter().filter(move |t| t.epoch == epoch)
    }
}
