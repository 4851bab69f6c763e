use std::collections::{BTreeSet, HashMap};

use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::Serialize;

// ---------------------------------------------
// SPAWN RESULT RETURNED TO NET
// ---------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSpawnInfo {
    pub player_id: String,
    pub slot: usize,
    pub position: [f32; 3],
    #[serde(skip)]
    pub pose: Isometry3<f32>,
}

// ---------------------------------------------
// GRID SPAWN MANAGER
// ---------------------------------------------
// Slots are laid out in rows along -Z behind the start line, `columns` cars
// per row, every car facing +Z. A released slot is handed out again before
// any new one.
#[derive(Debug)]
pub struct SpawnManager {
    pub spacing: f32,
    pub row_spacing: f32,
    pub columns: usize,
    pub height: f32,
    taken: HashMap<String, usize>,
    free: BTreeSet<usize>,
    next_slot: usize,
}

impl SpawnManager {
    pub fn new(columns: usize) -> Self {
        Self {
            spacing: 4.0,
            row_spacing: 7.0,
            columns: columns.max(1),
            height: 1.0,
            taken: HashMap::new(),
            free: BTreeSet::new(),
            next_slot: 0,
        }
    }

    pub fn pose_for(&self, slot: usize) -> Isometry3<f32> {
        let row = slot / self.columns;
        let col = slot % self.columns;
        let width = (self.columns - 1) as f32 * self.spacing;
        let x = col as f32 * self.spacing - width * 0.5;
        let z = -(row as f32) * self.row_spacing;
        Isometry3::from_parts(Translation3::new(x, self.height, z), UnitQuaternion::identity())
    }

    // ---------------------------------------------------------
    // Full allocation pipeline called from net.rs
    // ---------------------------------------------------------
    pub fn allocate(&mut self, player_id: &str) -> PlayerSpawnInfo {
        let slot = match self.taken.get(player_id) {
            Some(&slot) => slot,
            None => {
                let slot = self.free.pop_first().unwrap_or_else(|| {
                    self.next_slot += 1;
                    self.next_slot - 1
                });
                self.taken.insert(player_id.to_string(), slot);
                slot
            }
        };

        let pose = self.pose_for(slot);
        PlayerSpawnInfo {
            player_id: player_id.to_string(),
            slot,
            position: pose.translation.vector.into(),
            pose,
        }
    }

    pub fn release(&mut self, player_id: &str) -> Option<usize> {
        let slot = self.taken.remove(player_id)?;
        self.free.insert(slot);
        Some(slot)
    }

    pub fn occupied(&self) -> usize {
        self.taken.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_fill_rows_left_to_right() {
        let mut spawns = SpawnManager::new(2);
        let a = spawns.allocate("a");
        let b = spawns.allocate("b");
        let c = spawns.allocate("c");

        assert_eq!((a.slot, b.slot, c.slot), (0, 1, 2));
        assert_eq!(a.position, [-2.0, 1.0, 0.0]);
        assert_eq!(b.position, [2.0, 1.0, 0.0]);
        assert_eq!(c.position, [-2.0, 1.0, -7.0]);
    }

    #[test]
    fn released_slot_is_reused_first() {
        let mut spawns = SpawnManager::new(4);
        for id in ["a", "b", "c"] {
            spawns.allocate(id);
        }
        assert_eq!(spawns.release("b"), Some(1));
        assert_eq!(spawns.release("b"), None);

        assert_eq!(spawns.allocate("d").slot, 1);
        assert_eq!(spawns.allocate("e").slot, 3);
        assert_eq!(spawns.occupied(), 4);
    }

    #[test]
    fn same_player_keeps_its_slot() {
        let mut spawns = SpawnManager::new(4);
        spawns.allocate("a");
        let again = spawns.allocate("a");
        assert_eq!(again.slot, 0);
        assert_eq!(spawns.occupied(), 1);
    }
}
