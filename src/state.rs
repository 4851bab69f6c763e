use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use crate::arcade::{CarCommand, CarEvent, RaceData, RaceTelemetrySnapshot};

#[derive(Debug, Serialize)]
pub struct CarSnapshot<'a> {
    pub id: &'a str,
    #[serde(flatten)]
    pub telemetry: &'a RaceTelemetrySnapshot,
}

/// Everything the server sends down a socket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    Welcome { player_id: &'a str, slot: usize },
    Snapshot { tick: u64, cars: Vec<CarSnapshot<'a>> },
    Event { player_id: &'a str, event: &'a CarEvent },
    RaceData { player_id: &'a str, data: &'a RaceData },
    Pong,
}

impl ServerMessage<'_> {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(err) => {
                error!(%err, "failed to serialize server message");
                None
            }
        }
    }
}

pub struct SharedGameState {
    pub tick: u64,
    clients: HashMap<String, UnboundedSender<String>>,
    pending: Vec<(String, CarCommand)>,
}

impl SharedGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            clients: HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn register_client(&mut self, player_id: &str, tx: UnboundedSender<String>) {
        self.clients.insert(player_id.to_string(), tx);
    }

    pub fn remove_client(&mut self, player_id: &str) {
        self.clients.remove(player_id);
        self.pending.retain(|(id, _)| id != player_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Commands land here between ticks and are applied in arrival order.
    pub fn queue_command(&mut self, player_id: &str, command: CarCommand) {
        self.pending.push((player_id.to_string(), command));
    }

    pub fn drain_commands(&mut self) -> Vec<(String, CarCommand)> {
        std::mem::take(&mut self.pending)
    }

    pub fn send_to(&self, player_id: &str, message: &ServerMessage) {
        let Some(tx) = self.clients.get(player_id) else { return };
        if let Some(json) = message.to_json() {
            let _ = tx.send(json);
        }
    }

    pub fn broadcast(&self, message: &ServerMessage) {
        let Some(json) = message.to_json() else { return };
        for (id, tx) in &self.clients {
            if tx.send(json.clone()).is_err() {
                debug!(player = %id, "send loop gone, dropping message");
            }
        }
    }

    /// Build and send one snapshot of all cars to all clients.
    pub fn broadcast_snapshot(&self, snapshots: &[(String, RaceTelemetrySnapshot)]) {
        let cars = snapshots
            .iter()
            .map(|(id, telemetry)| CarSnapshot { id, telemetry })
            .collect();
        self.broadcast(&ServerMessage::Snapshot { tick: self.tick, cars });
    }

    pub fn broadcast_events(&self, events: &[(String, CarEvent)]) {
        for (player_id, event) in events {
            self.broadcast(&ServerMessage::Event { player_id, event });
        }
    }
}

impl Default for SharedGameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn snap() -> RaceTelemetrySnapshot {
        RaceTelemetrySnapshot {
            tick: 3,
            position: [1.0, 0.5, 2.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
            speed: 4.0,
            engine_rpm: 2500.0,
            gear: 2,
            steer_angle: 0.0,
            throttle: 1.0,
            drifting: false,
            boosting: false,
            braking: false,
        }
    }

    #[test]
    fn snapshot_reaches_every_client() {
        let mut state = SharedGameState::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        state.register_client("a", tx_a);
        state.register_client("b", tx_b);
        state.tick = 7;

        state.broadcast_snapshot(&[("a".to_string(), snap())]);

        for rx in [&mut rx_a, &mut rx_b] {
            let json: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(json["type"], "snapshot");
            assert_eq!(json["tick"], 7);
            assert_eq!(json["cars"][0]["id"], "a");
            assert_eq!(json["cars"][0]["gear"], 2);
        }
    }

    #[test]
    fn events_are_tagged_with_the_player() {
        let mut state = SharedGameState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.register_client("a", tx);

        state.broadcast_events(&[("a".to_string(), CarEvent::BoostStarted)]);
        let json: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["player_id"], "a");
    }

    #[test]
    fn removed_client_loses_queued_commands() {
        let mut state = SharedGameState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.register_client("a", tx);
        state.queue_command("a", CarCommand::GearUp);
        state.queue_command("b", CarCommand::GearDown);

        state.remove_client("a");
        let pending = state.drain_commands();
        assert_eq!(pending, vec![("b".to_string(), CarCommand::GearDown)]);
        assert!(state.drain_commands().is_empty());
        assert_eq!(state.client_count(), 0);
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let mut state = SharedGameState::new();
        let (tx, rx) = mpsc::unbounded_channel();
        state.register_client("a", tx);
        drop(rx);
        state.broadcast(&ServerMessage::Pong);
        state.send_to("a", &ServerMessage::Pong);
    }
}
