use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::Message;
use uuid::Uuid;

use crate::arcade::CarCommand;
use crate::config::{CarSettings, EngineSettings};
use crate::physics::PhysicsWorld;
use crate::spawn::SpawnManager;
use crate::state::{ServerMessage, SharedGameState};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Control {
    Ping,
    RaceData,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientMessage {
    Ping,
    RaceData,
    Command(CarCommand),
}

impl ClientMessage {
    pub fn from_json(txt: &str) -> Option<Self> {
        if let Ok(control) = serde_json::from_str::<Control>(txt) {
            return Some(match control {
                Control::Ping => ClientMessage::Ping,
                Control::RaceData => ClientMessage::RaceData,
            });
        }
        serde_json::from_str::<CarCommand>(txt).ok().map(ClientMessage::Command)
    }
}

/// Shared handles every connection task needs.
#[derive(Clone)]
pub struct ServerContext {
    pub state: Arc<Mutex<SharedGameState>>,
    pub physics: Arc<Mutex<PhysicsWorld>>,
    pub spawns: Arc<Mutex<SpawnManager>>,
    pub car: Arc<CarSettings>,
    pub engine: Arc<EngineSettings>,
    pub record_telemetry: bool,
}

pub async fn start_websocket_server(listener: TcpListener, ctx: ServerContext) {
    match listener.local_addr() {
        Ok(addr) => info!("websocket listening on ws://{addr}"),
        Err(err) => warn!(%err, "websocket listening on unknown address"),
    }

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        tokio::spawn(handle_connection(raw, peer, ctx.clone()));
    }
}

async fn handle_connection(raw: TcpStream, peer: SocketAddr, ctx: ServerContext) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%peer, %err, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing message channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) Spawn slot + car body
    // -------------------------------
    let player_id = Uuid::new_v4().to_string();
    let spawn = ctx.spawns.lock().await.allocate(&player_id);
    {
        let mut phys = ctx.physics.lock().await;
        phys.spawn_car(&player_id, spawn.pose, Arc::clone(&ctx.car), Arc::clone(&ctx.engine));
        phys.apply_command(&player_id, CarCommand::StartEngine);
        if ctx.record_telemetry {
            phys.apply_command(&player_id, CarCommand::Record(true));
        }
    }
    {
        let mut game = ctx.state.lock().await;
        game.register_client(&player_id, tx);
        game.send_to(&player_id, &ServerMessage::Welcome { player_id: &player_id, slot: spawn.slot });
    }

    info!(player = %player_id, %peer, slot = spawn.slot, "player connected");

    // -------------------------------
    // 3) Main receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(err) => {
                debug!(player = %player_id, %err, "read failed");
                break;
            }
        };
        if msg.is_close() {
            break;
        }
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else { continue };

        match ClientMessage::from_json(text) {
            Some(ClientMessage::Ping) => {
                ctx.state.lock().await.send_to(&player_id, &ServerMessage::Pong);
            }
            Some(ClientMessage::RaceData) => {
                let data = ctx.physics.lock().await.race_data(&player_id);
                if let Some(data) = data {
                    let game = ctx.state.lock().await;
                    game.send_to(&player_id, &ServerMessage::RaceData { player_id: &player_id, data: &data });
                }
            }
            Some(ClientMessage::Command(command)) => {
                ctx.state.lock().await.queue_command(&player_id, command);
            }
            None => debug!(player = %player_id, text, "unrecognised message"),
        }
    }

    // -------------------------------
    // 4) Cleanup
    // -------------------------------
    ctx.state.lock().await.remove_client(&player_id);
    ctx.physics.lock().await.remove_car(&player_id);
    ctx.spawns.lock().await.release(&player_id);
    info!(player = %player_id, "player disconnected");
}
