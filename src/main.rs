mod arcade;
mod config;
mod curve;
mod net;
mod physics;
mod spawn;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::info;

use crate::config::{CarSettings, EngineSettings, ServerConfig, load_settings};
use crate::net::{ServerContext, start_websocket_server};
use crate::physics::PhysicsWorld;
use crate::spawn::SpawnManager;
use crate::state::SharedGameState;

const GRID_COLUMNS: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arcade_drive_server=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let (car, engine) = match &config.settings_path {
        Some(path) => load_settings(path)?,
        None => (CarSettings::coupe(), EngineSettings::coupe()),
    };
    info!(?config, mass = car.mass, redline = engine.redline, "starting arcade drive server");

    let state = Arc::new(Mutex::new(SharedGameState::new()));
    let physics = Arc::new(Mutex::new(PhysicsWorld::new()));

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind websocket port {}", config.bind))?;

    // Start WebSocket server
    tokio::spawn(start_websocket_server(
        listener,
        ServerContext {
            state: Arc::clone(&state),
            physics: Arc::clone(&physics),
            spawns: Arc::new(Mutex::new(SpawnManager::new(GRID_COLUMNS))),
            car: Arc::new(car),
            engine: Arc::new(engine),
            record_telemetry: config.record_telemetry,
        },
    ));

    // Fixed timestep
    let dt = config.dt();
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let commands = state.lock().await.drain_commands();

        let (snapshots, events) = {
            let mut phys = physics.lock().await;
            for (player_id, command) in commands {
                phys.apply_command(&player_id, command);
            }
            phys.step(dt);
            (phys.snapshots(), phys.drain_events())
        };

        // Advance tick + broadcast
        let mut game = state.lock().await;
        game.tick += 1;
        game.broadcast_snapshot(&snapshots);
        game.broadcast_events(&events);
    }
}
