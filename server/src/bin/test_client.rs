//! Headless bot that joins a running server, mirrors the world and drives
//! its tank with random commands. Useful for load and smoke testing.

use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::network::{self, Connection, NetworkEvent};
use shared::{encode_line, ControlCommand, Fire, Movement, Vector2D, WorldMirror};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server host name or address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    server: String,
    /// Server port
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Player name sent in the handshake
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// How long to play before disconnecting
    #[clap(short, long, default_value = "10")]
    seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Connecting,
    AwaitingStartup,
    Playing,
    Closed,
}

const MOVES: [Movement; 5] = [
    Movement::Up,
    Movement::Down,
    Movement::Left,
    Movement::Right,
    Movement::Idle,
];

fn random_command(rng: &mut StdRng) -> ControlCommand {
    let angle = rng.gen_range(0.0..std::f64::consts::TAU);
    let fire = match rng.gen_range(0..10) {
        0..=5 => Fire::Hold,
        6..=8 => Fire::Main,
        _ => Fire::Alt,
    };
    ControlCommand {
        moving: Some(MOVES[rng.gen_range(0..MOVES.len())]),
        fire: Some(fire),
        aim: Some(Vector2D::new(angle.cos(), angle.sin())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (events_tx, mut events) = mpsc::unbounded_channel();
    network::connect(&args.server, args.port, &events_tx);
    info!("Connecting to {}:{} as {:?}", args.server, args.port, args.name);

    let mut state = ClientState::Connecting;
    let mut connection: Option<Connection> = None;
    let mut mirror = WorldMirror::new();
    let mut rng = StdRng::from_entropy();
    let mut lines_received = 0usize;
    let mut commands_sent = 0usize;

    let mut controls = interval(Duration::from_millis(100));
    controls.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    while state != ClientState::Closed {
        tokio::select! {
            _ = &mut deadline => {
                info!("Play time is over");
                state = ClientState::Closed;
            }
            _ = controls.tick() => {
                if let (ClientState::Playing, Some(connection)) = (state, &connection) {
                    let line = encode_line(&random_command(&mut rng))?;
                    if network::send(connection, line) {
                        commands_sent += 1;
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    NetworkEvent::Connected(new_connection) => {
                        info!("Connected, sending handshake");
                        network::send(&new_connection, format!("{}\n", args.name));
                        network::receive(&new_connection, &events_tx);
                        connection = Some(new_connection);
                        state = ClientState::AwaitingStartup;
                    }
                    NetworkEvent::Received(connection) => {
                        for line in connection.take_lines() {
                            lines_received += 1;
                            if let Err(e) = mirror.apply_line(&line) {
                                if state == ClientState::AwaitingStartup && !mirror.has_header() {
                                    error!("Server refused the handshake: {}", e);
                                    state = ClientState::Closed;
                                    break;
                                }
                                debug!("Ignoring line {:?}: {}", line, e);
                            }
                        }

                        if state == ClientState::AwaitingStartup && mirror.has_header() {
                            info!(
                                "Joined as player {:?} in a world of size {:?}",
                                mirror.player_id, mirror.world_size
                            );
                            state = ClientState::Playing;
                        }
                        if state != ClientState::Closed {
                            network::receive(&connection, &events_tx);
                        }
                    }
                    NetworkEvent::Failed { error, .. } => {
                        warn!("Connection ended: {}", error);
                        state = ClientState::Closed;
                    }
                    NetworkEvent::Accepted(_) => {}
                }
            }
        }
    }

    if let Some(connection) = connection {
        connection.close();
    }

    info!("Received {} lines, sent {} commands", lines_received, commands_sent);
    info!(
        "Last view: {} tanks, {} walls, {} projectiles, {} powerups",
        mirror.tanks.len(),
        mirror.walls.len(),
        mirror.projectiles.len(),
        mirror.powerups.len()
    );
    if let Some(tank) = mirror.own_tank() {
        info!("Own tank: hp {}, score {}", tank.hit_points, tank.score);
    }

    Ok(())
}
