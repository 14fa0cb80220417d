//! Fixed-rate simulation thread
//!
//! The simulation runs on its own OS thread so that a slow tick can never
//! stall the networking runtime. Each tick holds the world lock only while
//! stepping and serializing the frame; the broadcast happens after the lock
//! has been released.

use crate::error::ServerResult;
use crate::game;
use crate::host::{SharedClients, SharedWorld};
use crate::network;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the loop logs its tick statistics
const STATS_INTERVAL: u64 = 60;

/// Handle to the running simulation thread.
pub struct SimulationHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulationHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signals the loop to stop and waits for the current tick to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts ticking `world` every `tick_duration` on a dedicated thread.
pub fn spawn(
    world: SharedWorld,
    clients: SharedClients,
    tick_duration: Duration,
) -> ServerResult<SimulationHandle> {
    let running = Arc::new(AtomicBool::new(true));

    let thread = {
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("simulation".into())
            .spawn(move || run(world, clients, tick_duration, running))?
    };

    Ok(SimulationHandle {
        running,
        thread: Some(thread),
    })
}

fn run(
    world: SharedWorld,
    clients: SharedClients,
    tick_duration: Duration,
    running: Arc<AtomicBool>,
) {
    debug!("Simulation started, {:?} per tick", tick_duration);
    let mut busy = Duration::ZERO;

    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        let (tick, recipients) = run_tick(&world, &clients);
        let elapsed = started.elapsed();
        busy += elapsed;

        if tick % STATS_INTERVAL == 0 {
            debug!(
                "Tick {}: {} recipients, avg {:?} busy per tick",
                tick,
                recipients,
                busy / STATS_INTERVAL as u32
            );
            busy = Duration::ZERO;
        }

        if let Some(remaining) = tick_duration.checked_sub(elapsed) {
            thread::sleep(remaining);
        }
    }
    debug!("Simulation stopped");
}

/// Steps the world once and sends the resulting frame to every joined
/// player. Returns the new tick number and how many players were sent to.
pub fn run_tick(world: &SharedWorld, clients: &SharedClients) -> (u64, usize) {
    let (tick, frame) = {
        let mut world = world.lock();
        game::step(&mut world);
        (world.tick(), world.frame())
    };

    let recipients = clients.read().connections();
    let mut delivered = 0;
    for (player_id, connection) in &recipients {
        if network::send(connection, frame.as_str()) {
            delivered += 1;
        } else {
            debug!("Skipping frame for player {}: connection is closed", player_id);
        }
    }

    (tick, delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_manager::ClientManager;
    use crate::network::loopback_pair;
    use crate::settings::Rules;
    use crate::world::WorldBuilder;
    use parking_lot::{Mutex, RwLock};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::mpsc;

    fn shared_world() -> SharedWorld {
        Arc::new(Mutex::new(WorldBuilder::new(1000, Rules::default()).seed(1).build()))
    }

    #[test]
    fn test_run_tick_without_clients() {
        let world = shared_world();
        let clients: SharedClients = Arc::new(RwLock::new(ClientManager::new(4)));

        assert_eq!(run_tick(&world, &clients), (1, 0));
        assert_eq!(run_tick(&world, &clients), (2, 0));
        assert_eq!(world.lock().tick(), 2);
    }

    #[test]
    fn test_thread_ticks_until_stopped() {
        let world = shared_world();
        let clients: SharedClients = Arc::new(RwLock::new(ClientManager::new(4)));

        let mut handle = spawn(Arc::clone(&world), clients, Duration::from_millis(2)).unwrap();
        assert!(handle.is_running());
        thread::sleep(Duration::from_millis(100));
        handle.stop();
        assert!(!handle.is_running());

        let ticks = world.lock().tick();
        assert!(ticks > 5, "only {ticks} ticks ran");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(world.lock().tick(), ticks);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_frames_reach_joined_players() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (connection, client) = loopback_pair(&tx).await;

        let world = shared_world();
        world.lock().add_tank(0, "viewer");
        let clients: SharedClients = Arc::new(RwLock::new(ClientManager::new(4)));
        {
            let mut clients = clients.write();
            let id = clients.allocate_id().unwrap();
            clients.add_client(id, "viewer".into(), connection);
        }

        assert_eq!(run_tick(&world, &clients), (1, 1));

        let mut lines = BufReader::new(client).lines();
        let first = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(first.starts_with(r#"{"tank":0,"#));
    }
}
