//! Server assembly: builds the world and starts the listener, session manager
//! and simulation thread.

use crate::client_manager::ClientManager;
use crate::error::ServerResult;
use crate::network::{self, Listener};
use crate::session::SessionManager;
use crate::settings::Settings;
use crate::simulation::{self, SimulationHandle};
use crate::world::World;
use log::info;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type SharedWorld = Arc<Mutex<World>>;
pub type SharedClients = Arc<RwLock<ClientManager>>;

/// A running server. Dropping it without calling [`ServerHandle::shutdown`]
/// still stops the listener, the session manager and the simulation thread.
pub struct ServerHandle {
    listener: Listener,
    simulation: SimulationHandle,
    manager: JoinHandle<()>,
    world: SharedWorld,
    clients: SharedClients,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn clients(&self) -> &SharedClients {
        &self.clients
    }

    pub fn shutdown(mut self) {
        self.listener.stop();
        self.simulation.stop();
        self.manager.abort();
        info!("Server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.manager.abort();
    }
}

/// Starts a server on `addr` using `settings`. Must be called from within a
/// tokio runtime.
pub fn start(settings: &Settings, addr: SocketAddr) -> ServerResult<ServerHandle> {
    start_with_world(World::from_settings(settings), settings, addr)
}

/// Like [`start`], but with a world that has already been built.
pub fn start_with_world(
    world: World,
    settings: &Settings,
    addr: SocketAddr,
) -> ServerResult<ServerHandle> {
    let world: SharedWorld = Arc::new(Mutex::new(world));
    let clients: SharedClients = Arc::new(RwLock::new(ClientManager::new(settings.max_players)));
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let listener = network::listen(addr, &events_tx)?;
    info!(
        "Listening on {} (world {}, {} ms per tick, up to {} players)",
        listener.local_addr(),
        settings.universe_size,
        settings.ms_per_frame,
        settings.max_players
    );

    let manager = SessionManager::new(Arc::clone(&world), Arc::clone(&clients), events_tx);
    let manager = tokio::spawn(manager.run(events_rx));

    let simulation = simulation::spawn(
        Arc::clone(&world),
        Arc::clone(&clients),
        settings.tick_duration(),
    )?;

    Ok(ServerHandle {
        listener,
        simulation,
        manager,
        world,
        clients,
    })
}
