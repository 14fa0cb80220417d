//! Per-connection session handling
//!
//! The [`SessionManager`] is the single consumer of [`NetworkEvent`]s on the
//! server. Every accepted connection gets a small state machine:
//!
//! ```text
//! AwaitingHandshake --name line--> AwaitingControl { player_id } --failure--> Closed
//!          |                                                          ^
//!          +----------------- server full / failure ------------------+
//! ```
//!
//! The manager runs on the tokio runtime and only ever takes the world lock
//! and the client registry lock one at a time.

use crate::error::NetworkError;
use crate::host::{SharedClients, SharedWorld};
use crate::network::{self, Connection, ConnectionId, EventReceiver, EventSender, NetworkEvent};
use log::{debug, error, info, warn};
use shared::ControlCommand;
use std::collections::HashMap;

/// Reply sent before closing a connection the server has no room for.
pub const SERVER_FULL_MESSAGE: &str = "server full\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the line carrying the player's name
    AwaitingHandshake,
    /// Joined; every complete line is a control command
    AwaitingControl { player_id: u32 },
    Closed,
}

struct Session {
    connection: Connection,
    state: SessionState,
}

pub struct SessionManager {
    world: SharedWorld,
    clients: SharedClients,
    events: EventSender,
    sessions: HashMap<ConnectionId, Session>,
    /// World size and wall lines; walls never change after startup.
    startup_info: String,
}

impl SessionManager {
    pub fn new(world: SharedWorld, clients: SharedClients, events: EventSender) -> Self {
        let startup_info = world.lock().startup_info();
        Self {
            world,
            clients,
            events,
            sessions: HashMap::new(),
            startup_info,
        }
    }

    /// Consumes network events for the life of the server. The manager and
    /// every connection's writer hold senders, so the channel stays open and
    /// the task only ends when it is aborted.
    pub async fn run(mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::Accepted(connection) => self.on_accepted(connection),
            NetworkEvent::Received(connection) => self.on_received(connection),
            NetworkEvent::Failed {
                connection: Some(id),
                error,
            } => self.on_failed(id, error),
            NetworkEvent::Failed {
                connection: None,
                error,
            } => error!("Listener failed, no new players can join: {}", error),
            NetworkEvent::Connected(connection) => {
                warn!("Ignoring outgoing connection {}", connection.id());
            }
        }
    }

    pub fn session_state(&self, connection: ConnectionId) -> Option<SessionState> {
        self.sessions.get(&connection).map(|session| session.state)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn on_accepted(&mut self, connection: Connection) {
        self.sessions.insert(
            connection.id(),
            Session {
                connection: connection.clone(),
                state: SessionState::AwaitingHandshake,
            },
        );
        debug!(
            "Connection {} from {:?} awaiting handshake ({} open)",
            connection.id(),
            connection.peer_addr(),
            self.session_count()
        );
        network::receive(&connection, &self.events);
    }

    fn on_received(&mut self, connection: Connection) {
        let id = connection.id();
        let Some(state) = self.session_state(id) else {
            return;
        };

        let next = match state {
            SessionState::AwaitingHandshake => self.handshake(&connection),
            SessionState::AwaitingControl { player_id } => {
                self.queue_controls(player_id, connection.take_lines());
                state
            }
            SessionState::Closed => SessionState::Closed,
        };

        if next == SessionState::Closed {
            self.sessions.remove(&id);
            return;
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = next;
        }
        network::receive(&connection, &self.events);
    }

    fn handshake(&mut self, connection: &Connection) -> SessionState {
        let mut lines = connection.take_lines().into_iter();
        let Some(first) = lines.next() else {
            debug!(
                "Connection {} has sent {} bytes of its name so far",
                connection.id(),
                connection.pending_bytes()
            );
            return SessionState::AwaitingHandshake;
        };
        let name = first.trim_end().to_string();

        let Some(player_id) = self.clients.write().allocate_id() else {
            info!("Rejecting {:?}: server is full", name);
            network::send_and_close(connection, SERVER_FULL_MESSAGE);
            return SessionState::Closed;
        };

        network::send(connection, format!("{player_id}\n"));
        network::send(connection, self.startup_info.as_str());

        self.world.lock().add_tank(player_id, name.clone());
        self.clients
            .write()
            .add_client(player_id, name, connection.clone());

        self.queue_controls(player_id, lines.collect());
        SessionState::AwaitingControl { player_id }
    }

    /// Queues the last well-formed command among `lines`.
    fn queue_controls(&self, player_id: u32, lines: Vec<String>) {
        let mut latest = None;
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match ControlCommand::decode(&line) {
                Ok(command) => latest = Some(command),
                Err(e) => debug!("Player {} sent a bad control line {:?}: {}", player_id, line, e),
            }
        }

        if let Some(command) = latest {
            self.world.lock().queue_control(player_id, command);
        }
    }

    fn on_failed(&mut self, id: ConnectionId, error: NetworkError) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        debug!("Connection {} closed: {}", id, error);

        if let SessionState::AwaitingControl { player_id } = session.state {
            self.clients.write().remove_client(&player_id);
            self.world.lock().mark_disconnected(player_id);
        }
        session.connection.close();
    }
}
