//! Registry of joined players for the arena server
//!
//! This module tracks which connections have completed the handshake:
//! - Player id allocation and capacity enforcement
//! - The connection each player's frames are broadcast to
//!
//! The session manager adds and removes clients; the simulation thread only
//! takes a snapshot of connections once per tick for the broadcast.

use crate::network::Connection;
use log::info;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A player that has completed the handshake
#[derive(Debug)]
pub struct Client {
    /// Player id, shared with the player's tank
    pub id: u32,
    /// Display name sent in the handshake
    pub name: String,
    /// Where frames for this player are sent
    pub connection: Connection,
    /// When the handshake completed
    pub joined_at: Instant,
}

impl Client {
    pub fn new(id: u32, name: String, connection: Connection) -> Self {
        Self {
            id,
            name,
            connection,
            joined_at: Instant::now(),
        }
    }

    /// How long this player has been in the arena
    pub fn session_length(&self) -> Duration {
        self.joined_at.elapsed()
    }
}

/// Manages all joined clients
///
/// Ids are handed out in increasing order starting at 0 and are never reused
/// while the server runs, so a late frame can never be attributed to a newer
/// player that happens to share an id.
pub struct ClientManager {
    /// Joined clients indexed by player id
    clients: HashMap<u32, Client>,
    /// Next player id to hand out
    next_client_id: u32,
    /// Maximum number of concurrent players
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry with the given capacity
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 0,
            max_clients,
        }
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Reserves the next player id
    ///
    /// Returns None if the server is at capacity. The id is only consumed
    /// when a slot is available.
    pub fn allocate_id(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let id = self.next_client_id;
        self.next_client_id += 1;
        Some(id)
    }

    /// Registers a player for broadcasting under a previously allocated id
    pub fn add_client(&mut self, id: u32, name: String, connection: Connection) {
        info!(
            "Player {} ({}) joined from {:?}",
            id,
            name,
            connection.peer_addr()
        );
        self.clients.insert(id, Client::new(id, name, connection));
    }

    /// Removes a player from the registry
    ///
    /// Returns true if the player was found and removed, false if they were
    /// already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Player {} ({}) left after {:.1}s",
                client.id,
                client.name,
                client.session_length().as_secs_f64()
            );
            true
        } else {
            false
        }
    }

    /// Snapshot of every joined player's connection
    ///
    /// Used by the simulation thread for the per-tick broadcast, so the
    /// registry lock is released before any send happens.
    pub fn connections(&self) -> Vec<(u32, Connection)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.connection.clone()))
            .collect()
    }

    /// Returns the number of joined players
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no players are joined
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
