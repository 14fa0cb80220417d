//! Client-side copy of the arena, rebuilt from the server's line stream.
//!
//! Frames carry no delimiter. Every frame starts with the tanks in ascending
//! id order, so a tank line that does not continue such a run opens a new
//! frame. Beams are never sent with a `died` flag; one that was missing from
//! the previous frame has expired.

use crate::entities::{Beam, Powerup, Projectile, Tank, Wall};
use crate::protocol::{ObjectKind, ProtocolError, WireObject};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct WorldMirror {
    pub player_id: Option<u32>,
    pub world_size: Option<u32>,
    pub tanks: HashMap<u32, Tank>,
    pub walls: HashMap<u32, Wall>,
    pub projectiles: HashMap<u32, Projectile>,
    pub beams: HashMap<u32, Beam>,
    pub powerups: HashMap<u32, Powerup>,
    last_object: Option<(ObjectKind, u32)>,
    beams_in_frame: HashSet<u32>,
}

impl WorldMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once both header lines (player id, then world size) have arrived.
    pub fn has_header(&self) -> bool {
        self.player_id.is_some() && self.world_size.is_some()
    }

    /// Feeds one line from the server. The first two lines are the header;
    /// everything after that is a JSON object.
    pub fn apply_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        if self.player_id.is_none() {
            self.player_id = Some(parse_header(line)?);
            return Ok(());
        }
        if self.world_size.is_none() {
            self.world_size = Some(parse_header(line)?);
            return Ok(());
        }

        self.apply(WireObject::decode(line)?);
        Ok(())
    }

    pub fn apply(&mut self, object: WireObject) {
        let id = object.id();
        if object.kind() == ObjectKind::Tank && !self.continues_tank_run(id) {
            self.begin_frame();
        }
        self.last_object = Some((object.kind(), id));

        match object {
            WireObject::Tank(tank) => {
                if tank.disconnected {
                    self.tanks.remove(&tank.id);
                } else {
                    self.tanks.insert(tank.id, tank);
                }
            }
            WireObject::Wall(wall) => {
                self.walls.insert(wall.id, wall);
            }
            WireObject::Projectile(projectile) => {
                if projectile.died {
                    self.projectiles.remove(&projectile.id);
                } else {
                    self.projectiles.insert(projectile.id, projectile);
                }
            }
            WireObject::Beam(beam) => {
                self.beams_in_frame.insert(beam.id);
                self.beams.insert(beam.id, beam);
            }
            WireObject::Powerup(powerup) => {
                if powerup.died {
                    self.powerups.remove(&powerup.id);
                } else {
                    self.powerups.insert(powerup.id, powerup);
                }
            }
        }
    }

    pub fn own_tank(&self) -> Option<&Tank> {
        self.player_id.and_then(|id| self.tanks.get(&id))
    }

    fn continues_tank_run(&self, id: u32) -> bool {
        matches!(self.last_object, Some((ObjectKind::Tank, previous)) if previous < id)
    }

    fn begin_frame(&mut self) {
        let seen = std::mem::take(&mut self.beams_in_frame);
        self.beams.retain(|id, _| seen.contains(id));
    }
}

fn parse_header(line: &str) -> Result<u32, ProtocolError> {
    line.trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidHeader(line.to_string()))
}
