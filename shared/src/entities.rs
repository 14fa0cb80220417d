//! Arena entities as they exist on the server and on the wire.
//!
//! Fields marked `#[serde(skip)]` are server-side bookkeeping. They never
//! leave the server and come back as their defaults when a line is decoded.

use crate::vector::Vector2D;
use crate::{ENGINE_POWER, MAX_HIT_POINTS, TANK_SIZE, WALL_THICKNESS};
use serde::{Deserialize, Serialize};

/// A per-tank tick counter that blocks an action until it has run out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cooldown {
    active: bool,
    elapsed: u32,
}

impl Cooldown {
    pub fn start(&mut self) {
        self.active = true;
        self.elapsed = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Advances an active cooldown by one tick and returns the ticks elapsed
    /// so far. The cooldown clears itself once `length` ticks have passed.
    /// Returns `None` when the cooldown was not running.
    pub fn advance(&mut self, length: u32) -> Option<u32> {
        if !self.active {
            return None;
        }

        self.elapsed += 1;
        let elapsed = self.elapsed;
        if elapsed >= length.max(1) {
            self.active = false;
            self.elapsed = 0;
        }
        Some(elapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tank {
    #[serde(rename = "tank")]
    pub id: u32,
    #[serde(rename = "loc")]
    pub location: Vector2D,
    #[serde(rename = "bdir")]
    pub orientation: Vector2D,
    #[serde(rename = "tdir")]
    pub aim: Vector2D,
    pub name: String,
    #[serde(rename = "hp")]
    pub hit_points: u8,
    pub score: u32,
    pub died: bool,
    #[serde(rename = "dc")]
    pub disconnected: bool,
    #[serde(rename = "join")]
    pub joined: bool,

    #[serde(skip)]
    pub velocity: Vector2D,
    #[serde(skip)]
    pub powerups: u8,
    #[serde(skip)]
    pub shot_delay: Cooldown,
    #[serde(skip)]
    pub beam_delay: Cooldown,
    /// Ticks spent dead; drives respawn and the disconnect grace period.
    #[serde(skip)]
    pub respawn_ticks: u32,
}

impl Tank {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        let up = Vector2D::new(0.0, -1.0);
        Self {
            id,
            location: Vector2D::ZERO,
            orientation: up,
            aim: up,
            name: name.into(),
            hit_points: MAX_HIT_POINTS,
            score: 0,
            died: false,
            disconnected: false,
            joined: true,
            velocity: Vector2D::ZERO,
            powerups: 0,
            shot_delay: Cooldown::default(),
            beam_delay: Cooldown::default(),
            respawn_ticks: 0,
        }
    }

    /// Removes one hit point. Returns true when this hit destroyed the tank.
    pub fn take_hit(&mut self) -> bool {
        if self.died {
            return false;
        }

        self.hit_points = self.hit_points.saturating_sub(1);
        if self.hit_points == 0 {
            self.kill();
            true
        } else {
            false
        }
    }

    pub fn kill(&mut self) {
        self.hit_points = 0;
        self.died = true;
        self.velocity = Vector2D::ZERO;
    }

    /// Points the hull in `direction` and starts moving that way at engine power.
    pub fn drive(&mut self, direction: Vector2D) {
        self.orientation = direction;
        self.velocity = direction * ENGINE_POWER;
    }
}

/// Rectangle with exclusive edges, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Bounds {
    pub fn contains(&self, point: Vector2D) -> bool {
        self.left < point.x && point.x < self.right && self.top < point.y && point.y < self.bottom
    }
}

/// Axis-aligned wall segment. Walls never change once the world is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    #[serde(rename = "wall")]
    pub id: u32,
    pub p1: Vector2D,
    pub p2: Vector2D,
}

impl Wall {
    pub fn new(id: u32, p1: Vector2D, p2: Vector2D) -> Self {
        Self { id, p1, p2 }
    }

    /// The segment inflated by half the wall thickness plus half the size of
    /// whatever is being tested against it.
    pub fn bounds(&self, object_size: f64) -> Bounds {
        let expansion = WALL_THICKNESS / 2.0 + object_size / 2.0;
        Bounds {
            left: self.p1.x.min(self.p2.x) - expansion,
            right: self.p1.x.max(self.p2.x) + expansion,
            top: self.p1.y.min(self.p2.y) - expansion,
            bottom: self.p1.y.max(self.p2.y) + expansion,
        }
    }

    pub fn collides(&self, point: Vector2D, object_size: f64) -> bool {
        self.bounds(object_size).contains(point)
    }

    pub fn collides_tank(&self, point: Vector2D) -> bool {
        self.collides(point, TANK_SIZE)
    }
}

/// A tank shell. It shares its id with the firing tank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    #[serde(rename = "proj")]
    pub id: u32,
    #[serde(rename = "loc")]
    pub location: Vector2D,
    #[serde(rename = "dir")]
    pub direction: Vector2D,
    pub died: bool,
    pub owner: u32,

    /// Set when this shell destroyed a tank; consumed once by scoring.
    #[serde(skip)]
    pub scored: bool,
}

impl Projectile {
    pub fn new(owner: u32, location: Vector2D, direction: Vector2D) -> Self {
        Self {
            id: owner,
            location,
            direction: direction.normalized(),
            died: false,
            owner,
            scored: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    #[serde(rename = "beam")]
    pub id: u32,
    #[serde(rename = "org")]
    pub origin: Vector2D,
    #[serde(rename = "dir")]
    pub direction: Vector2D,
    pub owner: u32,

    #[serde(skip)]
    pub hits: u32,
}

impl Beam {
    pub fn new(owner: u32, origin: Vector2D, direction: Vector2D) -> Self {
        Self {
            id: owner,
            origin,
            direction,
            owner,
            hits: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Powerup {
    #[serde(rename = "power")]
    pub id: u32,
    #[serde(rename = "loc")]
    pub location: Vector2D,
    pub died: bool,

    #[serde(skip)]
    pub respawn_timer: u32,
    #[serde(skip)]
    pub respawn_threshold: u32,
}

impl Powerup {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            location: Vector2D::new(-100.0, -100.0),
            died: false,
            respawn_timer: 0,
            respawn_threshold: 0,
        }
    }

    /// Marks the powerup as picked up; it reappears after `respawn_threshold` ticks.
    pub fn collect(&mut self, respawn_threshold: u32) {
        self.died = true;
        self.respawn_timer = 0;
        self.respawn_threshold = respawn_threshold;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Movement {
    Up,
    Down,
    Left,
    Right,
    #[serde(rename = "none")]
    Idle,
}

impl Movement {
    pub fn direction(self) -> Option<Vector2D> {
        match self {
            Movement::Up => Some(Vector2D::new(0.0, -1.0)),
            Movement::Down => Some(Vector2D::new(0.0, 1.0)),
            Movement::Left => Some(Vector2D::new(-1.0, 0.0)),
            Movement::Right => Some(Vector2D::new(1.0, 0.0)),
            Movement::Idle => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fire {
    #[serde(rename = "none")]
    Hold,
    Main,
    Alt,
}

/// The latest movement / fire / aim request from one client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moving: Option<Movement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire: Option<Fire>,
    #[serde(rename = "tdir", default, skip_serializing_if = "Option::is_none")]
    pub aim: Option<Vector2D>,
}
