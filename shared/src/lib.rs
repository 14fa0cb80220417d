//! Data model shared by the arena server and its clients: vectors, entities,
//! gameplay constants and the newline-delimited JSON wire format.

pub mod entities;
pub mod mirror;
pub mod protocol;
pub mod vector;

pub use entities::{
    Beam, Bounds, ControlCommand, Cooldown, Fire, Movement, Powerup, Projectile, Tank, Wall,
};
pub use mirror::WorldMirror;
pub use protocol::{drain_lines, encode_line, ObjectKind, ProtocolError, WireObject};
pub use vector::Vector2D;

pub const DEFAULT_PORT: u16 = 11000;

pub const TANK_SIZE: f64 = 60.0;
pub const WALL_THICKNESS: f64 = 60.0;
pub const ENGINE_POWER: f64 = 3.0;
pub const MAX_HIT_POINTS: u8 = 3;
pub const MAX_HELD_POWERUPS: u8 = 3;

pub const PROJECTILE_SPEED: f64 = 25.0;
pub const PROJECTILE_SIZE: f64 = 30.0;
/// Axis-aligned proximity used for projectile hits and powerup pickups.
pub const HIT_RANGE: f64 = 30.0;

pub const BEAM_LIFETIME: u32 = 6;

pub const POWERUP_COUNT: u32 = 2;
pub const POWERUP_SIZE: f64 = 30.0;
pub const POWERUP_RESPAWN_MIN: u32 = 100;
pub const POWERUP_RESPAWN_MAX: u32 = 1650;

/// Ticks a dead, disconnected tank lingers before it is removed.
pub const DISCONNECT_GRACE_TICKS: u32 = 30;
