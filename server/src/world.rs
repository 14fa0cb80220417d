//! Authoritative arena state
//!
//! A [`World`] owns every tank, wall, projectile, beam and powerup together
//! with the control intents queued since the last tick. The whole value sits
//! behind one mutex: the simulation thread holds it for a full tick, and the
//! session manager holds it briefly to add tanks and queue intents.
//!
//! Collections are ordered maps so a tick visits entities in id order and
//! collision outcomes do not depend on hash seeds.

use crate::settings::{Rules, Settings};
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use shared::{
    encode_line, Beam, ControlCommand, Powerup, Projectile, Tank, Vector2D, Wall,
    MAX_HIT_POINTS, POWERUP_COUNT, POWERUP_SIZE, TANK_SIZE,
};
use std::collections::{BTreeMap, HashMap};

/// Spawn sampling gives up after this many rejected positions.
pub const MAX_SPAWN_ATTEMPTS: usize = 1000;

/// Hands out sequential ids, starting at 0.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Returns the next id and advances the counter.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Something that can be dropped at a random wall-free position.
pub trait Spawnable {
    /// Object size used to inflate wall boxes when testing a spawn point.
    fn spawn_clearance(&self) -> f64;
    fn current_location(&self) -> Vector2D;
    fn place_at(&mut self, location: Vector2D);
}

impl Spawnable for Tank {
    fn spawn_clearance(&self) -> f64 {
        TANK_SIZE
    }

    fn current_location(&self) -> Vector2D {
        self.location
    }

    fn place_at(&mut self, location: Vector2D) {
        self.location = location;
    }
}

impl Spawnable for Powerup {
    fn spawn_clearance(&self) -> f64 {
        POWERUP_SIZE
    }

    fn current_location(&self) -> Vector2D {
        self.location
    }

    fn place_at(&mut self, location: Vector2D) {
        self.location = location;
    }
}

/// Uniformly samples positions inside the world until one clears every wall.
pub fn find_spawn(
    walls: &BTreeMap<u32, Wall>,
    world_size: u32,
    clearance: f64,
    rng: &mut StdRng,
) -> Option<Vector2D> {
    let half = world_size as f64 / 2.0;
    if half <= 0.0 {
        return None;
    }

    (0..MAX_SPAWN_ATTEMPTS)
        .map(|_| Vector2D::new(rng.gen_range(-half..half), rng.gen_range(-half..half)))
        .find(|candidate| !walls.values().any(|wall| wall.collides(*candidate, clearance)))
}

/// Moves `entity` to a random wall-free spot. If none is found it stays
/// where it is. Returns whether a new spot was found.
pub fn place_randomly<T: Spawnable>(
    entity: &mut T,
    walls: &BTreeMap<u32, Wall>,
    world_size: u32,
    rng: &mut StdRng,
) -> bool {
    match find_spawn(walls, world_size, entity.spawn_clearance(), rng) {
        Some(location) => {
            entity.place_at(location);
            true
        }
        None => {
            warn!(
                "No wall-free spawn point after {} attempts, keeping {:?}",
                MAX_SPAWN_ATTEMPTS,
                entity.current_location()
            );
            false
        }
    }
}

/// Everything the simulation owns: the arena, its entities and the intents
/// waiting for the next tick. Collections are ordered by id so that frames
/// and tick processing are deterministic.
pub struct World {
    pub(crate) world_size: u32,
    pub(crate) rules: Rules,
    pub(crate) tick: u64,
    pub(crate) tanks: BTreeMap<u32, Tank>,
    pub(crate) walls: BTreeMap<u32, Wall>,
    pub(crate) projectiles: BTreeMap<u32, Projectile>,
    pub(crate) beams: BTreeMap<u32, Beam>,
    pub(crate) powerups: BTreeMap<u32, Powerup>,
    pub(crate) controls: HashMap<u32, ControlCommand>,
    pub(crate) rng: StdRng,
}

impl World {
    /// Builds the arena described by the settings file, with a random seed.
    pub fn from_settings(settings: &Settings) -> Self {
        settings
            .walls
            .iter()
            .fold(
                WorldBuilder::new(settings.universe_size, settings.rules()),
                |builder, wall| builder.wall(wall.p1, wall.p2),
            )
            .build()
    }

    pub fn world_size(&self) -> u32 {
        self.world_size
    }

    pub fn rules(&self) -> Rules {
        self.rules
    }

    /// Number of ticks simulated so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Looks up a tank by its player id
    pub fn tank(&self, id: u32) -> Option<&Tank> {
        self.tanks.get(&id)
    }

    pub fn tanks(&self) -> impl Iterator<Item = &Tank> {
        self.tanks.values()
    }

    pub fn walls(&self) -> impl Iterator<Item = &Wall> {
        self.walls.values()
    }

    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    pub fn beams(&self) -> impl Iterator<Item = &Beam> {
        self.beams.values()
    }

    pub fn powerups(&self) -> impl Iterator<Item = &Powerup> {
        self.powerups.values()
    }

    /// Creates the tank for a freshly joined player at a wall-free position.
    pub fn add_tank(&mut self, id: u32, name: impl Into<String>) -> &Tank {
        let mut tank = Tank::new(id, name);
        place_randomly(&mut tank, &self.walls, self.world_size, &mut self.rng);
        self.tanks.entry(id).or_insert(tank)
    }

    /// Stores the latest intent for a tank, replacing any intent that has
    /// not been applied yet.
    pub fn queue_control(&mut self, id: u32, command: ControlCommand) {
        self.controls.insert(id, command);
    }

    /// Removes and returns every queued intent.
    pub(crate) fn take_controls(&mut self) -> HashMap<u32, ControlCommand> {
        std::mem::take(&mut self.controls)
    }

    /// Flags a player's tank as gone. The tank dies now and is removed once
    /// the disconnect grace period has passed. Returns false for unknown ids.
    pub fn mark_disconnected(&mut self, id: u32) -> bool {
        self.controls.remove(&id);
        match self.tanks.get_mut(&id) {
            Some(tank) => {
                tank.disconnected = true;
                tank.kill();
                tank.respawn_ticks = 0;
                true
            }
            None => false,
        }
    }

    /// Header sent to a player right after their id: the world size line
    /// followed by one line per wall.
    pub fn startup_info(&self) -> String {
        let mut info = format!("{}\n", self.world_size);
        for wall in self.walls.values() {
            push_line(&mut info, wall);
        }
        info
    }

    /// Serializes the state every client receives at the end of a tick.
    ///
    /// Projectiles that died and powerups collected during this tick are
    /// still included once, with `died` set, so clients can drop them.
    pub fn frame(&self) -> String {
        let mut frame = String::new();
        for tank in self.tanks.values() {
            push_line(&mut frame, tank);
        }
        for powerup in self
            .powerups
            .values()
            .filter(|p| !p.died || p.respawn_timer <= 1)
        {
            push_line(&mut frame, powerup);
        }
        for projectile in self.projectiles.values() {
            push_line(&mut frame, projectile);
        }
        for beam in self.beams.values() {
            push_line(&mut frame, beam);
        }
        frame
    }
}

/// Appends one encoded line. An object that fails to encode is left out of
/// the frame rather than failing the tick.
fn push_line<T: Serialize>(out: &mut String, value: &T) {
    match encode_line(value) {
        Ok(line) => out.push_str(&line),
        Err(e) => warn!("Dropping unserializable object from frame: {}", e),
    }
}

/// Assembles a [`World`] from its static parts.
pub struct WorldBuilder {
    world_size: u32,
    rules: Rules,
    walls: BTreeMap<u32, Wall>,
    wall_ids: IdAllocator,
    seed: Option<u64>,
}

impl WorldBuilder {
    /// Starts an empty square arena `world_size` units wide, centred on the origin.
    pub fn new(world_size: u32, rules: Rules) -> Self {
        Self {
            world_size,
            rules,
            walls: BTreeMap::new(),
            wall_ids: IdAllocator::default(),
            seed: None,
        }
    }

    /// Makes spawn positions and powerup timers reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Adds a wall between two points. Ids follow insertion order.
    pub fn wall(mut self, p1: Vector2D, p2: Vector2D) -> Self {
        let id = self.wall_ids.next_id();
        self.walls.insert(id, Wall::new(id, p1, p2));
        self
    }

    /// Finishes the world and scatters the powerups.
    pub fn build(self) -> World {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut powerups = BTreeMap::new();
        for id in 0..POWERUP_COUNT {
            let mut powerup = Powerup::new(id);
            place_randomly(&mut powerup, &self.walls, self.world_size, &mut rng);
            powerups.insert(id, powerup);
        }

        World {
            world_size: self.world_size,
            rules: self.rules,
            tick: 0,
            tanks: BTreeMap::new(),
            walls: self.walls,
            projectiles: BTreeMap::new(),
            beams: BTreeMap::new(),
            powerups,
            controls: HashMap::new(),
            rng,
        }
    }
}

/// Brings a dead tank back at full health.
pub(crate) fn revive(tank: &mut Tank) {
    tank.hit_points = MAX_HIT_POINTS;
    tank.died = false;
    tank.powerups = 0;
    tank.velocity = Vector2D::ZERO;
    tank.respawn_ticks = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WallSegment;
    use shared::{Movement, WireObject};

    fn test_world() -> World {
        WorldBuilder::new(1000, Rules::default())
            .seed(7)
            .wall(Vector2D::new(-200.0, 0.0), Vector2D::new(200.0, 0.0))
            .wall(Vector2D::new(0.0, -300.0), Vector2D::new(0.0, -100.0))
            .build()
    }

    #[test]
    fn test_wall_ids_are_sequential() {
        let world = test_world();
        let ids: Vec<u32> = world.walls().map(|w| w.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_builds_two_powerups_clear_of_walls() {
        let world = test_world();
        assert_eq!(world.powerups().count(), POWERUP_COUNT as usize);
        for powerup in world.powerups() {
            assert!(!powerup.died);
            assert!(world.walls().all(|w| !w.collides(powerup.location, POWERUP_SIZE)));
        }
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            universe_size: 800,
            walls: vec![WallSegment {
                p1: Vector2D::new(-100.0, 50.0),
                p2: Vector2D::new(100.0, 50.0),
            }],
            ..Settings::default()
        };
        let world = World::from_settings(&settings);
        assert_eq!(world.world_size(), 800);
        assert_eq!(world.walls().count(), 1);
        assert_eq!(world.rules(), settings.rules());
    }

    #[test]
    fn test_add_tank_spawns_inside_world_and_clear_of_walls() {
        let mut world = test_world();
        for id in 0..20 {
            let tank = world.add_tank(id, format!("p{id}"));
            assert!(tank.location.x.abs() <= 500.0 && tank.location.y.abs() <= 500.0);
        }
        for tank in world.tanks() {
            assert!(world.walls().all(|w| !w.collides_tank(tank.location)));
        }
    }

    #[test]
    fn test_spawn_fails_when_walls_cover_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut walls = BTreeMap::new();
        walls.insert(0, Wall::new(0, Vector2D::new(-50.0, 0.0), Vector2D::new(50.0, 0.0)));

        assert_eq!(find_spawn(&walls, 100, TANK_SIZE, &mut rng), None);

        let mut tank = Tank::new(0, "stuck");
        tank.location = Vector2D::new(3.0, 4.0);
        assert!(!place_randomly(&mut tank, &walls, 100, &mut rng));
        assert_eq!(tank.location, Vector2D::new(3.0, 4.0));
    }

    #[test]
    fn test_queue_control_keeps_latest_only() {
        let mut world = test_world();
        world.queue_control(
            1,
            ControlCommand {
                moving: Some(Movement::Up),
                ..Default::default()
            },
        );
        world.queue_control(
            1,
            ControlCommand {
                moving: Some(Movement::Left),
                ..Default::default()
            },
        );

        let controls = world.take_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[&1].moving, Some(Movement::Left));
        assert!(world.take_controls().is_empty());
    }

    #[test]
    fn test_mark_disconnected_kills_tank() {
        let mut world = test_world();
        world.add_tank(3, "leaver");
        world.queue_control(3, ControlCommand::default());

        assert!(world.mark_disconnected(3));
        let tank = world.tank(3).unwrap();
        assert!(tank.disconnected);
        assert!(tank.died);
        assert_eq!(tank.hit_points, 0);
        assert!(world.take_controls().is_empty());

        assert!(!world.mark_disconnected(99));
    }

    #[test]
    fn test_startup_info_lists_size_and_walls() {
        let world = test_world();
        let info = world.startup_info();
        let lines: Vec<&str> = info.lines().collect();

        assert_eq!(lines[0], "1000");
        assert_eq!(lines.len(), 3);
        for line in &lines[1..] {
            assert!(matches!(WireObject::decode(line), Ok(WireObject::Wall(_))));
        }
        assert!(info.ends_with('\n'));
    }

    #[test]
    fn test_frame_contents() {
        let mut world = test_world();
        world.add_tank(0, "a");
        world.add_tank(1, "b");
        world
            .projectiles
            .insert(0, Projectile::new(0, Vector2D::ZERO, Vector2D::new(1.0, 0.0)));

        // One powerup collected long ago, not broadcast again.
        if let Some(powerup) = world.powerups.get_mut(&1) {
            powerup.collect(500);
            powerup.respawn_timer = 40;
        }

        let frame = world.frame();
        let objects: Vec<WireObject> = frame
            .lines()
            .map(|line| WireObject::decode(line).unwrap())
            .collect();

        let count = |kind: shared::ObjectKind| objects.iter().filter(|o| o.kind() == kind).count();
        assert_eq!(count(shared::ObjectKind::Tank), 2);
        assert_eq!(count(shared::ObjectKind::Projectile), 1);
        assert_eq!(count(shared::ObjectKind::Powerup), 1);
        assert_eq!(count(shared::ObjectKind::Wall), 0);
    }

    #[test]
    fn test_revive_restores_tank() {
        let mut tank = Tank::new(0, "t");
        tank.powerups = 2;
        tank.respawn_ticks = 300;
        tank.kill();

        revive(&mut tank);
        assert!(!tank.died);
        assert_eq!(tank.hit_points, MAX_HIT_POINTS);
        assert_eq!(tank.powerups, 0);
        assert_eq!(tank.respawn_ticks, 0);
    }
}
