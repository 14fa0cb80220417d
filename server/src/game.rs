//! One simulation tick over the arena
//!
//! [`step`] runs with the world lock held and advances the world through four
//! phases in a fixed order:
//!
//! 1. apply the control intents queued since the previous tick
//! 2. move projectiles and tanks, resolve hits, pickups and beams
//! 3. count down respawns and drop departed players
//! 4. advance shot and beam delays and credit scores
//!
//! Nothing in here can fail. Intents for tanks that no longer exist are
//! skipped, as are projectiles and beams whose owner has left.

use crate::physics::{ray_intersects_circle, within_range};
use crate::world::{place_randomly, revive, World};
use log::info;
use rand::Rng;
use shared::{
    Beam, Fire, Movement, Projectile, Vector2D, BEAM_LIFETIME, DISCONNECT_GRACE_TICKS, HIT_RANGE,
    MAX_HELD_POWERUPS, POWERUP_RESPAWN_MAX, POWERUP_RESPAWN_MIN, PROJECTILE_SIZE,
    PROJECTILE_SPEED, TANK_SIZE,
};

/// Advances the world by one tick.
pub fn step(world: &mut World) {
    // Shots that died last tick were broadcast once; forget them now.
    world.projectiles.retain(|_, projectile| !projectile.died);

    apply_controls(world);

    move_projectiles(world);
    move_tanks(world);
    fire_beams(world);

    respawn(world);

    advance_delays(world);

    world.tick += 1;
}

/// Applies the queued intents: aim for every tank, then movement and fire
/// for living ones. Movement is resolved for all tanks before anyone fires.
fn apply_controls(world: &mut World) {
    let controls = world.take_controls();

    for (id, command) in &controls {
        let Some(tank) = world.tanks.get_mut(id) else {
            continue;
        };

        if let Some(aim) = command.aim {
            if !aim.is_zero() {
                tank.aim = aim.normalized();
            }
        }

        if tank.died {
            continue;
        }

        match command.moving.and_then(Movement::direction) {
            Some(direction) => tank.drive(direction),
            None => tank.velocity = Vector2D::ZERO,
        }
    }

    for (id, command) in &controls {
        let Some(tank) = world.tanks.get_mut(id) else {
            continue;
        };
        if tank.died {
            continue;
        }

        match command.fire {
            Some(Fire::Main) if !tank.shot_delay.is_active() => {
                world
                    .projectiles
                    .insert(tank.id, Projectile::new(tank.id, tank.location, tank.aim));
                tank.shot_delay.start();
            }
            Some(Fire::Alt) if tank.powerups > 0 && !tank.beam_delay.is_active() => {
                world
                    .beams
                    .insert(tank.id, Beam::new(tank.id, tank.location, tank.aim));
                tank.powerups -= 1;
                tank.beam_delay.start();
            }
            _ => {}
        }
    }
}

/// Moves live shells. A shell dies on leaving the arena, on touching a
/// wall's inflated box, or on its first hit against a living tank other than
/// its owner.
fn move_projectiles(world: &mut World) {
    let half = world.world_size as f64 / 2.0;

    for projectile in world.projectiles.values_mut() {
        if projectile.died {
            continue;
        }

        projectile.direction = projectile.direction.normalized();
        projectile.location += projectile.direction * PROJECTILE_SPEED;
        let location = projectile.location;

        let out_of_bounds = location.x.abs() > half || location.y.abs() > half;
        if out_of_bounds
            || world
                .walls
                .values()
                .any(|wall| wall.collides(location, PROJECTILE_SIZE))
        {
            projectile.died = true;
            continue;
        }

        let owner = projectile.owner;
        if let Some(victim) = world.tanks.values_mut().find(|tank| {
            tank.id != owner && !tank.died && within_range(tank.location, location, HIT_RANGE)
        }) {
            projectile.died = true;
            if victim.take_hit() {
                projectile.scored = true;
            }
        }
    }
}

/// Commits each moving tank's step unless it would enter a wall, then picks
/// up any powerup in reach of the tank's position.
fn move_tanks(world: &mut World) {
    for tank in world.tanks.values_mut() {
        if tank.velocity.is_zero() {
            continue;
        }

        let candidate = tank.location + tank.velocity;
        if world.walls.values().any(|wall| wall.collides_tank(candidate)) {
            tank.velocity = Vector2D::ZERO;
        } else {
            tank.location = candidate;
        }

        for powerup in world.powerups.values_mut() {
            if powerup.died || !within_range(tank.location, powerup.location, HIT_RANGE) {
                continue;
            }
            powerup.collect(
                world
                    .rng
                    .gen_range(POWERUP_RESPAWN_MIN..POWERUP_RESPAWN_MAX),
            );
            if tank.powerups < MAX_HELD_POWERUPS {
                tank.powerups += 1;
            }
        }
    }
}

/// Destroys every living tank that a beam's ray passes through.
fn fire_beams(world: &mut World) {
    for beam in world.beams.values_mut() {
        for tank in world.tanks.values_mut() {
            if tank.id == beam.owner || tank.died {
                continue;
            }
            if ray_intersects_circle(beam.origin, beam.direction, tank.location, TANK_SIZE / 2.0) {
                tank.kill();
                beam.hits += 1;
            }
        }
    }
}

/// Counts down dead tanks and collected powerups. Living players come back
/// after `respawn_rate` ticks; departed players are removed after the grace
/// period together with their beam.
fn respawn(world: &mut World) {
    let World {
        world_size,
        rules,
        tanks,
        walls,
        beams,
        powerups,
        rng,
        ..
    } = world;

    for powerup in powerups.values_mut().filter(|powerup| powerup.died) {
        powerup.respawn_timer += 1;
        if powerup.respawn_timer >= powerup.respawn_threshold {
            place_randomly(powerup, walls, *world_size, rng);
            powerup.died = false;
            powerup.respawn_timer = 0;
        }
    }

    let mut departed = Vec::new();
    for tank in tanks.values_mut().filter(|tank| tank.died) {
        tank.respawn_ticks += 1;

        if tank.disconnected {
            if tank.respawn_ticks >= DISCONNECT_GRACE_TICKS {
                departed.push(tank.id);
            }
        } else if tank.respawn_ticks >= rules.respawn_rate {
            place_randomly(tank, walls, *world_size, rng);
            revive(tank);
        }
    }

    for id in departed {
        if let Some(tank) = tanks.remove(&id) {
            info!("Removed tank {} ({})", tank.id, tank.name);
        }
        beams.remove(&id);
    }
}

/// Ticks the shot and beam delays and credits kills. Beam kills count once,
/// on the first tick of the beam; a scoring shell counts once.
fn advance_delays(world: &mut World) {
    let frames_per_shot = world.rules.frames_per_shot;

    for tank in world.tanks.values_mut() {
        tank.shot_delay.advance(frames_per_shot);

        if let Some(elapsed) = tank.beam_delay.advance(BEAM_LIFETIME) {
            if elapsed == 1 {
                if let Some(beam) = world.beams.get(&tank.id) {
                    tank.score += beam.hits;
                }
            }
            if !tank.beam_delay.is_active() {
                world.beams.remove(&tank.id);
            }
        }

        if let Some(projectile) = world.projectiles.get_mut(&tank.id) {
            if projectile.scored {
                tank.score += 1;
                projectile.scored = false;
            }
        }
    }
}
