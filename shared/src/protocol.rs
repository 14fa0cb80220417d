//! Newline-delimited JSON framing.
//!
//! Every server message is one JSON object per line. The kind of object is
//! recognised by which tag key it carries (`tank`, `wall`, `proj`, `beam` or
//! `power`). Clients answer with [`ControlCommand`] lines.

use crate::entities::{Beam, ControlCommand, Powerup, Projectile, Tank, Wall};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("object carries no known tag key")]
    UnknownTag,
    #[error("invalid header line: {0:?}")]
    InvalidHeader(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Tank,
    Wall,
    Projectile,
    Beam,
    Powerup,
}

impl ObjectKind {
    pub fn tag(self) -> &'static str {
        match self {
            ObjectKind::Tank => "tank",
            ObjectKind::Wall => "wall",
            ObjectKind::Projectile => "proj",
            ObjectKind::Beam => "beam",
            ObjectKind::Powerup => "power",
        }
    }
}

const TAG_ORDER: [ObjectKind; 5] = [
    ObjectKind::Tank,
    ObjectKind::Wall,
    ObjectKind::Projectile,
    ObjectKind::Beam,
    ObjectKind::Powerup,
];

/// Finds the kind of a decoded JSON object by its tag key.
pub fn classify(value: &Value) -> Option<ObjectKind> {
    let object = value.as_object()?;
    TAG_ORDER
        .iter()
        .copied()
        .find(|kind| object.contains_key(kind.tag()))
}

/// Any object the server puts on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum WireObject {
    Tank(Tank),
    Wall(Wall),
    Projectile(Projectile),
    Beam(Beam),
    Powerup(Powerup),
}

impl WireObject {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)?;
        let kind = classify(&value).ok_or(ProtocolError::UnknownTag)?;

        let object = match kind {
            ObjectKind::Tank => WireObject::Tank(serde_json::from_value(value)?),
            ObjectKind::Wall => WireObject::Wall(serde_json::from_value(value)?),
            ObjectKind::Projectile => WireObject::Projectile(serde_json::from_value(value)?),
            ObjectKind::Beam => WireObject::Beam(serde_json::from_value(value)?),
            ObjectKind::Powerup => WireObject::Powerup(serde_json::from_value(value)?),
        };
        Ok(object)
    }

    pub fn id(&self) -> u32 {
        match self {
            WireObject::Tank(tank) => tank.id,
            WireObject::Wall(wall) => wall.id,
            WireObject::Projectile(projectile) => projectile.id,
            WireObject::Beam(beam) => beam.id,
            WireObject::Powerup(powerup) => powerup.id,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            WireObject::Tank(_) => ObjectKind::Tank,
            WireObject::Wall(_) => ObjectKind::Wall,
            WireObject::Projectile(_) => ObjectKind::Projectile,
            WireObject::Beam(_) => ObjectKind::Beam,
            WireObject::Powerup(_) => ObjectKind::Powerup,
        }
    }
}

impl ControlCommand {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Serializes `value` as one wire line, terminator included.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Removes every complete line from `buffer` and returns them without their
/// terminators. A trailing partial line stays in the buffer for the next read.
pub fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = buffer.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };

    let complete: Vec<u8> = buffer.drain(..=last_newline).collect();
    complete[..complete.len() - 1]
        .split(|b| *b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Fire, Movement};
    use crate::vector::Vector2D;

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = b"alpha\nbeta\ngam".to_vec();
        let lines = drain_lines(&mut buffer);

        assert_eq!(lines, vec!["alpha".to_string(), "beta".to_string()]);
        assert_eq!(buffer, b"gam");

        buffer.extend_from_slice(b"ma\n");
        assert_eq!(drain_lines(&mut buffer), vec!["gamma".to_string()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_lines_without_terminator() {
        let mut buffer = b"no newline yet".to_vec();
        assert!(drain_lines(&mut buffer).is_empty());
        assert_eq!(buffer.len(), 14);
    }

    #[test]
    fn test_drain_lines_keeps_empty_lines_and_strips_cr() {
        let mut buffer = b"a\r\n\nb\n".to_vec();
        assert_eq!(
            drain_lines(&mut buffer),
            vec!["a".to_string(), String::new(), "b".to_string()]
        );
    }

    #[test]
    fn test_tank_wire_keys() {
        let mut tank = Tank::new(7, "bob");
        tank.location = Vector2D::new(10.0, 20.0);
        tank.powerups = 2;

        let value = serde_json::to_value(&tank).unwrap();
        let object = value.as_object().unwrap();
        for key in ["tank", "loc", "bdir", "tdir", "name", "hp", "score", "died", "dc", "join"] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert_eq!(object.len(), 10);
        assert_eq!(object["tank"], 7);
        assert_eq!(object["hp"], 3);
    }

    #[test]
    fn test_encode_line_appends_terminator() {
        let wall = Wall::new(1, Vector2D::new(0.0, 0.0), Vector2D::new(0.0, 100.0));
        let line = encode_line(&wall).unwrap();

        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.starts_with(r#"{"wall":1,"#));
    }

    #[test]
    fn test_decode_classifies_by_tag() {
        let tank = WireObject::decode(&encode_line(&Tank::new(1, "x")).unwrap()).unwrap();
        assert_eq!(tank.kind(), ObjectKind::Tank);

        let projectile = Projectile::new(3, Vector2D::new(5.0, 5.0), Vector2D::new(1.0, 0.0));
        let decoded = WireObject::decode(&serde_json::to_string(&projectile).unwrap()).unwrap();
        assert_eq!(decoded, WireObject::Projectile(projectile));

        let powerup = r#"{"power":0,"loc":{"x":1.0,"y":2.0},"died":false}"#;
        match WireObject::decode(powerup).unwrap() {
            WireObject::Powerup(p) => {
                assert_eq!(p.id, 0);
                assert_eq!(p.location, Vector2D::new(1.0, 2.0));
            }
            other => panic!("expected powerup, got {other:?}"),
        }
    }

    fn round_trip(object: &impl Serialize) -> WireObject {
        let line = encode_line(object).unwrap();
        WireObject::decode(line.trim_end()).unwrap()
    }

    #[test]
    fn test_wire_round_trip() {
        let mut tank = Tank::new(4, "ada");
        tank.location = Vector2D::new(-120.5, 33.0);
        tank.orientation = Vector2D::new(1.0, 0.0);
        tank.aim = Vector2D::new(0.6, 0.8);
        tank.powerups = 2;
        match round_trip(&tank) {
            WireObject::Tank(decoded) => {
                assert_eq!(decoded.id, 4);
                assert_eq!(decoded.name, "ada");
                assert_eq!(decoded.location, tank.location);
                assert_eq!(decoded.orientation, tank.orientation);
                assert_eq!(decoded.aim, tank.aim);
                assert_eq!(decoded.powerups, 0);
            }
            other => panic!("expected tank, got {other:?}"),
        }

        let wall = Wall::new(9, Vector2D::new(-975.0, 0.0), Vector2D::new(975.0, 0.0));
        assert_eq!(round_trip(&wall), WireObject::Wall(wall));

        let projectile = Projectile::new(2, Vector2D::new(50.0, -50.0), Vector2D::new(0.0, -3.0));
        match round_trip(&projectile) {
            WireObject::Projectile(decoded) => {
                assert_eq!(decoded.id, 2);
                assert_eq!(decoded.owner, 2);
                assert_eq!(decoded.location, projectile.location);
                assert_eq!(decoded.direction, Vector2D::new(0.0, -1.0));
            }
            other => panic!("expected projectile, got {other:?}"),
        }

        let mut beam = Beam::new(6, Vector2D::new(10.0, 20.0), Vector2D::new(0.0, 1.0));
        beam.hits = 2;
        match round_trip(&beam) {
            WireObject::Beam(decoded) => {
                assert_eq!(decoded.id, 6);
                assert_eq!(decoded.owner, 6);
                assert_eq!(decoded.origin, beam.origin);
                assert_eq!(decoded.direction, beam.direction);
                assert_eq!(decoded.hits, 0);
            }
            other => panic!("expected beam, got {other:?}"),
        }

        let mut powerup = Powerup::new(1);
        powerup.location = Vector2D::new(300.0, -400.0);
        powerup.respawn_threshold = 500;
        match round_trip(&powerup) {
            WireObject::Powerup(decoded) => {
                assert_eq!(decoded.id, 1);
                assert_eq!(decoded.location, powerup.location);
                assert!(!decoded.died);
                assert_eq!(decoded.respawn_threshold, 0);
            }
            other => panic!("expected powerup, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        assert!(matches!(
            WireObject::decode(r#"{"rock":1}"#),
            Err(ProtocolError::UnknownTag)
        ));
        assert!(matches!(
            WireObject::decode("[1, 2]"),
            Err(ProtocolError::UnknownTag)
        ));
        assert!(matches!(
            WireObject::decode("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_control_command_decoding() {
        let command = ControlCommand::decode(
            r#"{"moving":"left","fire":"main","tdir":{"x":0.0,"y":1.0}}"#,
        )
        .unwrap();
        assert_eq!(command.moving, Some(Movement::Left));
        assert_eq!(command.fire, Some(Fire::Main));
        assert_eq!(command.aim, Some(Vector2D::new(0.0, 1.0)));

        let idle = ControlCommand::decode(r#"{"moving":"none","fire":"none"}"#).unwrap();
        assert_eq!(idle.moving, Some(Movement::Idle));
        assert_eq!(idle.fire, Some(Fire::Hold));
        assert_eq!(idle.aim, None);

        assert_eq!(ControlCommand::decode("{}").unwrap(), ControlCommand::default());
        assert!(ControlCommand::decode(r#"{"moving":"sideways"}"#).is_err());
        assert!(ControlCommand::decode("hello").is_err());
    }

    #[test]
    fn test_control_command_omits_absent_fields() {
        let command = ControlCommand {
            moving: Some(Movement::Up),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_string(&command).unwrap(),
            r#"{"moving":"up"}"#
        );
    }
}
