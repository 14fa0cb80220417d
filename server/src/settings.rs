//! Static game settings, read once at startup from a JSON file.

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use shared::Vector2D;
use std::path::Path;
use std::time::Duration;

/// Gameplay timings the simulation needs while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    /// Ticks a tank must wait between main shots
    pub frames_per_shot: u32,
    /// Ticks a destroyed tank stays dead before respawning
    pub respawn_rate: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            frames_per_shot: 80,
            respawn_rate: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WallSegment {
    pub p1: Vector2D,
    pub p2: Vector2D,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub universe_size: u32,
    pub ms_per_frame: u64,
    pub frames_per_shot: u32,
    pub respawn_rate: u32,
    pub max_players: usize,
    pub walls: Vec<WallSegment>,
}

impl Default for Settings {
    fn default() -> Self {
        let rules = Rules::default();
        Self {
            universe_size: 2000,
            ms_per_frame: 17,
            frames_per_shot: rules.frames_per_shot,
            respawn_rate: rules.respawn_rate,
            max_players: 32,
            walls: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str) -> ServerResult<Self> {
        let settings: Settings =
            serde_json::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.universe_size == 0 {
            return Err(ServerError::Config("universe_size must be positive".into()));
        }
        if self.ms_per_frame == 0 {
            return Err(ServerError::Config("ms_per_frame must be positive".into()));
        }
        if let Some((index, wall)) = self
            .walls
            .iter()
            .enumerate()
            .find(|(_, wall)| wall.p1.x != wall.p2.x && wall.p1.y != wall.p2.y)
        {
            return Err(ServerError::Config(format!(
                "wall {} is not axis-aligned: {:?} -> {:?}",
                index, wall.p1, wall.p2
            )));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.ms_per_frame)
    }

    pub fn rules(&self) -> Rules {
        Rules {
            frames_per_shot: self.frames_per_shot,
            respawn_rate: self.respawn_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.tick_duration(), Duration::from_millis(17));
        assert_eq!(settings.rules(), Rules::default());
    }

    #[test]
    fn test_parses_all_fields() {
        let settings = Settings::from_json(
            r#"{
                "universe_size": 1200,
                "ms_per_frame": 20,
                "frames_per_shot": 10,
                "respawn_rate": 50,
                "max_players": 4,
                "walls": [
                    { "p1": { "x": -575.0, "y": -575.0 }, "p2": { "x": 575.0, "y": -575.0 } }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(settings.universe_size, 1200);
        assert_eq!(settings.max_players, 4);
        assert_eq!(settings.walls.len(), 1);
        assert_eq!(settings.walls[0].p2, Vector2D::new(575.0, -575.0));
        assert_eq!(
            settings.rules(),
            Rules {
                frames_per_shot: 10,
                respawn_rate: 50
            }
        );
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            Settings::from_json(r#"{"universe_size": 0}"#),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            Settings::from_json(r#"{"ms_per_frame": 0}"#),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            Settings::from_json(r#"{"universe_size": -5}"#),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            Settings::from_json("not json"),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_diagonal_walls() {
        let result = Settings::from_json(
            r#"{"walls": [{ "p1": { "x": 0.0, "y": 0.0 }, "p2": { "x": 10.0, "y": 10.0 } }]}"#,
        );
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = Settings::load("/definitely/not/here/settings.json");
        assert!(matches!(result, Err(ServerError::Io(_))));
    }

    #[test]
    fn test_repository_settings_file_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../settings.json");
        let settings = Settings::load(path).unwrap();
        assert!(!settings.walls.is_empty());
    }
}
