use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A position inside a named world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub position: Position,
}

impl Location {
    pub fn new(world: impl Into<String>, position: Position) -> Self {
        Self {
            world: world.into(),
            position,
        }
    }

    /// Distance between two locations; a world change counts as infinitely far.
    pub fn distance(&self, other: &Location) -> f64 {
        if self.world != other.world {
            return f64::INFINITY;
        }
        self.position.distance(&other.position)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.1} {:.1} {:.1}",
            self.world, self.position.x, self.position.y, self.position.z
        )
    }
}

/// Lowercases a home, warp or kit name. `None` unless it is non-empty and
/// made of ASCII letters, digits, `_` and `-`.
pub fn normalize_name(name: &str) -> Option<String> {
    let name = name.trim().to_ascii_lowercase();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(name)
}

/// Why a teleport was started. Only used for messaging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeleportCause {
    Command,
    TpaAccept,
    Home,
    Warp,
    Spawn,
    Back,
}

/// What caused a `/back` entry to be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackCause {
    Died,
    Teleported,
}

/// `To`: the requester goes to the target. `Here`: the target comes to the requester.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TpaDirection {
    To,
    Here,
}
