use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle of a body inside the physics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Position {
        Position::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Position plus heading (yaw, radians, counter-clockwise from +x).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    #[serde(default)]
    pub yaw: f64,
}

impl Pose {
    pub fn new(position: Position, yaw: f64) -> Self {
        Self { position, yaw }
    }

    pub fn at(position: Position) -> Self {
        Self { position, yaw: 0.0 }
    }
}

/// Planar body velocity: forward speed along the heading and yaw rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub speed: f64,
    pub yaw_rate: f64,
}

impl Velocity {
    pub fn new(speed: f64, yaw_rate: f64) -> Self {
        Self { speed, yaw_rate }
    }

    pub fn is_zero(&self) -> bool {
        self.speed == 0.0 && self.yaw_rate == 0.0
    }
}

/// Control input applied to an actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Drive at a target speed (m/s) and yaw rate (rad/s)
    Drive { speed: f64, yaw_rate: f64 },
    /// Stop in place
    Hold,
    /// Let the actor pick its own motion
    Wander,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Drive { .. } => "drive",
            Action::Hold => "hold",
            Action::Wander => "wander",
        }
    }
}

/// Observation produced by an actor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub actor_id: BodyId,
    pub pose: Pose,
    /// Variant-specific feature vector
    pub features: Vec<f64>,
}
