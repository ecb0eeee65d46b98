//! Contracts between the orchestrator and the physics/world backend.
//!
//! The orchestrator talks to a [`WorldBinding`]; actors only ever see the
//! [`BodyBinding`] they were handed when they were loaded.

mod kinematic;

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::actor::ActorCell;
use crate::error::{ActorError, WorldError};
use crate::infra::{BodyId, Pose, Position, Velocity};

pub use kinematic::{GridMap, KinematicPhysics, KinematicWorld};

/// Address of the simulation server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Geometry of a body created by an actor.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub model: String,
    pub half_extents: [f64; 3],
    /// Fixed bodies ignore velocity
    pub fixed: bool,
}

impl BodyDesc {
    pub fn new(model: impl Into<String>, half_extents: [f64; 3]) -> Self {
        Self {
            model: model.into(),
            half_extents,
            fixed: false,
        }
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// Body-level calls into the physics backend.
pub trait Physics: Send {
    fn create_body(&mut self, desc: &BodyDesc, pose: Pose) -> Result<BodyId, WorldError>;

    fn remove_body(&mut self, id: BodyId) -> Result<(), WorldError>;

    fn pose(&self, id: BodyId) -> Result<Pose, WorldError>;

    fn set_pose(&mut self, id: BodyId, pose: Pose) -> Result<(), WorldError>;

    fn velocity(&self, id: BodyId) -> Result<Velocity, WorldError>;

    fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), WorldError>;

    /// All bodies currently in the world, ordered by id
    fn bodies(&self) -> Vec<(BodyId, Pose)>;
}

pub type SharedPhysics = Arc<Mutex<dyn Physics>>;

/// Creates the backend bodies of an actor during loading.
///
/// Every body created through the loader is remembered so that a load that
/// fails halfway can be undone with [`AssetLoader::rollback`].
pub struct AssetLoader<'a> {
    physics: &'a mut dyn Physics,
    spawn_pose: Pose,
    created: Vec<BodyId>,
}

impl<'a> AssetLoader<'a> {
    pub fn new(physics: &'a mut dyn Physics, spawn_pose: Pose) -> Self {
        Self {
            physics,
            spawn_pose,
            created: Vec::new(),
        }
    }

    pub fn spawn_pose(&self) -> Pose {
        self.spawn_pose
    }

    /// Bodies created so far, in creation order
    pub fn created(&self) -> &[BodyId] {
        &self.created
    }

    /// Creates a body at the spawn pose
    pub fn create_body(&mut self, desc: &BodyDesc) -> Result<BodyId, WorldError> {
        let pose = self.spawn_pose;
        self.create_body_at(desc, pose)
    }

    pub fn create_body_at(&mut self, desc: &BodyDesc, pose: Pose) -> Result<BodyId, WorldError> {
        let id = self.physics.create_body(desc, pose)?;
        self.created.push(id);
        Ok(id)
    }

    /// Removes every body created through this loader.
    pub fn rollback(&mut self) {
        for id in self.created.drain(..) {
            if let Err(error) = self.physics.remove_body(id) {
                tracing::warn!("Failed to roll back body {}: {}", id, error);
            }
        }
    }
}

/// Handle through which a loaded actor reaches its backend bodies.
///
/// The first body is the actor's identity; the rest move with it.
#[derive(Clone)]
pub struct BodyBinding {
    physics: SharedPhysics,
    actor_id: BodyId,
    bodies: Vec<BodyId>,
    spawn_pose: Pose,
}

impl fmt::Debug for BodyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBinding")
            .field("actor_id", &self.actor_id)
            .field("bodies", &self.bodies)
            .field("spawn_pose", &self.spawn_pose)
            .finish()
    }
}

impl BodyBinding {
    /// Returns `None` when `bodies` is empty.
    pub fn new(physics: SharedPhysics, bodies: Vec<BodyId>, spawn_pose: Pose) -> Option<Self> {
        let actor_id = *bodies.first()?;
        Some(Self {
            physics,
            actor_id,
            bodies,
            spawn_pose,
        })
    }

    pub fn actor_id(&self) -> BodyId {
        self.actor_id
    }

    pub fn bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    pub fn spawn_pose(&self) -> Pose {
        self.spawn_pose
    }

    pub fn pose(&self) -> Result<Pose, WorldError> {
        self.with_physics(|physics| physics.pose(self.actor_id))
    }

    pub fn velocity(&self) -> Result<Velocity, WorldError> {
        self.with_physics(|physics| physics.velocity(self.actor_id))
    }

    pub fn set_velocity(&self, velocity: Velocity) -> Result<(), WorldError> {
        self.with_physics(|physics| {
            for id in &self.bodies {
                physics.set_velocity(*id, velocity)?;
            }
            Ok(())
        })
    }

    /// Moves every body so the primary body lands on `pose`, keeping the
    /// offsets of the attached bodies.
    pub fn teleport(&self, pose: Pose) -> Result<(), WorldError> {
        self.with_physics(|physics| {
            let anchor = physics.pose(self.actor_id)?;
            for id in &self.bodies {
                let current = physics.pose(*id)?;
                let target = Pose::new(
                    pose.position.offset(
                        current.position.x - anchor.position.x,
                        current.position.y - anchor.position.y,
                        current.position.z - anchor.position.z,
                    ),
                    pose.yaw + (current.yaw - anchor.yaw),
                );
                physics.set_pose(*id, target)?;
            }
            Ok(())
        })
    }

    /// Distances from the primary body to other actors' bodies within `radius`,
    /// nearest first.
    pub fn nearby(&self, radius: f64) -> Result<Vec<(BodyId, f64)>, WorldError> {
        self.with_physics(|physics| {
            let origin = physics.pose(self.actor_id)?.position;
            let mut found: Vec<(BodyId, f64)> = physics
                .bodies()
                .into_iter()
                .filter(|(id, _)| !self.bodies.contains(id))
                .map(|(id, pose)| (id, origin.distance(&pose.position)))
                .filter(|(_, distance)| *distance <= radius)
                .collect();
            found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            Ok(found)
        })
    }

    pub fn remove_all(&self) -> Result<(), WorldError> {
        self.with_physics(|physics| {
            for id in &self.bodies {
                physics.remove_body(*id)?;
            }
            Ok(())
        })
    }

    fn with_physics<R>(
        &self,
        f: impl FnOnce(&mut dyn Physics) -> Result<R, WorldError>,
    ) -> Result<R, WorldError> {
        let mut physics = self.physics.lock().map_err(|_| WorldError::PhysicsPoisoned)?;
        f(&mut *physics)
    }
}

/// Map collaborator: spawn geometry and asset location.
pub trait WorldMap {
    /// Prepares the map for an experiment; the configuration is passed through untouched
    fn setup(&mut self, experiment: &Value) -> Result<(), WorldError>;

    fn asset_path(&self) -> &Path;

    fn get_cartesian_spawn_points(&self) -> Vec<Position>;
}

/// Connection to the physics/world backend.
///
/// Only the orchestrator calls these; each call is awaited before the next
/// one starts.
pub trait WorldBinding {
    type Map: WorldMap;

    fn connect(&mut self, endpoint: &ServerEndpoint) -> impl Future<Output = Result<(), WorldError>>;

    fn get_map(&self) -> &Self::Map;

    fn get_map_mut(&mut self) -> &mut Self::Map;

    fn load_world_model(&mut self, path: &Path) -> impl Future<Output = Result<(), WorldError>>;

    /// Places `actor` at `position` and loads it; returns the created bodies
    fn spawn_actor(
        &mut self,
        actor: &mut ActorCell,
        position: Position,
    ) -> impl Future<Output = Result<Vec<BodyId>, ActorError>>;

    /// Advances the simulation by one step
    fn tick(&mut self) -> impl Future<Output = Result<(), WorldError>>;

    fn disconnect(&mut self) -> impl Future<Output = Result<(), WorldError>>;
}
