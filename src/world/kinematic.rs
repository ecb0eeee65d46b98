//! In-process kinematic backend.
//!
//! Bodies are boxes with a pose and a planar velocity; one tick integrates
//! the velocity over a fixed timestep. No collision response.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::actor::ActorCell;
use crate::error::{ActorError, WorldError};
use crate::infra::{BodyId, Pose, Position, Velocity};
use crate::world::{
    BodyDesc, Physics, ServerEndpoint, SharedPhysics, WorldBinding, WorldMap,
};

#[derive(Debug, Clone)]
struct Body {
    desc: BodyDesc,
    pose: Pose,
    velocity: Velocity,
}

#[derive(Debug, Default)]
pub struct KinematicPhysics {
    next_id: u64,
    bodies: BTreeMap<BodyId, Body>,
}

impl KinematicPhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn step(&mut self, dt: f64) {
        for body in self.bodies.values_mut() {
            if body.desc.fixed || body.velocity.is_zero() {
                continue;
            }
            let yaw = body.pose.yaw;
            body.pose.position.x += body.velocity.speed * yaw.cos() * dt;
            body.pose.position.y += body.velocity.speed * yaw.sin() * dt;
            body.pose.yaw += body.velocity.yaw_rate * dt;
        }
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
    }

    fn body(&self, id: BodyId) -> Result<&Body, WorldError> {
        self.bodies.get(&id).ok_or(WorldError::UnknownBody { id })
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut Body, WorldError> {
        self.bodies.get_mut(&id).ok_or(WorldError::UnknownBody { id })
    }
}

impl Physics for KinematicPhysics {
    fn create_body(&mut self, desc: &BodyDesc, pose: Pose) -> Result<BodyId, WorldError> {
        if desc.half_extents.iter().any(|extent| *extent <= 0.0) {
            return Err(WorldError::SpawnFailed {
                message: format!("model {} has a non-positive extent", desc.model),
            });
        }
        self.next_id += 1;
        let id = BodyId(self.next_id);
        self.bodies.insert(
            id,
            Body {
                desc: desc.clone(),
                pose,
                velocity: Velocity::default(),
            },
        );
        Ok(id)
    }

    fn remove_body(&mut self, id: BodyId) -> Result<(), WorldError> {
        self.bodies
            .remove(&id)
            .map(|_| ())
            .ok_or(WorldError::UnknownBody { id })
    }

    fn pose(&self, id: BodyId) -> Result<Pose, WorldError> {
        Ok(self.body(id)?.pose)
    }

    fn set_pose(&mut self, id: BodyId, pose: Pose) -> Result<(), WorldError> {
        self.body_mut(id)?.pose = pose;
        Ok(())
    }

    fn velocity(&self, id: BodyId) -> Result<Velocity, WorldError> {
        Ok(self.body(id)?.velocity)
    }

    fn set_velocity(&mut self, id: BodyId, velocity: Velocity) -> Result<(), WorldError> {
        self.body_mut(id)?.velocity = velocity;
        Ok(())
    }

    fn bodies(&self) -> Vec<(BodyId, Pose)> {
        self.bodies.iter().map(|(id, body)| (*id, body.pose)).collect()
    }
}

/// Rectangular grid of spawn points.
#[derive(Debug, Clone)]
pub struct GridMap {
    asset_path: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub spacing: f64,
    pub origin: Position,
}

impl GridMap {
    pub fn new(asset_path: impl Into<PathBuf>) -> Self {
        Self {
            asset_path: asset_path.into(),
            rows: 5,
            cols: 5,
            spacing: 12.0,
            origin: Position::default(),
        }
    }
}

impl WorldMap for GridMap {
    /// Reads optional `rows`, `cols`, `spacing` and `origin` overrides.
    fn setup(&mut self, experiment: &Value) -> Result<(), WorldError> {
        let fields = match experiment {
            Value::Null => return Ok(()),
            Value::Object(fields) => fields,
            other => {
                return Err(WorldError::InvalidExperiment {
                    reason: format!("expected an object, got {}", other),
                });
            }
        };

        let invalid = |field: &str| WorldError::InvalidExperiment {
            reason: format!("field '{}' has the wrong type", field),
        };

        if let Some(rows) = fields.get("rows") {
            self.rows = rows.as_u64().ok_or_else(|| invalid("rows"))? as usize;
        }
        if let Some(cols) = fields.get("cols") {
            self.cols = cols.as_u64().ok_or_else(|| invalid("cols"))? as usize;
        }
        if let Some(spacing) = fields.get("spacing") {
            self.spacing = spacing.as_f64().ok_or_else(|| invalid("spacing"))?;
        }
        if let Some(origin) = fields.get("origin") {
            self.origin =
                serde_json::from_value(origin.clone()).map_err(|_| invalid("origin"))?;
        }

        tracing::debug!(
            "Grid map: {}x{} spacing {} origin ({}, {}, {})",
            self.rows,
            self.cols,
            self.spacing,
            self.origin.x,
            self.origin.y,
            self.origin.z
        );
        Ok(())
    }

    fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    fn get_cartesian_spawn_points(&self) -> Vec<Position> {
        let mut points = Vec::with_capacity(self.rows * self.cols);
        for row in 0..self.rows {
            for col in 0..self.cols {
                points.push(self.origin.offset(
                    col as f64 * self.spacing,
                    row as f64 * self.spacing,
                    0.0,
                ));
            }
        }
        points
    }
}

/// World binding over [`KinematicPhysics`] running in this process.
pub struct KinematicWorld {
    physics: Arc<Mutex<KinematicPhysics>>,
    map: GridMap,
    timestep: f64,
    endpoint: Option<ServerEndpoint>,
    world_model: Option<PathBuf>,
    spawned: Vec<BodyId>,
    ticks: u64,
}

impl KinematicWorld {
    pub fn new(map: GridMap, timestep: f64) -> Self {
        Self {
            physics: Arc::new(Mutex::new(KinematicPhysics::new())),
            map,
            timestep,
            endpoint: None,
            world_model: None,
            spawned: Vec::new(),
            ticks: 0,
        }
    }

    pub fn physics(&self) -> SharedPhysics {
        self.physics.clone()
    }

    pub fn endpoint(&self) -> Option<&ServerEndpoint> {
        self.endpoint.as_ref()
    }

    pub fn world_model(&self) -> Option<&Path> {
        self.world_model.as_deref()
    }

    /// Bodies created through [`WorldBinding::spawn_actor`], in spawn order
    pub fn spawned(&self) -> &[BodyId] {
        &self.spawned
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn ensure_connected(&self) -> Result<(), WorldError> {
        if self.endpoint.is_none() {
            return Err(WorldError::NotConnected);
        }
        Ok(())
    }
}

impl WorldBinding for KinematicWorld {
    type Map = GridMap;

    async fn connect(&mut self, endpoint: &ServerEndpoint) -> Result<(), WorldError> {
        if endpoint.host.trim().is_empty() {
            return Err(WorldError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                message: "empty host name".to_string(),
            });
        }
        tracing::debug!("Kinematic world bound to {}", endpoint);
        self.endpoint = Some(endpoint.clone());
        Ok(())
    }

    fn get_map(&self) -> &GridMap {
        &self.map
    }

    fn get_map_mut(&mut self) -> &mut GridMap {
        &mut self.map
    }

    async fn load_world_model(&mut self, path: &Path) -> Result<(), WorldError> {
        self.ensure_connected()?;
        if !path.starts_with(self.map.asset_path()) {
            return Err(WorldError::ModelLoad {
                path: path.to_path_buf(),
                message: format!("outside the asset path {:?}", self.map.asset_path()),
            });
        }
        tracing::info!("Loading world model {:?}", path);
        self.world_model = Some(path.to_path_buf());
        Ok(())
    }

    async fn spawn_actor(
        &mut self,
        actor: &mut ActorCell,
        position: Position,
    ) -> Result<Vec<BodyId>, ActorError> {
        self.ensure_connected()?;
        let pose = actor.initial_pose().unwrap_or(Pose::at(position));
        let physics: SharedPhysics = self.physics.clone();
        let ids = actor.load(&physics, pose)?;
        self.spawned.extend(ids.iter().copied());
        Ok(ids)
    }

    async fn tick(&mut self) -> Result<(), WorldError> {
        self.ensure_connected()?;
        self.physics
            .lock()
            .map_err(|_| WorldError::PhysicsPoisoned)?
            .step(self.timestep);
        self.ticks += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), WorldError> {
        self.ensure_connected()?;
        self.physics
            .lock()
            .map_err(|_| WorldError::PhysicsPoisoned)?
            .clear();
        self.spawned.clear();
        self.endpoint = None;
        Ok(())
    }
}
