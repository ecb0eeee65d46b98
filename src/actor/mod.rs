//! Actor lifecycle contract.
//!
//! Concrete variants implement [`Actor`]; the orchestrator only holds
//! [`ActorCell`]s, which own the lifecycle state and make sure a variant is
//! never driven outside its valid window:
//!
//! ```text
//! Unloaded ──load──▶ Loaded ──destroy──▶ Destroyed
//!                     │  ▲
//!                     └──┘ reset / get_observation / apply_action
//! ```

mod pedestrian;
mod sensor;
mod vehicle;

use std::fmt;

use crate::error::{ActorError, WorldError};
use crate::infra::{Action, BodyId, Observation, Pose};
use crate::world::{AssetLoader, BodyBinding, SharedPhysics};

pub use pedestrian::Pedestrian;
pub use sensor::SensorCarrier;
pub use vehicle::Vehicle;

/// Behavior every actor variant has to provide.
pub trait Actor: fmt::Debug + Send {
    /// Variant name used in logs and errors
    fn kind(&self) -> &str;

    /// Pose requested at construction; overrides the assigned spawn point
    fn initial_pose(&self) -> Option<Pose> {
        None
    }

    /// Creates the backend bodies. The first returned body becomes the actor id.
    fn load_asset(&mut self, loader: &mut AssetLoader<'_>) -> Result<Vec<BodyId>, ActorError>;

    /// Re-initializes internal state without creating bodies
    fn reset(&mut self, body: &BodyBinding) -> Result<(), ActorError>;

    /// Reads the current state; must not change the backend
    fn get_observation(&self, body: &BodyBinding) -> Result<Observation, ActorError>;

    fn apply_action(&mut self, body: &BodyBinding, action: &Action) -> Result<(), ActorError>;

    /// Releases the backend bodies
    fn destroy(&mut self, body: &BodyBinding) -> Result<(), ActorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unloaded,
    Loaded,
    Destroyed,
}

/// An actor together with its lifecycle state and backend binding.
#[derive(Debug)]
pub struct ActorCell {
    actor: Box<dyn Actor>,
    lifecycle: Lifecycle,
    binding: Option<BodyBinding>,
}

impl ActorCell {
    pub fn new(actor: Box<dyn Actor>) -> Self {
        Self {
            actor,
            lifecycle: Lifecycle::Unloaded,
            binding: None,
        }
    }

    pub fn kind(&self) -> &str {
        self.actor.kind()
    }

    pub fn initial_pose(&self) -> Option<Pose> {
        self.actor.initial_pose()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_loaded(&self) -> bool {
        self.lifecycle == Lifecycle::Loaded
    }

    /// Backend id of the actor's primary body, `None` until loaded
    pub fn get_actor_id(&self) -> Option<BodyId> {
        self.binding.as_ref().map(BodyBinding::actor_id)
    }

    /// Pose the actor was loaded at
    pub fn spawn_pose(&self) -> Option<Pose> {
        self.binding.as_ref().map(BodyBinding::spawn_pose)
    }

    pub fn body_ids(&self) -> &[BodyId] {
        self.binding.as_ref().map(BodyBinding::bodies).unwrap_or(&[])
    }

    /// Loads the actor into the backend at `spawn_pose`.
    ///
    /// An actor loads at most once. A failed load leaves it unloaded and
    /// removes any bodies it created before failing.
    pub fn load(
        &mut self,
        physics: &SharedPhysics,
        spawn_pose: Pose,
    ) -> Result<Vec<BodyId>, ActorError> {
        match self.lifecycle {
            Lifecycle::Loaded => {
                return Err(ActorError::DuplicateLoad {
                    kind: self.kind().to_string(),
                });
            }
            Lifecycle::Destroyed => {
                return Err(ActorError::Destroyed {
                    kind: self.kind().to_string(),
                });
            }
            Lifecycle::Unloaded => {}
        }

        let ids = {
            let mut guard = physics.lock().map_err(|_| WorldError::PhysicsPoisoned)?;
            let mut loader = AssetLoader::new(&mut *guard, spawn_pose);
            match self.actor.load_asset(&mut loader) {
                Ok(ids) if !ids.is_empty() => ids,
                Ok(_) => {
                    loader.rollback();
                    return Err(ActorError::NoBodies {
                        kind: self.kind().to_string(),
                    });
                }
                Err(error) => {
                    loader.rollback();
                    return Err(error);
                }
            }
        };

        let binding = BodyBinding::new(physics.clone(), ids.clone(), spawn_pose).ok_or_else(|| {
            ActorError::NoBodies {
                kind: self.kind().to_string(),
            }
        })?;

        tracing::trace!("Loaded {} actor as {}", self.kind(), binding.actor_id());
        self.binding = Some(binding);
        self.lifecycle = Lifecycle::Loaded;
        Ok(ids)
    }

    pub fn reset(&mut self) -> Result<(), ActorError> {
        let binding = bound(self.lifecycle, self.binding.as_ref(), self.actor.as_ref())?;
        self.actor.reset(binding)
    }

    pub fn get_observation(&self) -> Result<Observation, ActorError> {
        let binding = bound(self.lifecycle, self.binding.as_ref(), self.actor.as_ref())?;
        self.actor.get_observation(binding)
    }

    pub fn apply_action(&mut self, action: &Action) -> Result<(), ActorError> {
        let binding = bound(self.lifecycle, self.binding.as_ref(), self.actor.as_ref())?;
        self.actor.apply_action(binding, action)
    }

    /// Releases the backend bodies. No call is valid afterwards.
    pub fn destroy(&mut self) -> Result<(), ActorError> {
        let binding = bound(self.lifecycle, self.binding.as_ref(), self.actor.as_ref())?;
        self.actor.destroy(binding)?;
        self.binding = None;
        self.lifecycle = Lifecycle::Destroyed;
        Ok(())
    }
}

fn bound<'a>(
    lifecycle: Lifecycle,
    binding: Option<&'a BodyBinding>,
    actor: &dyn Actor,
) -> Result<&'a BodyBinding, ActorError> {
    match (lifecycle, binding) {
        (Lifecycle::Loaded, Some(binding)) => Ok(binding),
        (Lifecycle::Destroyed, _) => Err(ActorError::Destroyed {
            kind: actor.kind().to_string(),
        }),
        _ => Err(ActorError::NotLoaded {
            kind: actor.kind().to_string(),
        }),
    }
}

impl From<Box<dyn Actor>> for ActorCell {
    fn from(actor: Box<dyn Actor>) -> Self {
        ActorCell::new(actor)
    }
}
