use crate::actor::Actor;
use crate::error::ActorError;
use crate::infra::{Action, BodyId, Observation, Pose, Velocity};
use crate::world::{AssetLoader, BodyBinding, BodyDesc};

#[derive(Debug, Clone, Default)]
struct VehicleState {
    commands: u64,
}

/// Car-like actor driven by speed and yaw-rate commands.
#[derive(Debug, Clone)]
pub struct Vehicle {
    initial_pose: Option<Pose>,
    max_speed: f64,
    state: VehicleState,
}

impl Default for Vehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl Vehicle {
    pub fn new() -> Self {
        Self {
            initial_pose: None,
            max_speed: 15.0,
            state: VehicleState::default(),
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.initial_pose = Some(pose);
        self
    }

    /// Non-finite limits are ignored and the current limit is kept.
    pub fn with_max_speed(mut self, max_speed: f64) -> Self {
        if max_speed.is_finite() {
            self.max_speed = max_speed.abs();
        } else {
            tracing::warn!("Ignoring non-finite vehicle max speed {}", max_speed);
        }
        self
    }
}

impl Actor for Vehicle {
    fn kind(&self) -> &str {
        "vehicle"
    }

    fn initial_pose(&self) -> Option<Pose> {
        self.initial_pose
    }

    fn load_asset(&mut self, loader: &mut AssetLoader<'_>) -> Result<Vec<BodyId>, ActorError> {
        let chassis = loader.create_body(&BodyDesc::new("vehicle.urdf", [2.25, 0.9, 0.75]))?;
        Ok(vec![chassis])
    }

    fn reset(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        self.state = VehicleState::default();
        body.set_velocity(Velocity::default())?;
        body.teleport(body.spawn_pose())?;
        Ok(())
    }

    /// Features: `[speed, yaw_rate, commands received]`
    fn get_observation(&self, body: &BodyBinding) -> Result<Observation, ActorError> {
        let velocity = body.velocity()?;
        Ok(Observation {
            actor_id: body.actor_id(),
            pose: body.pose()?,
            features: vec![velocity.speed, velocity.yaw_rate, self.state.commands as f64],
        })
    }

    fn apply_action(&mut self, body: &BodyBinding, action: &Action) -> Result<(), ActorError> {
        let velocity = match *action {
            // Reverse is capped at half the forward limit.
            Action::Drive { speed, yaw_rate } => Velocity::new(
                speed.clamp(-self.max_speed / 2.0, self.max_speed),
                yaw_rate,
            ),
            Action::Hold => Velocity::default(),
            Action::Wander => {
                return Err(ActorError::UnsupportedAction {
                    kind: self.kind().to_string(),
                    action: action.name().to_string(),
                });
            }
        };
        body.set_velocity(velocity)?;
        self.state.commands += 1;
        Ok(())
    }

    fn destroy(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        body.remove_all()?;
        Ok(())
    }
}
