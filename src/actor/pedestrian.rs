use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::actor::Actor;
use crate::error::ActorError;
use crate::infra::{Action, BodyId, Observation, Pose, Velocity};
use crate::world::{AssetLoader, BodyBinding, BodyDesc};

const MAX_WALKING_SPEED: f64 = 2.5;

/// Walker that either follows commands or wanders with a seeded heading.
#[derive(Debug, Clone)]
pub struct Pedestrian {
    initial_pose: Option<Pose>,
    seed: u64,
    walking_speed: f64,
    rng: StdRng,
}

impl Pedestrian {
    pub fn new(seed: u64) -> Self {
        Self {
            initial_pose: None,
            seed,
            walking_speed: 1.4,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.initial_pose = Some(pose);
        self
    }

    pub fn with_walking_speed(mut self, speed: f64) -> Self {
        self.walking_speed = speed.clamp(0.0, MAX_WALKING_SPEED);
        self
    }
}

impl Actor for Pedestrian {
    fn kind(&self) -> &str {
        "pedestrian"
    }

    fn initial_pose(&self) -> Option<Pose> {
        self.initial_pose
    }

    fn load_asset(&mut self, loader: &mut AssetLoader<'_>) -> Result<Vec<BodyId>, ActorError> {
        let walker = loader.create_body(&BodyDesc::new("walker.urdf", [0.3, 0.3, 0.9]))?;
        Ok(vec![walker])
    }

    fn reset(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        self.rng = StdRng::seed_from_u64(self.seed);
        body.set_velocity(Velocity::default())?;
        body.teleport(body.spawn_pose())?;
        Ok(())
    }

    /// Features: `[speed, heading]`
    fn get_observation(&self, body: &BodyBinding) -> Result<Observation, ActorError> {
        let pose = body.pose()?;
        let velocity = body.velocity()?;
        Ok(Observation {
            actor_id: body.actor_id(),
            pose,
            features: vec![velocity.speed, pose.yaw],
        })
    }

    fn apply_action(&mut self, body: &BodyBinding, action: &Action) -> Result<(), ActorError> {
        match *action {
            Action::Drive { speed, yaw_rate } => {
                body.set_velocity(Velocity::new(
                    speed.clamp(0.0, MAX_WALKING_SPEED),
                    yaw_rate,
                ))?;
            }
            Action::Hold => body.set_velocity(Velocity::default())?,
            Action::Wander => {
                let heading = self.rng.random_range(-PI..PI);
                let pose = body.pose()?;
                body.teleport(Pose::new(pose.position, heading))?;
                body.set_velocity(Velocity::new(self.walking_speed, 0.0))?;
            }
        }
        Ok(())
    }

    fn destroy(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        body.remove_all()?;
        Ok(())
    }
}
