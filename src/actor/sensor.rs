use crate::actor::Actor;
use crate::error::ActorError;
use crate::infra::{Action, BodyId, Observation, Pose};
use crate::world::{AssetLoader, BodyBinding, BodyDesc};

/// Fixed mast with a range sensor on top.
///
/// Observations report the distances to the nearest other bodies, one per
/// channel, padded with the sensor range when fewer bodies are in reach.
#[derive(Debug, Clone)]
pub struct SensorCarrier {
    initial_pose: Option<Pose>,
    range: f64,
    channels: usize,
    mast_height: f64,
}

impl SensorCarrier {
    pub fn new(range: f64) -> Self {
        Self {
            initial_pose: None,
            range,
            channels: 8,
            mast_height: 3.0,
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.initial_pose = Some(pose);
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }
}

impl Actor for SensorCarrier {
    fn kind(&self) -> &str {
        "sensor"
    }

    fn initial_pose(&self) -> Option<Pose> {
        self.initial_pose
    }

    fn load_asset(&mut self, loader: &mut AssetLoader<'_>) -> Result<Vec<BodyId>, ActorError> {
        let base = loader.spawn_pose();
        let mast = loader
            .create_body(&BodyDesc::new("mast.urdf", [0.2, 0.2, self.mast_height / 2.0]).fixed())?;
        let head = loader.create_body_at(
            &BodyDesc::new("range_sensor.urdf", [0.1, 0.1, 0.1]).fixed(),
            Pose::new(base.position.offset(0.0, 0.0, self.mast_height), base.yaw),
        )?;
        Ok(vec![mast, head])
    }

    fn reset(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        body.teleport(body.spawn_pose())?;
        Ok(())
    }

    fn get_observation(&self, body: &BodyBinding) -> Result<Observation, ActorError> {
        let mut features: Vec<f64> = body
            .nearby(self.range)?
            .into_iter()
            .take(self.channels)
            .map(|(_, distance)| distance)
            .collect();
        features.resize(self.channels, self.range);

        Ok(Observation {
            actor_id: body.actor_id(),
            pose: body.pose()?,
            features,
        })
    }

    fn apply_action(&mut self, _body: &BodyBinding, action: &Action) -> Result<(), ActorError> {
        match action {
            Action::Hold => Ok(()),
            _ => Err(ActorError::UnsupportedAction {
                kind: self.kind().to_string(),
                action: action.name().to_string(),
            }),
        }
    }

    fn destroy(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        body.remove_all()?;
        Ok(())
    }
}
