use tracing::{debug, info, warn};

use crate::error::ActorError;
use crate::infra::{BodyId, Pose, SessionObserver};
use crate::orchestrator::{GroupTable, Observations};
use crate::world::ServerEndpoint;

pub struct DefaultObserver;

impl DefaultObserver {
    fn log_observations(observations: &Observations) {
        for (group_id, slots) in observations {
            for (index, slot) in slots.iter().enumerate() {
                match slot {
                    Ok(obs) => debug!(
                        "  {}[{}] {}: pos ({:.2}, {:.2}, {:.2}) yaw {:.2} features {:?}",
                        group_id,
                        index,
                        obs.actor_id,
                        obs.pose.position.x,
                        obs.pose.position.y,
                        obs.pose.position.z,
                        obs.pose.yaw,
                        obs.features
                    ),
                    Err(error) => debug!("  {}[{}] failed: {}", group_id, index, error),
                }
            }
        }
    }
}

impl SessionObserver for DefaultObserver {
    fn on_server_started(&mut self, endpoint: &ServerEndpoint) {
        info!("Server started at {}", endpoint);
    }

    fn on_actor_spawned(&mut self, group_id: &str, index: usize, actor_id: BodyId, pose: Pose) {
        debug!(
            "Spawned {}[{}] as {} at ({:.2}, {:.2}, {:.2})",
            group_id, index, actor_id, pose.position.x, pose.position.y, pose.position.z
        );
    }

    fn on_experiment_configured(&mut self, groups: &GroupTable) {
        info!("Experiment configured");
        for (group_id, actors) in groups.iter() {
            info!("- group {}: {} actors", group_id, actors.len());
        }
    }

    fn on_reset(&mut self, observations: &Observations) {
        info!("Reset {} groups", observations.len());
        Self::log_observations(observations);
    }

    fn on_tick(&mut self, tick: u64, observations: &Observations) {
        let failed = observations
            .values()
            .flat_map(|slots| slots.iter())
            .filter(|slot| slot.is_err())
            .count();
        info!("tick: {}, groups: {}, failed actors: {}", tick, observations.len(), failed);
        Self::log_observations(observations);
    }

    fn on_actor_fault(&mut self, group_id: &str, index: usize, error: &ActorError) {
        warn!("Actor {}[{}] failed: {}", group_id, index, error);
    }

    fn on_session_closed(&mut self, ticks: u64) {
        info!("Session closed after {} ticks", ticks);
    }
}
