use crate::error::ActorError;
use crate::infra::{BodyId, Pose};
use crate::orchestrator::{GroupTable, Observations};
use crate::world::ServerEndpoint;

/// Trait for observing session events during orchestration
pub trait SessionObserver {
    /// Called when the backend connection is established
    fn on_server_started(&mut self, endpoint: &ServerEndpoint);

    /// Called after an actor has been loaded into the world
    fn on_actor_spawned(&mut self, group_id: &str, index: usize, actor_id: BodyId, pose: Pose);

    /// Called once the experiment is set up and all actors are spawned
    fn on_experiment_configured(&mut self, groups: &GroupTable);

    /// Called after every actor has been reset
    fn on_reset(&mut self, observations: &Observations);

    /// Called after each simulation tick
    fn on_tick(&mut self, tick: u64, observations: &Observations);

    /// Called when a single actor fails and the session carries on without it
    fn on_actor_fault(&mut self, _group_id: &str, _index: usize, _error: &ActorError) {
        // Default implementation does nothing
    }

    /// Called when the session is closed
    fn on_session_closed(&mut self, ticks: u64);
}
