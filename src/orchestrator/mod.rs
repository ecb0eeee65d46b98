//! Session orchestration: server start, experiment setup, spawning, reset,
//! lockstep ticking and shutdown.
//!
//! ```text
//! Uninitialized ─init_server─▶ ServerStarted ─setup_experiment─▶ ExperimentConfigured
//!                                                                  │        ▲
//!                                                           reset/tick      │
//!                                                                  ▼        │
//!                                                             Reset ⇄ Ticking
//! any phase ─close_simulation─▶ Closed
//! ```
//!
//! Every phase walks the group table sequentially in insertion order and
//! awaits one backend call at a time.

mod groups;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use indexmap::IndexMap;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::actor::{ActorCell, Lifecycle};
use crate::error::{ActorError, OrchestratorError};
use crate::infra::{
    Action, DefaultObserver, FaultPolicy, Observation, ProcessControl, SessionConfig,
    SessionObserver, SpawnPlanner, kill_all_servers,
};
use crate::world::{ServerEndpoint, WorldBinding, WorldMap};

pub use groups::{ActorFactory, ActorSpec, GroupTable};

/// Per-group observations, one slot per actor in group order.
pub type Observations = IndexMap<String, Vec<Result<Observation, ActorError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    ServerStarted,
    ExperimentConfigured,
    Reset,
    Ticking,
    Closed,
}

impl Phase {
    /// Whether actors are spawned and the session can reset or tick
    pub fn is_configured(self) -> bool {
        matches!(
            self,
            Phase::ExperimentConfigured | Phase::Reset | Phase::Ticking
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::ServerStarted => "server started",
            Phase::ExperimentConfigured => "experiment configured",
            Phase::Reset => "reset",
            Phase::Ticking => "ticking",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Drives a population of actors against a world backend in lockstep.
pub struct Orchestrator<W: WorldBinding> {
    config: SessionConfig,
    world: W,
    groups: GroupTable,
    observer: Box<dyn SessionObserver>,
    phase: Phase,
    endpoint: Option<ServerEndpoint>,
    ticks: u64,
}

impl<W: WorldBinding> Orchestrator<W> {
    pub fn new(config: SessionConfig, world: W, groups: GroupTable) -> Self {
        Self {
            config,
            world,
            groups,
            observer: Box::new(DefaultObserver),
            phase: Phase::Uninitialized,
            endpoint: None,
            ticks: 0,
        }
    }

    /// Builds the group table from a JSON layout. Fails before touching the world.
    pub fn from_layout(
        config: SessionConfig,
        world: W,
        layout: &Value,
        factory: &ActorFactory,
    ) -> Result<Self, OrchestratorError> {
        let groups = GroupTable::from_layout(layout, factory)?;
        Ok(Self::new(config, world, groups))
    }

    /// Creates the orchestrator and starts the server right away.
    pub async fn launch(
        config: SessionConfig,
        world: W,
        groups: GroupTable,
    ) -> Result<Self, OrchestratorError> {
        let mut orchestrator = Self::new(config, world, groups);
        orchestrator.init_server().await?;
        Ok(orchestrator)
    }

    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> Option<&ServerEndpoint> {
        self.endpoint.as_ref()
    }

    /// Connects the world binding, on a random port unless one is configured.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn init_server(&mut self) -> Result<(), OrchestratorError> {
        self.ensure_open("init_server")?;
        self.require("init_server", |phase| phase == Phase::Uninitialized)?;

        let port = match self.config.port {
            Some(port) => port,
            None => {
                let (low, high) = self.config.port_range;
                rand::rng().random_range(low.min(high)..=low.max(high))
            }
        };
        let endpoint = ServerEndpoint::new(self.config.host.clone(), port);

        let timeout = self.config.backend_timeout;
        backend_call(timeout, "connect", self.world.connect(&endpoint)).await??;

        self.observer.on_server_started(&endpoint);
        self.endpoint = Some(endpoint);
        self.phase = Phase::ServerStarted;
        Ok(())
    }

    /// Sets up the map, loads the world model and spawns every actor.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn setup_experiment(&mut self, experiment: &Value) -> Result<(), OrchestratorError> {
        self.ensure_open("setup_experiment")?;
        self.require("setup_experiment", |phase| phase == Phase::ServerStarted)?;

        self.world.get_map_mut().setup(experiment)?;
        let model = self
            .world
            .get_map()
            .asset_path()
            .join(&self.config.world_model_file);

        let timeout = self.config.backend_timeout;
        backend_call(timeout, "load_world_model", self.world.load_world_model(&model)).await??;

        self.spawn_actors().await?;

        self.phase = Phase::ExperimentConfigured;
        self.observer.on_experiment_configured(&self.groups);
        Ok(())
    }

    /// Places and loads every actor that is not loaded yet.
    ///
    /// Each group asks the planner for as many points as it has actors and
    /// the points are handed out in group order. Actors that are already
    /// loaded are reported and skipped. Returns how many actors were loaded.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn spawn_actors(&mut self) -> Result<usize, OrchestratorError> {
        self.ensure_open("spawn_actors")?;
        self.require("spawn_actors", |phase| phase != Phase::Uninitialized)?;

        let total = self.groups.total_actors();
        let pending = self
            .groups
            .iter()
            .flat_map(|(_, actors)| actors)
            .filter(|actor| actor.lifecycle() == Lifecycle::Unloaded)
            .count();
        let candidates = self.world.get_map().get_cartesian_spawn_points();
        if candidates.is_empty() && pending > 0 {
            return Err(OrchestratorError::NoSpawnPoints { actors: pending });
        }

        let timeout = self.config.backend_timeout;
        let mut planner = SpawnPlanner::new(&candidates, self.config.min_spawn_distance);
        let mut spawned = 0;

        for (group_id, actors) in self.groups.iter_mut() {
            let positions = planner.place(actors.len());
            for (index, (actor, position)) in actors.iter_mut().zip(positions).enumerate() {
                match backend_call(timeout, "spawn_actor", self.world.spawn_actor(actor, position))
                    .await?
                {
                    Ok(_) => {
                        spawned += 1;
                        if let (Some(actor_id), Some(pose)) =
                            (actor.get_actor_id(), actor.spawn_pose())
                        {
                            self.observer.on_actor_spawned(group_id, index, actor_id, pose);
                        }
                    }
                    Err(error @ ActorError::DuplicateLoad { .. }) => {
                        warn!("Skipping {}[{}]: {}", group_id, index, error);
                        self.observer.on_actor_fault(group_id, index, &error);
                    }
                    Err(source) => {
                        return Err(OrchestratorError::Actor {
                            group: group_id.to_string(),
                            index,
                            source,
                        });
                    }
                }
            }
        }

        info!("Spawned {} of {} actors", spawned, total);
        Ok(spawned)
    }

    /// Resets every actor and returns its first observation.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn reset(&mut self) -> Result<Observations, OrchestratorError> {
        self.ensure_open("reset")?;
        self.require("reset", Phase::is_configured)?;

        let policy = self.config.fault_policy;
        let mut observations = Observations::with_capacity(self.groups.len());

        for (group_id, actors) in self.groups.iter_mut() {
            let mut slots = Vec::with_capacity(actors.len());
            for (index, actor) in actors.iter_mut().enumerate() {
                let slot = actor.reset().and_then(|()| actor.get_observation());
                slots.push(record(policy, &mut *self.observer, group_id, index, slot)?);
            }
            observations.insert(group_id.to_string(), slots);
        }

        self.phase = Phase::Reset;
        self.observer.on_reset(&observations);
        Ok(observations)
    }

    /// Advances the world one step, then observes every actor.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn tick(&mut self) -> Result<Observations, OrchestratorError> {
        self.ensure_open("tick")?;
        self.require("tick", Phase::is_configured)?;

        let timeout = self.config.backend_timeout;
        backend_call(timeout, "tick", self.world.tick()).await??;
        self.ticks += 1;

        let policy = self.config.fault_policy;
        let mut observations = Observations::with_capacity(self.groups.len());

        for (group_id, actors) in self.groups.iter() {
            let mut slots = Vec::with_capacity(actors.len());
            for (index, actor) in actors.iter().enumerate() {
                let slot = actor.get_observation();
                slots.push(record(policy, &mut *self.observer, group_id, index, slot)?);
            }
            observations.insert(group_id.to_string(), slots);
        }

        self.phase = Phase::Ticking;
        self.observer.on_tick(self.ticks, &observations);
        Ok(observations)
    }

    /// Applies one action per actor of `group_id`, in group order.
    pub fn apply_actions(
        &mut self,
        group_id: &str,
        actions: &[Action],
    ) -> Result<(), OrchestratorError> {
        self.ensure_open("apply_actions")?;
        self.require("apply_actions", Phase::is_configured)?;

        let actors = self.groups.get_group_mut(group_id)?;
        if actors.len() != actions.len() {
            return Err(OrchestratorError::ActionCount {
                group: group_id.to_string(),
                expected: actors.len(),
                actual: actions.len(),
            });
        }

        for (index, (actor, action)) in actors.iter_mut().zip(actions).enumerate() {
            actor
                .apply_action(action)
                .map_err(|source| OrchestratorError::Actor {
                    group: group_id.to_string(),
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    /// Destroys the loaded actors and disconnects from the world.
    ///
    /// The session ends `Closed` even when the disconnect fails, since the
    /// actors are gone by then; the disconnect error is still returned.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn close_simulation(&mut self) -> Result<(), OrchestratorError> {
        self.ensure_open("close_simulation")?;

        for (group_id, actors) in self.groups.iter_mut() {
            for (index, actor) in actors.iter_mut().enumerate() {
                if !actor.is_loaded() {
                    continue;
                }
                if let Err(error) = actor.destroy() {
                    warn!("Failed to destroy {}[{}]: {}", group_id, index, error);
                    self.observer.on_actor_fault(group_id, index, &error);
                }
            }
        }

        let disconnected = if self.phase != Phase::Uninitialized {
            let timeout = self.config.backend_timeout;
            backend_call(timeout, "disconnect", self.world.disconnect())
                .await
                .and_then(|result| result.map_err(OrchestratorError::from))
        } else {
            Ok(())
        };

        self.phase = Phase::Closed;
        self.observer.on_session_closed(self.ticks);
        disconnected
    }

    /// Recovery path: closes the session as far as possible, then kills any
    /// server process left behind. Returns the number of killed processes.
    pub async fn terminate(
        &mut self,
        processes: &dyn ProcessControl,
    ) -> Result<usize, OrchestratorError> {
        if self.phase != Phase::Closed {
            if let Err(error) = self.close_simulation().await {
                warn!("Closing the session failed, forcing shutdown: {}", error);
                self.phase = Phase::Closed;
            }
        }

        let killed = kill_all_servers(processes, &self.config.server_process_pattern)?;
        if killed > 0 {
            info!("Killed {} server processes", killed);
        }
        Ok(killed)
    }

    pub fn get_world(&self) -> Result<&W, OrchestratorError> {
        self.ensure_open("get_world")?;
        Ok(&self.world)
    }

    pub fn get_map(&self) -> Result<&W::Map, OrchestratorError> {
        self.ensure_open("get_map")?;
        Ok(self.world.get_map())
    }

    pub fn get_actor_groups(&self) -> Result<&GroupTable, OrchestratorError> {
        self.ensure_open("get_actor_groups")?;
        Ok(&self.groups)
    }

    pub fn get_actors_by_group_id(&self, group_id: &str) -> Result<&[ActorCell], OrchestratorError> {
        self.ensure_open("get_actors_by_group_id")?;
        self.groups.get_group(group_id)
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), OrchestratorError> {
        if self.phase == Phase::Closed {
            return Err(OrchestratorError::SessionClosed { operation });
        }
        Ok(())
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: impl Fn(Phase) -> bool,
    ) -> Result<(), OrchestratorError> {
        if !allowed(self.phase) {
            return Err(OrchestratorError::Configuration {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }
}

/// Awaits a backend call, giving up after `timeout`.
async fn backend_call<T, E>(
    timeout: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, E>>,
) -> Result<Result<T, E>, OrchestratorError> {
    debug!("Backend call {}", operation);
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| OrchestratorError::BackendTimeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        })
}

fn record(
    policy: FaultPolicy,
    observer: &mut dyn SessionObserver,
    group_id: &str,
    index: usize,
    slot: Result<Observation, ActorError>,
) -> Result<Result<Observation, ActorError>, OrchestratorError> {
    match slot {
        Ok(observation) => Ok(Ok(observation)),
        Err(source) if policy == FaultPolicy::Abort => Err(OrchestratorError::Actor {
            group: group_id.to_string(),
            index,
            source,
        }),
        Err(error) => {
            observer.on_actor_fault(group_id, index, &error);
            Ok(Err(error))
        }
    }
}
