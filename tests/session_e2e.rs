use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use shasta::actor::{Pedestrian, Vehicle};
use shasta::infra::{
    CompositeObserver, DefaultObserver, Pose, ProcessControl, ServerProcess, SessionObserver,
};
use shasta::world::{AssetLoader, BodyBinding, BodyDesc, GridMap, KinematicWorld, ServerEndpoint};
use shasta::{
    Action, Actor, ActorCell, ActorError, ActorFactory, BodyId, FaultPolicy, GroupTable,
    Observation, Observations, Orchestrator, OrchestratorError, Phase, Position, ProcessError,
    SessionConfig, WorldBinding, WorldError, WorldMap,
};

fn config() -> SessionConfig {
    SessionConfig {
        port: Some(2000),
        ..SessionConfig::default()
    }
}

fn world() -> KinematicWorld {
    KinematicWorld::new(GridMap::new("/assets"), 0.1)
}

fn two_groups() -> GroupTable {
    let mut groups = GroupTable::new();
    groups.add_group(
        "group1",
        vec![Box::new(Vehicle::new()), Box::new(Pedestrian::new(4))],
    );
    groups.add_actor("group2", Box::new(Vehicle::new()));
    groups
}

#[tokio::test]
async fn test_setup_spawns_every_group() {
    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    assert_eq!(orchestrator.phase(), Phase::ServerStarted);
    assert_eq!(
        orchestrator.endpoint(),
        Some(&ServerEndpoint::new("localhost", 2000))
    );

    orchestrator.setup_experiment(&json!(null)).await.unwrap();
    assert_eq!(orchestrator.phase(), Phase::ExperimentConfigured);

    let group1 = orchestrator.get_actors_by_group_id("group1").unwrap();
    let group2 = orchestrator.get_actors_by_group_id("group2").unwrap();
    assert_eq!(group1.len(), 2);
    assert_eq!(group2.len(), 1);
    assert!(group1.iter().chain(group2).all(|actor| actor.get_actor_id().is_some()));

    // Spawn points honor the minimum distance.
    let positions: Vec<Position> = group1
        .iter()
        .chain(group2)
        .filter_map(ActorCell::spawn_pose)
        .map(|pose| pose.position)
        .collect();
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            assert!(a.distance(b) >= 10.0);
        }
    }

    assert_eq!(orchestrator.get_map().unwrap().rows, 5);
    assert_eq!(orchestrator.get_map().unwrap().asset_path(), Path::new("/assets"));

    let model = orchestrator.get_world().unwrap().world_model().unwrap();
    assert_eq!(model, Path::new("/assets/environment_collision_free.urdf"));
}

#[tokio::test]
async fn test_ticks_return_ordered_observations() {
    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();

    let reset = orchestrator.reset().unwrap();
    let ids: Vec<Option<BodyId>> = orchestrator
        .get_actors_by_group_id("group1")
        .unwrap()
        .iter()
        .map(ActorCell::get_actor_id)
        .collect();

    assert_eq!(reset["group1"].len(), 2);

    let mut ticks = Vec::new();
    for _ in 0..3 {
        orchestrator
            .apply_actions(
                "group1",
                &[
                    Action::Drive {
                        speed: 4.0,
                        yaw_rate: 0.0,
                    },
                    Action::Wander,
                ],
            )
            .unwrap();
        ticks.push(orchestrator.tick().await.unwrap());
    }

    assert_eq!(orchestrator.tick_count(), 3);
    assert_eq!(orchestrator.phase(), Phase::Ticking);
    assert_eq!(ticks.len(), 3);
    for observations in &ticks {
        assert_eq!(observations.keys().collect::<Vec<_>>(), vec!["group1", "group2"]);
        let group1 = &observations["group1"];
        assert_eq!(group1.len(), 2);
        let observed: Vec<Option<BodyId>> = group1
            .iter()
            .map(|slot| slot.as_ref().ok().map(|obs| obs.actor_id))
            .collect();
        assert_eq!(observed, ids);
    }

    // The vehicle drove 4 m/s for 0.3 s along its heading.
    let vehicle = ticks[2]["group1"][0].as_ref().unwrap();
    let start = orchestrator.get_actors_by_group_id("group1").unwrap()[0]
        .spawn_pose()
        .unwrap();
    assert!((vehicle.pose.position.distance(&start.position) - 1.2).abs() < 1e-6);
}

#[tokio::test]
async fn test_list_layout_is_rejected_before_world_work() {
    let err = Orchestrator::from_layout(
        config(),
        world(),
        &json!(["vehicle", "pedestrian"]),
        &ActorFactory::with_builtin(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, OrchestratorError::Construction { .. }));
}

#[tokio::test]
async fn test_layout_session_runs() {
    let layout = json!({
        "cars": ["vehicle", "vehicle"],
        "walkers": {"kind": "pedestrian", "seed": 9},
        "mast": {"kind": "sensor", "params": {"range": 50.0}}
    });
    let mut orchestrator =
        Orchestrator::from_layout(config(), world(), &layout, &ActorFactory::with_builtin())
            .unwrap();
    orchestrator.init_server().await.unwrap();
    orchestrator.setup_experiment(&json!({"rows": 3, "cols": 3})).await.unwrap();

    let observations = orchestrator.reset().unwrap();
    assert_eq!(observations["cars"].len(), 2);
    assert!(observations.values().flatten().all(Result::is_ok));

    let sensor = observations["mast"][0].as_ref().unwrap();
    assert_eq!(sensor.features.len(), 8);
    assert!(sensor.features.iter().all(|distance| *distance <= 50.0));
}

#[tokio::test]
async fn test_phase_order_is_enforced() {
    let mut orchestrator = Orchestrator::new(config(), world(), two_groups());

    let err = orchestrator.setup_experiment(&json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Configuration {
            operation: "setup_experiment",
            phase: Phase::Uninitialized
        }
    ));

    orchestrator.init_server().await.unwrap();
    assert!(matches!(
        orchestrator.reset(),
        Err(OrchestratorError::Configuration { .. })
    ));
    assert!(matches!(
        orchestrator.tick().await,
        Err(OrchestratorError::Configuration { .. })
    ));
    assert!(matches!(
        orchestrator.init_server().await,
        Err(OrchestratorError::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_second_spawn_pass_skips_loaded_actors() {
    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();

    assert_eq!(orchestrator.spawn_actors().await.unwrap(), 0);
    assert_eq!(orchestrator.get_world().unwrap().spawned().len(), 3);
}

#[tokio::test]
async fn test_empty_map_cannot_spawn() {
    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    let err = orchestrator
        .setup_experiment(&json!({"rows": 0}))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoSpawnPoints { actors: 3 }));
    assert_eq!(orchestrator.phase(), Phase::ServerStarted);
}

#[tokio::test]
async fn test_closed_session_rejects_everything() {
    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();
    orchestrator.reset().unwrap();
    orchestrator.close_simulation().await.unwrap();

    assert_eq!(orchestrator.phase(), Phase::Closed);
    assert!(matches!(
        orchestrator.tick().await,
        Err(OrchestratorError::SessionClosed { operation: "tick" })
    ));
    assert!(matches!(
        orchestrator.get_actors_by_group_id("group1"),
        Err(OrchestratorError::SessionClosed { .. })
    ));
    assert!(matches!(
        orchestrator.close_simulation().await,
        Err(OrchestratorError::SessionClosed { .. })
    ));
}

#[tokio::test]
async fn test_action_count_must_match_group() {
    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();

    let err = orchestrator
        .apply_actions("group1", &[Action::Hold])
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::ActionCount {
            expected: 2,
            actual: 1,
            ..
        }
    ));
    assert!(matches!(
        orchestrator.apply_actions("nobody", &[]),
        Err(OrchestratorError::UnknownGroup { .. })
    ));
}

/// Loads fine but can never be observed.
#[derive(Debug)]
struct Broken;

impl Actor for Broken {
    fn kind(&self) -> &str {
        "broken"
    }

    fn load_asset(&mut self, loader: &mut AssetLoader<'_>) -> Result<Vec<BodyId>, ActorError> {
        Ok(vec![loader.create_body(&BodyDesc::new("crate.urdf", [0.5, 0.5, 0.5]))?])
    }

    fn reset(&mut self, _body: &BodyBinding) -> Result<(), ActorError> {
        Ok(())
    }

    fn get_observation(&self, _body: &BodyBinding) -> Result<Observation, ActorError> {
        Err(ActorError::Behavior {
            kind: "broken".to_string(),
            reason: "sensor offline".to_string(),
        })
    }

    fn apply_action(&mut self, _body: &BodyBinding, _action: &Action) -> Result<(), ActorError> {
        Ok(())
    }

    fn destroy(&mut self, body: &BodyBinding) -> Result<(), ActorError> {
        Ok(body.remove_all()?)
    }
}

fn with_broken_actor() -> GroupTable {
    let mut groups = two_groups();
    groups.add_actor("group2", Box::new(Broken));
    groups
}

#[tokio::test]
async fn test_isolated_fault_keeps_session_alive() {
    let mut orchestrator = Orchestrator::launch(config(), world(), with_broken_actor())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();

    let reset = orchestrator.reset().unwrap();
    assert!(reset["group1"].iter().all(Result::is_ok));
    assert!(reset["group2"][0].is_ok());
    assert!(matches!(reset["group2"][1], Err(ActorError::Behavior { .. })));

    let tick = orchestrator.tick().await.unwrap();
    assert_eq!(tick["group2"].len(), 2);
    assert!(tick["group2"][1].is_err());
}

#[tokio::test]
async fn test_abort_policy_fails_the_phase() {
    let config = SessionConfig {
        fault_policy: FaultPolicy::Abort,
        ..config()
    };
    let mut orchestrator = Orchestrator::launch(config, world(), with_broken_actor())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();

    let err = orchestrator.reset().unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Actor { ref group, index: 1, .. } if group == "group2"
    ));
}

/// Kinematic world with a slow clock and an unreliable disconnect.
struct ScriptedWorld {
    inner: KinematicWorld,
    tick_delay: Duration,
    fail_disconnect: bool,
}

impl ScriptedWorld {
    fn new() -> Self {
        Self {
            inner: world(),
            tick_delay: Duration::ZERO,
            fail_disconnect: false,
        }
    }
}

impl WorldBinding for ScriptedWorld {
    type Map = GridMap;

    async fn connect(&mut self, endpoint: &ServerEndpoint) -> Result<(), WorldError> {
        self.inner.connect(endpoint).await
    }

    fn get_map(&self) -> &GridMap {
        self.inner.get_map()
    }

    fn get_map_mut(&mut self) -> &mut GridMap {
        self.inner.get_map_mut()
    }

    async fn load_world_model(&mut self, path: &Path) -> Result<(), WorldError> {
        self.inner.load_world_model(path).await
    }

    async fn spawn_actor(
        &mut self,
        actor: &mut ActorCell,
        position: Position,
    ) -> Result<Vec<BodyId>, ActorError> {
        self.inner.spawn_actor(actor, position).await
    }

    async fn tick(&mut self) -> Result<(), WorldError> {
        tokio::time::sleep(self.tick_delay).await;
        self.inner.tick().await
    }

    async fn disconnect(&mut self) -> Result<(), WorldError> {
        if self.fail_disconnect {
            return Err(WorldError::NotConnected);
        }
        self.inner.disconnect().await
    }
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let config = SessionConfig {
        backend_timeout: Duration::from_millis(20),
        ..config()
    };
    let world = ScriptedWorld {
        tick_delay: Duration::from_millis(500),
        ..ScriptedWorld::new()
    };
    let mut orchestrator = Orchestrator::launch(config, world, two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();
    orchestrator.reset().unwrap();

    let err = orchestrator.tick().await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::BackendTimeout {
            operation: "tick",
            timeout_ms: 20
        }
    ));
    assert_eq!(orchestrator.tick_count(), 0);
    assert_eq!(orchestrator.phase(), Phase::Reset);
}

#[tokio::test]
async fn test_failed_disconnect_still_closes() {
    let world = ScriptedWorld {
        fail_disconnect: true,
        ..ScriptedWorld::new()
    };
    let mut orchestrator = Orchestrator::launch(config(), world, two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();
    orchestrator.tick().await.unwrap();

    let err = orchestrator.close_simulation().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::World(WorldError::NotConnected)));
    assert_eq!(orchestrator.phase(), Phase::Closed);
    assert!(matches!(
        orchestrator.tick().await,
        Err(OrchestratorError::SessionClosed { operation: "tick" })
    ));
}

/// Records session events as short strings.
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl SessionObserver for Recorder {
    fn on_server_started(&mut self, endpoint: &ServerEndpoint) {
        self.push(format!("started {}", endpoint));
    }

    fn on_actor_spawned(&mut self, group_id: &str, index: usize, _actor_id: BodyId, _pose: Pose) {
        self.push(format!("spawned {}[{}]", group_id, index));
    }

    fn on_experiment_configured(&mut self, groups: &GroupTable) {
        self.push(format!("configured {}", groups.total_actors()));
    }

    fn on_reset(&mut self, observations: &Observations) {
        self.push(format!("reset {}", observations.len()));
    }

    fn on_tick(&mut self, tick: u64, _observations: &Observations) {
        self.push(format!("tick {}", tick));
    }

    fn on_actor_fault(&mut self, group_id: &str, index: usize, error: &ActorError) {
        let kind = match error {
            ActorError::DuplicateLoad { .. } => "duplicate",
            _ => "other",
        };
        self.push(format!("fault {}[{}] {}", group_id, index, kind));
    }

    fn on_session_closed(&mut self, ticks: u64) {
        self.push(format!("closed {}", ticks));
    }
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn test_observer_sees_the_whole_session() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let observer = CompositeObserver::new(vec![
        Box::new(DefaultObserver),
        Box::new(Recorder {
            events: events.clone(),
        }),
    ]);
    let mut orchestrator = Orchestrator::new(config(), world(), two_groups()).with_observer(observer);

    orchestrator.init_server().await.unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();
    orchestrator.spawn_actors().await.unwrap();
    orchestrator.reset().unwrap();
    orchestrator.tick().await.unwrap();
    orchestrator.close_simulation().await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "started localhost:2000",
            "spawned group1[0]",
            "spawned group1[1]",
            "spawned group2[0]",
            "configured 3",
            "fault group1[0] duplicate",
            "fault group1[1] duplicate",
            "fault group2[0] duplicate",
            "reset 2",
            "tick 1",
            "closed 1",
        ]
    );
}

#[derive(Default)]
struct FakeServers {
    running: RefCell<Vec<ServerProcess>>,
}

impl ProcessControl for FakeServers {
    fn list(&self, pattern: &str) -> Result<Vec<ServerProcess>, ProcessError> {
        Ok(self
            .running
            .borrow()
            .iter()
            .filter(|process| process.name.to_lowercase().contains(pattern))
            .cloned()
            .collect())
    }

    fn kill(&self, pid: u32) -> Result<(), ProcessError> {
        self.running.borrow_mut().retain(|process| process.pid != pid);
        Ok(())
    }
}

#[tokio::test]
async fn test_terminate_closes_and_kills_servers() {
    let servers = FakeServers::default();
    servers.running.borrow_mut().extend([
        ServerProcess {
            pid: 11,
            name: "CarlaUE4".to_string(),
        },
        ServerProcess {
            pid: 12,
            name: "bash".to_string(),
        },
    ]);

    let mut orchestrator = Orchestrator::launch(config(), world(), two_groups())
        .await
        .unwrap();
    orchestrator.setup_experiment(&json!({})).await.unwrap();

    assert_eq!(orchestrator.terminate(&servers).await.unwrap(), 1);
    assert_eq!(orchestrator.phase(), Phase::Closed);
    assert_eq!(servers.running.borrow().len(), 1);
}
