use std::env;
use std::fs;

use dotenv::dotenv;
use serde_json::{Value, json};
use shasta::infra::SystemProcessControl;
use shasta::world::{GridMap, KinematicWorld};
use shasta::{
    Action, ActorFactory, GroupTable, Orchestrator, OrchestratorError, Phase, SessionConfig,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn get_env_var_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|val| val.parse::<u64>().ok())
}

fn get_env_var_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|val| val.parse::<f64>().ok())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shasta=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn default_layout() -> Value {
    json!({
        "vehicles": ["vehicle", {"kind": "vehicle", "params": {"max_speed": 8.0}}],
        "pedestrians": [
            {"kind": "pedestrian", "seed": 1},
            {"kind": "pedestrian", "seed": 2},
            {"kind": "pedestrian", "seed": 3}
        ],
        "masts": {"kind": "sensor", "params": {"range": 40.0}}
    })
}

fn load_layout() -> Result<Value, Box<dyn std::error::Error>> {
    match env::var("SHASTA_LAYOUT") {
        Ok(path) => {
            info!("Loading actor layout from {}", path);
            Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
        }
        Err(_) => Ok(default_layout()),
    }
}

/// Picks one action per actor: vehicles cruise, pedestrians wander, the rest hold.
fn choose_actions(groups: &GroupTable, group_id: &str) -> Vec<Action> {
    let Ok(actors) = groups.get_group(group_id) else {
        return Vec::new();
    };
    actors
        .iter()
        .map(|actor| match actor.kind() {
            "vehicle" => Action::Drive {
                speed: 5.0,
                yaw_rate: 0.1,
            },
            "pedestrian" => Action::Wander,
            _ => Action::Hold,
        })
        .collect()
}

async fn run_session(
    orchestrator: &mut Orchestrator<KinematicWorld>,
    ticks: u64,
) -> Result<(), OrchestratorError> {
    orchestrator.init_server().await?;
    orchestrator.setup_experiment(&json!({"rows": 6, "cols": 6})).await?;
    orchestrator.reset()?;

    for _ in 0..ticks {
        let group_ids: Vec<String> = orchestrator
            .get_actor_groups()?
            .group_ids()
            .map(str::to_string)
            .collect();
        for group_id in &group_ids {
            let actions = choose_actions(orchestrator.get_actor_groups()?, group_id);
            orchestrator.apply_actions(group_id, &actions)?;
        }
        orchestrator.tick().await?;
    }

    orchestrator.close_simulation().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = SessionConfig::from_env();
    let asset_path = env::var("SHASTA_ASSET_PATH").unwrap_or_else(|_| "assets".to_string());
    let timestep = get_env_var_f64("SHASTA_TIMESTEP").unwrap_or(0.1);
    let ticks = get_env_var_u64("SHASTA_TICKS").unwrap_or(10);

    let layout = load_layout()?;
    let world = KinematicWorld::new(GridMap::new(asset_path), timestep);
    let mut orchestrator =
        Orchestrator::from_layout(config, world, &layout, &ActorFactory::with_builtin())?;

    if let Err(err) = run_session(&mut orchestrator, ticks).await {
        error!("Session failed: {}", err);
        if orchestrator.config().kill_servers_on_error {
            let killed = orchestrator.terminate(&SystemProcessControl).await?;
            info!("Cleaned up {} server processes", killed);
        } else if orchestrator.phase() != Phase::Closed {
            if let Err(close_err) = orchestrator.close_simulation().await {
                warn!("Failed to close the session: {}", close_err);
            }
        }
        return Err(err.into());
    }

    Ok(())
}
