use std::env;
use std::str::FromStr;
use std::time::Duration;

/// What the orchestrator does when a single actor fails during reset or tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Record the error in the actor's slot and keep going
    #[default]
    Isolate,
    /// Abort the whole phase at the first failure
    Abort,
}

impl FaultPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "isolate" => Some(FaultPolicy::Isolate),
            "abort" => Some(FaultPolicy::Abort),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    /// Fixed server port; a random port from `port_range` is used when unset
    pub port: Option<u16>,
    pub port_range: (u16, u16),
    pub min_spawn_distance: f64,
    /// World model file, relative to the map's asset path
    pub world_model_file: String,
    pub backend_timeout: Duration,
    pub fault_policy: FaultPolicy,
    /// Name fragment used to find stray server processes
    pub server_process_pattern: String,
    /// Kill matching server processes when a session fails
    pub kill_servers_on_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            port_range: (2000, 3000),
            min_spawn_distance: 10.0,
            world_model_file: "environment_collision_free.urdf".to_string(),
            backend_timeout: Duration::from_secs(10),
            fault_policy: FaultPolicy::Isolate,
            server_process_pattern: "carla".to_string(),
            kill_servers_on_error: false,
        }
    }
}

impl SessionConfig {
    /// Reads `SHASTA_*` environment variables on top of the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`] with a custom variable source.
    /// Values that fail to parse keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port_range = (
            get_var(&lookup, "SHASTA_PORT_MIN").unwrap_or(defaults.port_range.0),
            get_var(&lookup, "SHASTA_PORT_MAX").unwrap_or(defaults.port_range.1),
        );

        Self {
            host: lookup("SHASTA_HOST").unwrap_or(defaults.host),
            port: get_var(&lookup, "SHASTA_PORT"),
            port_range,
            min_spawn_distance: get_var(&lookup, "SHASTA_MIN_SPAWN_DISTANCE")
                .unwrap_or(defaults.min_spawn_distance),
            world_model_file: lookup("SHASTA_WORLD_MODEL").unwrap_or(defaults.world_model_file),
            backend_timeout: get_var(&lookup, "SHASTA_BACKEND_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backend_timeout),
            fault_policy: lookup("SHASTA_FAULT_POLICY")
                .and_then(|val| FaultPolicy::parse(&val))
                .unwrap_or(defaults.fault_policy),
            server_process_pattern: lookup("SHASTA_SERVER_PROCESS")
                .unwrap_or(defaults.server_process_pattern),
            kill_servers_on_error: get_var(&lookup, "SHASTA_KILL_SERVERS_ON_ERROR")
                .unwrap_or(defaults.kill_servers_on_error),
        }
    }
}

fn get_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|val| val.trim().parse::<T>().ok())
}
