mod composite_observer;
mod config;
mod default_observer;
pub mod process;
mod session_observer;
pub mod spawn;
mod types;

pub use composite_observer::CompositeObserver;
pub use config::{FaultPolicy, SessionConfig};
pub use default_observer::DefaultObserver;
pub use process::{ProcessControl, ServerProcess, SystemProcessControl, kill_all_servers};
pub use session_observer::SessionObserver;
pub use spawn::{SpawnPlanner, get_initial_positions};
pub use types::{Action, BodyId, Observation, Pose, Position, Velocity};
