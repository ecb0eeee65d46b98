pub mod actor;
pub mod error;
pub mod infra;
pub mod orchestrator;
pub mod world;

// Re-export commonly used types for convenience
pub use actor::{Actor, ActorCell, Lifecycle};
pub use error::{ActorError, OrchestratorError, ProcessError, WorldError};
pub use infra::{Action, BodyId, FaultPolicy, Observation, Pose, Position, SessionConfig};
pub use orchestrator::{ActorFactory, ActorSpec, GroupTable, Observations, Orchestrator, Phase};
pub use world::{WorldBinding, WorldMap};
