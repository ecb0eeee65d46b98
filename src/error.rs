//! Error types for shasta.
//!
//! Programming errors (phase ordering, unknown groups, duplicate loads) are
//! kept apart from backend errors so callers can decide what is worth a retry.

use std::path::PathBuf;

use thiserror::Error;

use crate::infra::BodyId;
use crate::orchestrator::Phase;

/// Errors raised by the physics/world backend.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("World backend is not connected")]
    NotConnected,

    #[error("Connection to {endpoint} failed: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    #[error("Failed to load world model {path:?}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Unknown body {id}")]
    UnknownBody { id: BodyId },

    #[error("Spawn failed: {message}")]
    SpawnFailed { message: String },

    #[error("Physics state lock was poisoned")]
    PhysicsPoisoned,

    #[error("Invalid experiment configuration: {reason}")]
    InvalidExperiment { reason: String },
}

/// Errors raised through the actor lifecycle contract.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("Cannot load {kind} actor multiple times")]
    DuplicateLoad { kind: String },

    #[error("{kind} actor is not loaded")]
    NotLoaded { kind: String },

    #[error("{kind} actor has been destroyed")]
    Destroyed { kind: String },

    #[error("{kind} actor created no backend bodies")]
    NoBodies { kind: String },

    #[error("{kind} actor does not support action {action}")]
    UnsupportedAction { kind: String, action: String },

    #[error("{kind} actor failed: {reason}")]
    Behavior { kind: String, reason: String },

    #[error(transparent)]
    Backend(#[from] WorldError),
}

/// Errors raised by the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid actor groups: {reason}")]
    Construction { reason: String },

    #[error("Cannot {operation} while the session is {phase}")]
    Configuration {
        operation: &'static str,
        phase: Phase,
    },

    #[error("Cannot {operation}: the session is closed")]
    SessionClosed { operation: &'static str },

    #[error("Unknown actor group '{group}'")]
    UnknownGroup { group: String },

    #[error("Actor {index} of group '{group}' failed: {source}")]
    Actor {
        group: String,
        index: usize,
        #[source]
        source: ActorError,
    },

    #[error("Group '{group}' has {expected} actors but {actual} actions were given")]
    ActionCount {
        group: String,
        expected: usize,
        actual: usize,
    },

    #[error("The map offers no spawn points for {actors} actors")]
    NoSpawnPoints { actors: usize },

    #[error("Backend call {operation} timed out after {timeout_ms}ms")]
    BackendTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Errors raised by the administrative process control.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to scan processes: {0}")]
    Scan(#[from] std::io::Error),

    #[error("Failed to kill process {pid}: {message}")]
    Kill { pid: u32, message: String },

    #[error("Process control is not supported on this platform")]
    Unsupported,
}
