//! Error types for MediaDL core

use mediadl_types::TaskStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the download engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Task already exists: {0}")]
    DuplicateId(Uuid),

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors reported by a resolver
///
/// These never reach a task; the engine treats them as "nothing to download".
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Resolver unavailable: {0}")]
    Unavailable(String),
}

