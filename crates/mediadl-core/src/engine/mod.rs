//! Download Engine - owns task lifecycle
//!
//! This module implements the job engine with:
//! - A connection-delay timer per pending task
//! - One progress driver per downloading task
//! - Cancellation through per-task child tokens
//! - Teardown that waits for every spawned unit to exit

mod driver;
mod manager;
mod registry;
mod transfer;

pub use manager::*;
pub use registry::{DriverRegistry, Registration};
pub use transfer::*;

use crate::error::EngineError;
use mediadl_types::{Task, TaskStatus};

/// Move `task` to `next` if the state machine allows it
pub(crate) fn transition(task: &mut Task, next: TaskStatus) -> Result<(), EngineError> {
    if !task.status.can_transition_to(next) {
        return Err(EngineError::InvalidTransition {
            id: task.id,
            from: task.status,
            to: next,
        });
    }
    task.status = next;
    Ok(())
}
