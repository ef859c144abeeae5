//! MediaDL Core - Download Task Engine
//!
//! This crate owns the lifecycle of media download jobs: it queues them,
//! drives their (simulated) progress concurrently, and cancels or tears
//! them down without races.

mod engine;
mod error;
mod resolver;
mod storage;
mod store;

pub use engine::*;
pub use error::*;
pub use resolver::*;
pub use storage::*;
pub use store::*;

pub use mediadl_types as types;
