//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweep: removes in-memory entries whose expiry timer has not fired yet

mod sweep;

pub use sweep::spawn_sweep_task;
