//! Drone Daemon library
//!
//! This module provides the bootstrap around the fleet controller:
//! - Layered configuration (defaults, file, `DRONE_*` environment)
//! - In-memory cluster seeding
//! - Scheduler simulator for development
//! - Lifecycle and graceful shutdown

pub mod config;
pub mod daemon;
pub mod error;
pub mod simulator;

pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use simulator::Simulator;
