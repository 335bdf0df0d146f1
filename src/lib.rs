//! dockhand keeps a fixed fleet of docker services alive and on fresh images.
//!
//! The supervisor checks that every required container is running, brings the
//! fleet up from a compose file when it is not, and once a day pulls each
//! service's image and replaces containers whose image changed, carrying the
//! old port and volume bindings over.

pub mod cli;
pub mod compose;
pub mod config;
pub mod docker;
pub mod health;
pub mod notifications;
pub mod scheduler;
pub mod supervisor;
pub mod types;
pub mod updater;

use crate::docker::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockhandError {
    #[error("another reconciliation cycle is already in flight")]
    CycleInFlight,
    #[error("preflight check failed: {0}")]
    Preflight(String),
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
