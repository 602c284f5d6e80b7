//! bodewell: host monitoring daemon.
//!
//! Threshold probes (disk, load, memory) drive per-monitor state machines;
//! transitions are rendered into messages and routed to contacts through
//! registered dispatchers.

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
pub mod notify;

#[cfg(feature = "cli")]
pub mod cli_app;

pub use crate::core::errors::{BodewellError, Result};
pub use crate::daemon::server::Server;
