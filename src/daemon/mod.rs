//! Daemon subsystem: the coordinating server, process loop and signal handling.

#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod server;
#[cfg(feature = "daemon")]
pub mod signals;

pub use server::{DeliveryFailure, DeliveryReport, Plugin, Server};
