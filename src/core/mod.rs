//! Core types: errors, configuration, keyed registry and size parsing.

pub mod config;
pub mod errors;
pub mod keyed;
pub mod size;
