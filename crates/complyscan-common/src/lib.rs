//! ComplyScan Common - shared utilities: logging and configuration.
//!
//! This crate provides the ambient plumbing used by ComplyScan binaries.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigBuilder};
pub use logging::init_logging;
