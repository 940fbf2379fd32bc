//! ComplyScan Core - shared types for the compliance assessment engine.
//!
//! Everything the other crates agree on lives here: the errno-carrying
//! [`Error`], the [`Status`] and [`Action`] verdict kinds, and the
//! [`ExecutionContext`] capability trait that separates check logic from
//! the operating system.

pub mod context;
pub mod error;
pub mod status;

pub use context::{ExecutionContext, FileMetadata};
pub use error::{codes, Error, Result};
pub use status::{Action, Status};

/// ComplyScan version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
