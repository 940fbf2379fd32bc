//! Capability surface procedures use instead of touching the OS directly.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Ownership and permission facts for one path, as a context reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Permission bits only (`st_mode & 0o7777`).
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Resolved owner name, when the context can resolve it.
    pub owner: Option<String>,
    /// Resolved group name, when the context can resolve it.
    pub group: Option<String>,
}

/// Host capabilities available to procedures and scripts.
///
/// Implementations own all OS access; the engine and every registered
/// procedure only ever see this trait, which is what makes checks testable
/// against canned answers. Methods take `&self`: implementations manage any
/// interior state themselves, and one context may serve several invocations.
pub trait ExecutionContext: Send + Sync {
    /// Run a shell command line and return its captured stdout.
    ///
    /// A non-zero exit status is an `Err`; the command never gets to decide
    /// the compliance verdict by itself.
    fn execute_command(&self, command: &str) -> Result<String>;

    /// Read a file into a string. Implementations resolve the path through
    /// [`special_file_path`](Self::special_file_path) first.
    fn file_contents(&self, path: &str) -> Result<String>;

    /// Ownership and permission facts for a path.
    fn file_metadata(&self, path: &str) -> Result<FileMetadata>;

    /// Entry names directly under `path`, sorted, without `.` and `..`.
    fn list_directory(&self, path: &str) -> Result<Vec<String>>;

    /// Indirection for well-known paths (`/proc/sys/...` and friends) so
    /// tests can redirect them at fixtures. Identity unless overridden.
    fn special_file_path(&self, path: &str) -> String {
        path.to_string()
    }
}
