//! Error type shared by every ComplyScan crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errno-style codes carried by [`Error`].
///
/// The subset of POSIX errno values the engine actually distinguishes,
/// plus `GENERIC_FAILURE` for everything that has no errno.
pub mod codes {
    /// Operation not permitted.
    pub const EPERM: i32 = 1;
    /// No such file or directory.
    pub const ENOENT: i32 = 2;
    /// I/O error.
    pub const EIO: i32 = 5;
    /// Bad address; used for faults caught at the dispatch boundary.
    pub const EFAULT: i32 = 14;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Result out of range.
    pub const ERANGE: i32 = 34;
    /// Function not implemented.
    pub const ENOSYS: i32 = 38;
    /// Failure with no matching errno.
    pub const GENERIC_FAILURE: i32 = -1;
}

/// Failure value returned by every fallible engine operation.
///
/// `code` mirrors POSIX errno where one applies and is `-1` otherwise. It
/// travels with the error unchanged so callers can tell an argument problem
/// (`EINVAL`) from a missing file (`ENOENT`) or an unimplemented procedure
/// (`ENOSYS`) without parsing the message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct Error {
    /// Human-readable description of the failure.
    pub message: String,
    /// Errno-style classification, `-1` when none applies.
    pub code: i32,
}

impl Error {
    /// Create an error with an explicit code.
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        let message = message.into();
        debug_assert!(!message.is_empty(), "error message must not be empty");
        Self { message, code }
    }

    /// Failure with no matching errno (`-1`).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, codes::GENERIC_FAILURE)
    }

    /// `EINVAL`: a caller-supplied value is malformed or missing.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(message, codes::EINVAL)
    }

    /// `ENOENT`: the named object does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, codes::ENOENT)
    }

    /// `ERANGE`: a value exists but does not fit the target type.
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(message, codes::ERANGE)
    }

    /// `ENOSYS`: the requested operation is not implemented.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(message, codes::ENOSYS)
    }

    /// `EPERM`: the operation is not allowed in the current mode.
    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self::new(message, codes::EPERM)
    }

    /// `EFAULT`: a procedure misbehaved badly enough to be quarantined.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::new(message, codes::EFAULT)
    }

    /// Prefix the message with context, keeping the code.
    pub fn context(self, prefix: impl AsRef<str>) -> Self {
        Self {
            message: format!("{}: {}", prefix.as_ref(), self.message),
            code: self.code,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = err.raw_os_error().unwrap_or(codes::EIO);
        Self::new(err.to_string(), code)
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
