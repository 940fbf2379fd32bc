//! Compliance verdicts and action kinds.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a completed check.
///
/// Distinct from [`Error`](crate::Error): `NonCompliant` is a successful
/// evaluation whose answer is "no", not a failure to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The machine satisfies the evaluated requirement.
    Compliant,
    /// The machine does not satisfy the evaluated requirement.
    NonCompliant,
}

impl Status {
    pub fn is_compliant(self) -> bool {
        matches!(self, Status::Compliant)
    }

    /// The opposite verdict; used by negated rules.
    pub fn invert(self) -> Status {
        match self {
            Status::Compliant => Status::NonCompliant,
            Status::NonCompliant => Status::Compliant,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Compliant => "Compliant",
            Status::NonCompliant => "NonCompliant",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an invocation may mutate the host.
///
/// Audit passes are read-only by contract; only `Remediate` invocations may
/// change machine state, and the script bridge enforces that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Audit,
    Remediate,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Audit => "audit",
            Action::Remediate => "remediate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audit" => Ok(Action::Audit),
            "remediate" => Ok(Action::Remediate),
            other => Err(Error::invalid_argument(format!(
                "unknown action '{}' (expected 'audit' or 'remediate')",
                other
            ))),
        }
    }
}
