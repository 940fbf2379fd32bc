//! ComplyScan Engine - parameter binding, indicator trees, the procedure
//! registry and dispatcher, composite rule evaluation and the embedded
//! script bridge.
//!
//! The engine never touches the operating system itself: every effect
//! goes through the [`complyscan_core::ExecutionContext`] capability
//! trait, which is what keeps checks deterministic under test.

pub mod binding;
pub mod evaluator;
pub mod indicators;
pub mod pattern;
pub mod registry;
pub mod report;
pub mod script;
pub mod separated;

#[cfg(test)]
pub(crate) mod testing;

pub use binding::{apply_defaults, ArgumentMap, BindParams, FileMode, ParamSpec, ParseArg};
pub use evaluator::{dispatch, Evaluation, Evaluator, ParameterMap};
pub use indicators::{IndicatorNode, IndicatorsTree};
pub use pattern::Pattern;
pub use registry::{ProcedureDescriptor, ProcedureRegistry, RegistryBuilder};
pub use report::{render, Report, ReportFormat};
pub use script::ScriptBridge;
pub use separated::{Patterns, Separated};
