//! Typed binding of string argument maps.
//!
//! Arguments arrive as flat string maps from rule documents and scripts.
//! Each procedure declares a [`ParamSpec`] table and a typed parameter
//! struct; binding parses the map into that struct before the procedure
//! body runs, so a body never sees a malformed value and a binding failure
//! never touches the execution context.

use complyscan_core::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::num::IntErrorKind;

/// Raw procedure arguments as they arrive from rule documents and scripts.
///
/// A `BTreeMap` keeps iteration deterministic, which keeps error messages
/// and reports stable across runs.
pub type ArgumentMap = BTreeMap<String, String>;

/// One value parsed from its raw string form.
pub trait ParseArg: Sized {
    fn parse_arg(raw: &str) -> Result<Self>;
}

impl ParseArg for String {
    fn parse_arg(raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

impl ParseArg for bool {
    fn parse_arg(raw: &str) -> Result<Self> {
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(Error::invalid_argument(format!(
                "invalid boolean value '{}' (expected 'true' or 'false')",
                other
            ))),
        }
    }
}

impl ParseArg for i64 {
    fn parse_arg(raw: &str) -> Result<Self> {
        raw.parse::<i64>().map_err(|err| match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                Error::out_of_range(format!("integer value '{}' is out of range", raw))
            }
            _ => Error::invalid_argument(format!("invalid integer value '{}'", raw)),
        })
    }
}

/// Octal file permission bits, e.g. `"644"` or `"0750"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl FileMode {
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

impl ParseArg for FileMode {
    fn parse_arg(raw: &str) -> Result<Self> {
        match u32::from_str_radix(raw, 8) {
            Ok(bits) => Ok(FileMode(bits)),
            Err(err) => match err.kind() {
                IntErrorKind::PosOverflow => {
                    Err(Error::out_of_range(format!("octal mode '{}' is out of range", raw)))
                }
                _ => Err(Error::invalid_argument(format!("invalid octal mode '{}'", raw))),
            },
        }
    }
}

/// Declared shape of one procedure parameter, fixed at registration.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    /// Parsed in place of an absent argument.
    pub default: Option<&'static str>,
    /// Documentation for catalog output; never enforced by the binder.
    pub pattern: Option<&'static str>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: true,
            default: None,
            pattern: None,
        }
    }

    pub const fn optional(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: false,
            default: None,
            pattern: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn with_pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

/// A procedure's typed parameters: the declared specs plus the explicit
/// bind function that parses a validated argument map into the struct.
///
/// `bind` assumes [`apply_defaults`] already ran, so parameters that carry
/// a default can be read with [`required`].
pub trait BindParams: Sized {
    const SPECS: &'static [ParamSpec];

    fn bind(args: &ArgumentMap) -> Result<Self>;
}

/// Look up and parse a required argument.
pub fn required<T: ParseArg>(args: &ArgumentMap, key: &str) -> Result<T> {
    match args.get(key) {
        Some(raw) => T::parse_arg(raw).map_err(|err| err.context(format!("invalid '{}'", key))),
        None => Err(Error::invalid_argument(format!("missing '{}'", key))),
    }
}

/// Look up and parse an argument that may be absent.
pub fn optional<T: ParseArg>(args: &ArgumentMap, key: &str) -> Result<Option<T>> {
    match args.get(key) {
        Some(raw) => T::parse_arg(raw)
            .map(Some)
            .map_err(|err| err.context(format!("invalid '{}'", key))),
        None => Ok(None),
    }
}

/// Validate an argument map against declared specs and fill defaults.
///
/// Runs before the typed bind and therefore before any context call:
/// unknown keys, oversized maps and missing required parameters are all
/// rejected here. Returns the effective map the bind function will see.
pub fn apply_defaults(args: &ArgumentMap, specs: &[ParamSpec]) -> Result<ArgumentMap> {
    if args.len() > specs.len() {
        return Err(Error::invalid_argument("too many arguments provided"));
    }
    for key in args.keys() {
        if !specs.iter().any(|spec| spec.name == key.as_str()) {
            return Err(Error::invalid_argument(format!("unknown parameter '{}'", key)));
        }
    }
    let mut effective = args.clone();
    for spec in specs {
        if effective.contains_key(spec.name) {
            continue;
        }
        if let Some(default) = spec.default {
            effective.insert(spec.name.to_string(), default.to_string());
        } else if spec.required {
            return Err(Error::invalid_argument(format!("missing '{}'", spec.name)));
        }
    }
    Ok(effective)
}
