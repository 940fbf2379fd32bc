//! Package inventory procedures.

use complyscan_core::{Error, ExecutionContext, Result, Status};
use complyscan_engine::binding::{self, ArgumentMap, BindParams, ParamSpec, ParseArg};
use complyscan_engine::indicators::IndicatorsTree;
use complyscan_engine::registry::ProcedureDescriptor;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;
use tracing::debug;

/// Which package database answers install queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Probe for `dpkg-query` on the target, fall back to rpm.
    Autodetect,
    Dpkg,
    Rpm,
}

impl ParseArg for PackageManager {
    fn parse_arg(raw: &str) -> Result<Self> {
        match raw {
            "autodetect" => Ok(PackageManager::Autodetect),
            "dpkg" => Ok(PackageManager::Dpkg),
            "rpm" => Ok(PackageManager::Rpm),
            other => Err(Error::invalid_argument(format!(
                "invalid package manager '{}' (expected one of: autodetect, dpkg, rpm)",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct PackageInstalledParams {
    pub package_name: String,
    pub package_manager: PackageManager,
    pub min_version: Option<String>,
}

impl BindParams for PackageInstalledParams {
    const SPECS: &'static [ParamSpec] = &[
        ParamSpec::required("package_name", "Name of the package that must be installed")
            .with_pattern("^[a-zA-Z0-9.+_-]+$"),
        ParamSpec::optional("package_manager", "autodetect, dpkg or rpm")
            .with_default("autodetect"),
        ParamSpec::optional("min_version", "Lowest acceptable installed version"),
    ];

    fn bind(args: &ArgumentMap) -> Result<Self> {
        let package_name: String = binding::required(args, "package_name")?;
        // the name is interpolated into a quoted command line
        let safe = !package_name.is_empty()
            && package_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || ".+_-".contains(c));
        if !safe {
            return Err(Error::invalid_argument(format!(
                "package name '{}' contains unsupported characters",
                package_name
            )));
        }
        Ok(Self {
            package_name,
            package_manager: binding::required(args, "package_manager")?,
            min_version: binding::optional(args, "min_version")?,
        })
    }
}

/// `package_installed`: the package must be present in the host's package
/// database, optionally at or above a minimum version.
pub fn package_installed() -> ProcedureDescriptor {
    ProcedureDescriptor::audit(
        "package_installed",
        "Check that a package is installed",
        audit_package_installed,
    )
}

fn audit_package_installed(
    params: &PackageInstalledParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let version = match query_installed_version(params, context) {
        Some(version) => version,
        None => {
            return Ok(indicators.non_compliant(format!(
                "package '{}' is not installed",
                params.package_name
            )));
        }
    };
    match &params.min_version {
        None => Ok(indicators.compliant(format!(
            "package '{}' version '{}' is installed",
            params.package_name, version
        ))),
        Some(min) if version_less_than(&version, min) => Ok(indicators.non_compliant(format!(
            "package '{}' version '{}' is older than '{}'",
            params.package_name, version, min
        ))),
        Some(min) => Ok(indicators.compliant(format!(
            "package '{}' version '{}' satisfies minimum '{}'",
            params.package_name, version, min
        ))),
    }
}

fn query_installed_version(
    params: &PackageInstalledParams,
    context: &dyn ExecutionContext,
) -> Option<String> {
    let use_dpkg = match params.package_manager {
        PackageManager::Dpkg => true,
        PackageManager::Rpm => false,
        PackageManager::Autodetect => context.execute_command("command -v dpkg-query").is_ok(),
    };
    let command = if use_dpkg {
        format!(
            "dpkg-query -W -f='${{Status}} ${{Version}}' '{}'",
            params.package_name
        )
    } else {
        format!(
            "rpm -q --queryformat '%{{VERSION}}-%{{RELEASE}}' '{}'",
            params.package_name
        )
    };
    let output = match context.execute_command(&command) {
        Ok(output) => output,
        Err(err) => {
            // both tools exit non-zero for unknown packages
            debug!(package = %params.package_name, error = %err, "package query failed");
            return None;
        }
    };
    if use_dpkg {
        parse_dpkg_status(&output).map(str::to_string)
    } else {
        let version = output.trim();
        if version.is_empty() {
            None
        } else {
            Some(version.to_string())
        }
    }
}

/// A dpkg status line for an installed package reads
/// `install ok installed <version>`; anything else (half-installed,
/// removed but not purged) counts as absent.
fn parse_dpkg_status(output: &str) -> Option<&str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^install ok installed\s+(\S+)$").unwrap());
    pattern
        .captures(output.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Segment-wise version comparison: split both versions on `.`, `-` and
/// `+`, compare numerically where both segments parse and lexically
/// otherwise. A strict prefix is older than the longer version.
fn version_less_than(version: &str, minimum: &str) -> bool {
    let left: Vec<&str> = version.split(['.', '-', '+']).collect();
    let right: Vec<&str> = minimum.split(['.', '-', '+']).collect();
    for (a, b) in left.iter().zip(&right) {
        let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        };
        match ordering {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
    }
    left.len() < right.len()
}
