//! Kernel parameter procedures.

use complyscan_core::{codes, Error, ExecutionContext, Result, Status};
use complyscan_engine::binding::{self, ArgumentMap, BindParams, ParamSpec};
use complyscan_engine::indicators::IndicatorsTree;
use complyscan_engine::pattern::Pattern;
use complyscan_engine::registry::ProcedureDescriptor;
use tracing::debug;

#[derive(Debug)]
pub struct EnsureSysctlParams {
    pub sysctl_name: String,
    pub value: Pattern,
}

impl BindParams for EnsureSysctlParams {
    const SPECS: &'static [ParamSpec] = &[
        ParamSpec::required("sysctl_name", "Dotted kernel parameter name"),
        ParamSpec::required("value", "Regex the current value must fully match"),
    ];

    fn bind(args: &ArgumentMap) -> Result<Self> {
        let sysctl_name: String = binding::required(args, "sysctl_name")?;
        // the name becomes a /proc path and an unquoted sysctl argument
        let safe = !sysctl_name.is_empty()
            && sysctl_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
        if !safe {
            return Err(Error::invalid_argument(format!(
                "sysctl name '{}' contains unsupported characters",
                sysctl_name
            )));
        }
        Ok(Self {
            sysctl_name,
            value: binding::required(args, "value")?,
        })
    }
}

/// `ensure_sysctl` audit arm: the running value under `/proc/sys` must
/// fully match the expected pattern.
pub fn ensure_sysctl_audit() -> ProcedureDescriptor {
    ProcedureDescriptor::audit(
        "ensure_sysctl",
        "Check a kernel parameter against an expected value",
        audit_ensure_sysctl,
    )
}

/// `ensure_sysctl` remediation arm: write the expected value with
/// `sysctl -w`, then re-audit.
pub fn ensure_sysctl_remediate() -> ProcedureDescriptor {
    ProcedureDescriptor::remediate(
        "ensure_sysctl",
        "Set a kernel parameter to an expected value",
        remediate_ensure_sysctl,
    )
}

fn proc_path(name: &str) -> String {
    format!("/proc/sys/{}", name.replace('.', "/"))
}

fn read_current(
    params: &EnsureSysctlParams,
    context: &dyn ExecutionContext,
) -> Result<Option<String>> {
    match context.file_contents(&proc_path(&params.sysctl_name)) {
        Ok(contents) => Ok(Some(contents.trim().to_string())),
        Err(err) if err.code == codes::ENOENT => Ok(None),
        Err(err) => Err(err),
    }
}

fn audit_ensure_sysctl(
    params: &EnsureSysctlParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let current = match read_current(params, context)? {
        Some(current) => current,
        None => {
            return Ok(indicators.non_compliant(format!(
                "kernel parameter '{}' does not exist",
                params.sysctl_name
            )));
        }
    };
    if params.value.matches_fully(&current) {
        Ok(indicators.compliant(format!("'{}' is '{}'", params.sysctl_name, current)))
    } else {
        Ok(indicators.non_compliant(format!(
            "'{}' is '{}', expected match for '{}'",
            params.sysctl_name,
            current,
            params.value.source()
        )))
    }
}

fn remediate_ensure_sysctl(
    params: &EnsureSysctlParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    match read_current(params, context)? {
        None => {
            // a missing parameter means the module is not loaded;
            // writing would not create it
            return Ok(indicators.non_compliant(format!(
                "kernel parameter '{}' does not exist",
                params.sysctl_name
            )));
        }
        Some(current) if params.value.matches_fully(&current) => {}
        Some(_) => {
            // the pattern source is written verbatim, so remediation only
            // makes sense when the expected value is a literal
            debug!(
                name = %params.sysctl_name,
                value = params.value.source(),
                "writing kernel parameter"
            );
            context.execute_command(&format!(
                "sysctl -w {}={}",
                params.sysctl_name,
                params.value.source()
            ))?;
        }
    }
    audit_ensure_sysctl(params, indicators, context)
}
