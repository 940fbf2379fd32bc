//! Filesystem procedures.

use complyscan_core::{codes, Error, ExecutionContext, Result, Status};
use complyscan_engine::binding::{self, ArgumentMap, BindParams, FileMode, ParamSpec, ParseArg};
use complyscan_engine::indicators::IndicatorsTree;
use complyscan_engine::pattern::Pattern;
use complyscan_engine::registry::ProcedureDescriptor;
use complyscan_engine::separated::Patterns;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug)]
pub struct FileExistsParams {
    pub filename: String,
}

impl BindParams for FileExistsParams {
    const SPECS: &'static [ParamSpec] =
        &[ParamSpec::required("filename", "Path that must exist")];

    fn bind(args: &ArgumentMap) -> Result<Self> {
        Ok(Self {
            filename: binding::required(args, "filename")?,
        })
    }
}

/// `file_exists`: the path must be present on the machine.
pub fn file_exists() -> ProcedureDescriptor {
    ProcedureDescriptor::audit("file_exists", "Check that a file exists", audit_file_exists)
}

fn audit_file_exists(
    params: &FileExistsParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    match context.file_metadata(&params.filename) {
        Ok(_) => Ok(indicators.compliant(format!("file '{}' exists", params.filename))),
        Err(err) if err.code == codes::ENOENT => {
            Ok(indicators.non_compliant(format!("file '{}' does not exist", params.filename)))
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug)]
pub struct FilePermissionsParams {
    pub filename: String,
    pub owner: Option<Patterns>,
    pub group: Option<Patterns>,
    pub permissions: Option<FileMode>,
    pub mask: Option<FileMode>,
}

impl BindParams for FilePermissionsParams {
    const SPECS: &'static [ParamSpec] = &[
        ParamSpec::required("filename", "Path of the audited file"),
        ParamSpec::optional("owner", "Accepted owner names as |-separated regexes"),
        ParamSpec::optional("group", "Accepted group names as |-separated regexes"),
        ParamSpec::optional("permissions", "Exact permission bits the file must carry (octal)"),
        ParamSpec::optional("mask", "Permission bits the file must not carry (octal)"),
    ];

    fn bind(args: &ArgumentMap) -> Result<Self> {
        Ok(Self {
            filename: binding::required(args, "filename")?,
            owner: binding::optional(args, "owner")?,
            group: binding::optional(args, "group")?,
            permissions: binding::optional(args, "permissions")?,
            mask: binding::optional(args, "mask")?,
        })
    }
}

/// `file_permissions` audit arm: ownership and permission bits.
pub fn file_permissions_audit() -> ProcedureDescriptor {
    ProcedureDescriptor::audit(
        "file_permissions",
        "Check ownership and permission bits of a file",
        audit_file_permissions,
    )
}

/// `file_permissions` remediation arm: chmod/chown to the requested state,
/// then re-audit.
pub fn file_permissions_remediate() -> ProcedureDescriptor {
    ProcedureDescriptor::remediate(
        "file_permissions",
        "Set ownership and permission bits of a file",
        remediate_file_permissions,
    )
}

fn audit_file_permissions(
    params: &FilePermissionsParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let metadata = match context.file_metadata(&params.filename) {
        Ok(metadata) => metadata,
        Err(err) if err.code == codes::ENOENT => {
            return Ok(
                indicators.non_compliant(format!("file '{}' does not exist", params.filename))
            );
        }
        Err(err) => return Err(err),
    };
    let mut status = indicators.compliant(format!("file '{}' exists", params.filename));

    if let Some(owner) = &params.owner {
        let name = metadata
            .owner
            .clone()
            .unwrap_or_else(|| metadata.uid.to_string());
        if owner.iter().any(|pattern| pattern.matches_fully(&name)) {
            indicators.compliant(format!("owner '{}' is accepted", name));
        } else {
            status = indicators
                .non_compliant(format!("owner '{}' does not match any accepted owner", name));
        }
    }

    if let Some(group) = &params.group {
        let name = metadata
            .group
            .clone()
            .unwrap_or_else(|| metadata.gid.to_string());
        if group.iter().any(|pattern| pattern.matches_fully(&name)) {
            indicators.compliant(format!("group '{}' is accepted", name));
        } else {
            status = indicators
                .non_compliant(format!("group '{}' does not match any accepted group", name));
        }
    }

    if let Some(permissions) = params.permissions {
        if metadata.mode == permissions.bits() {
            indicators.compliant(format!("permissions are {:o}", metadata.mode));
        } else {
            status = indicators.non_compliant(format!(
                "permissions are {:o}, expected {:o}",
                metadata.mode,
                permissions.bits()
            ));
        }
    }

    if let Some(mask) = params.mask {
        let forbidden = metadata.mode & mask.bits();
        if forbidden == 0 {
            indicators.compliant("no forbidden permission bits are set".to_string());
        } else {
            status = indicators
                .non_compliant(format!("forbidden permission bits {:o} are set", forbidden));
        }
    }

    Ok(status)
}

fn remediate_file_permissions(
    params: &FilePermissionsParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let metadata = match context.file_metadata(&params.filename) {
        Ok(metadata) => metadata,
        Err(err) if err.code == codes::ENOENT => {
            // remediation does not create files
            return Ok(
                indicators.non_compliant(format!("file '{}' does not exist", params.filename))
            );
        }
        Err(err) => return Err(err),
    };

    let mut target = metadata.mode;
    if let Some(permissions) = params.permissions {
        target = permissions.bits();
    }
    if let Some(mask) = params.mask {
        target &= !mask.bits();
    }
    if target != metadata.mode {
        debug!(file = %params.filename, mode = %FileMode(target), "adjusting permissions");
        context.execute_command(&format!("chmod {:o} '{}'", target, params.filename))?;
    }

    if let Some(owner) = &params.owner {
        let name = metadata
            .owner
            .clone()
            .unwrap_or_else(|| metadata.uid.to_string());
        if !owner.iter().any(|pattern| pattern.matches_fully(&name)) {
            if let Some(first) = owner.items().first() {
                context.execute_command(&format!(
                    "chown '{}' '{}'",
                    first.source(),
                    params.filename
                ))?;
            }
        }
    }

    if let Some(group) = &params.group {
        let name = metadata
            .group
            .clone()
            .unwrap_or_else(|| metadata.gid.to_string());
        if !group.iter().any(|pattern| pattern.matches_fully(&name)) {
            if let Some(first) = group.items().first() {
                context.execute_command(&format!(
                    "chgrp '{}' '{}'",
                    first.source(),
                    params.filename
                ))?;
            }
        }
    }

    audit_file_permissions(params, indicators, context)
}

/// How matched lines decide the verdict of `file_regex_match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBehavior {
    /// Every examined file must contain a matching line.
    AllExist,
    /// At least one examined file must contain a matching line.
    AnyExist,
    /// No examined file may contain a matching line.
    NoneExist,
}

impl ParseArg for MatchBehavior {
    fn parse_arg(raw: &str) -> Result<Self> {
        match raw {
            "all_exist" => Ok(MatchBehavior::AllExist),
            "any_exist" => Ok(MatchBehavior::AnyExist),
            "none_exist" => Ok(MatchBehavior::NoneExist),
            other => Err(Error::invalid_argument(format!(
                "invalid behavior '{}' (expected one of: all_exist, any_exist, none_exist)",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct FileRegexMatchParams {
    pub path: String,
    pub filename_pattern: Option<Pattern>,
    pub match_pattern: Pattern,
    pub state_pattern: Option<Pattern>,
    pub behavior: MatchBehavior,
    pub ignore_case: bool,
}

impl BindParams for FileRegexMatchParams {
    const SPECS: &'static [ParamSpec] = &[
        ParamSpec::required("path", "File to scan, or directory when filename_pattern is set"),
        ParamSpec::optional("filename_pattern", "Regex selecting directory entries to scan"),
        ParamSpec::required("match_pattern", "Regex a line must match"),
        ParamSpec::optional("state_pattern", "Regex a matched line must additionally match"),
        ParamSpec::optional("behavior", "all_exist, any_exist or none_exist")
            .with_default("all_exist"),
        ParamSpec::optional("ignore_case", "Case-insensitive matching").with_default("false"),
    ];

    fn bind(args: &ArgumentMap) -> Result<Self> {
        Ok(Self {
            path: binding::required(args, "path")?,
            filename_pattern: binding::optional(args, "filename_pattern")?,
            match_pattern: binding::required(args, "match_pattern")?,
            state_pattern: binding::optional(args, "state_pattern")?,
            behavior: binding::required(args, "behavior")?,
            ignore_case: binding::required(args, "ignore_case")?,
        })
    }
}

/// `file_regex_match`: grep-style line matching across one file or a
/// directory of files.
pub fn file_regex_match() -> ProcedureDescriptor {
    ProcedureDescriptor::audit(
        "file_regex_match",
        "Check files for lines matching a regex",
        audit_file_regex_match,
    )
}

fn build_matcher(pattern: &Pattern, ignore_case: bool) -> Result<Regex> {
    if !ignore_case {
        return Ok(pattern.regex().clone());
    }
    RegexBuilder::new(pattern.source())
        .case_insensitive(true)
        .build()
        .map_err(|err| {
            Error::invalid_argument(format!(
                "regular expression '{}' compilation failed: {}",
                pattern.source(),
                err
            ))
        })
}

fn audit_file_regex_match(
    params: &FileRegexMatchParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let matcher = build_matcher(&params.match_pattern, params.ignore_case)?;
    let state = match &params.state_pattern {
        Some(pattern) => Some(build_matcher(pattern, params.ignore_case)?),
        None => None,
    };

    let files = match &params.filename_pattern {
        Some(pattern) => {
            let base = params.path.trim_end_matches('/');
            context
                .list_directory(&params.path)?
                .into_iter()
                .filter(|name| pattern.matches_fully(name))
                .map(|name| format!("{}/{}", base, name))
                .collect::<Vec<_>>()
        }
        None => vec![params.path.clone()],
    };
    if files.is_empty() {
        return Ok(indicators.non_compliant(format!(
            "no file under '{}' matches the filename pattern",
            params.path
        )));
    }

    let mut status = Status::Compliant;
    let mut any_matched = false;
    for file in &files {
        let contents = context.file_contents(file)?;
        let matched = contents.lines().find(|line| {
            matcher.is_match(line) && state.as_ref().map_or(true, |inner| inner.is_match(line))
        });
        match (params.behavior, matched) {
            (MatchBehavior::NoneExist, Some(line)) => {
                status = indicators
                    .non_compliant(format!("'{}' contains forbidden line '{}'", file, line));
            }
            (MatchBehavior::NoneExist, None) => {
                indicators.compliant(format!("'{}' contains no matching line", file));
            }
            (MatchBehavior::AllExist, Some(_)) => {
                indicators.compliant(format!("'{}' contains a matching line", file));
            }
            (MatchBehavior::AllExist, None) => {
                status = indicators
                    .non_compliant(format!("'{}' does not contain a matching line", file));
            }
            (MatchBehavior::AnyExist, Some(_)) => {
                any_matched = true;
                indicators.compliant(format!("'{}' contains a matching line", file));
            }
            (MatchBehavior::AnyExist, None) => {
                debug!(file = %file, "no matching line");
            }
        }
    }
    if params.behavior == MatchBehavior::AnyExist && !any_matched {
        status = indicators.non_compliant("no matching line found in any file");
    }
    Ok(status)
}

#[derive(Debug)]
pub struct NoDuplicateEntriesParams {
    pub filename: String,
    pub delimiter: String,
    pub column: i64,
}

impl BindParams for NoDuplicateEntriesParams {
    const SPECS: &'static [ParamSpec] = &[
        ParamSpec::required("filename", "File whose entries must be unique"),
        ParamSpec::optional("delimiter", "Field separator").with_default(":"),
        ParamSpec::optional("column", "Zero-based field to compare").with_default("0"),
    ];

    fn bind(args: &ArgumentMap) -> Result<Self> {
        let column = binding::required(args, "column")?;
        if column < 0 {
            return Err(Error::invalid_argument("column must not be negative"));
        }
        Ok(Self {
            filename: binding::required(args, "filename")?,
            delimiter: binding::required(args, "delimiter")?,
            column,
        })
    }
}

/// `no_duplicate_entries`: a delimited column must hold unique values,
/// the classic `/etc/passwd` and `/etc/group` hygiene check.
pub fn no_duplicate_entries() -> ProcedureDescriptor {
    ProcedureDescriptor::audit(
        "no_duplicate_entries",
        "Check a delimited file column for duplicate values",
        audit_no_duplicate_entries,
    )
}

fn audit_no_duplicate_entries(
    params: &NoDuplicateEntriesParams,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let contents = context.file_contents(&params.filename)?;
    let column = params.column as usize;
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        // lines without enough fields are not this check's business
        let Some(value) = line.split(params.delimiter.as_str()).nth(column) else {
            continue;
        };
        *seen.entry(value).or_insert(0) += 1;
    }
    let duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(value, _)| value.to_string())
        .collect();
    if duplicates.is_empty() {
        Ok(indicators.compliant(format!("no duplicate entries in '{}'", params.filename)))
    } else {
        Ok(indicators.non_compliant(format!(
            "duplicate entries in '{}': {}",
            params.filename,
            duplicates.join(", ")
        )))
    }
}
