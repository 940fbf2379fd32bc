//! ComplyScan host assessor.
//!
//! Evaluates a compliance script or a composite rule document against the
//! local machine and prints the resulting indicator tree. The process exit
//! code reports the verdict: 0 compliant, 1 non-compliant, 2 error.

mod context;

use anyhow::{anyhow, bail, Context as _};
use clap::Parser;
use complyscan_checks::builtin_registry;
use complyscan_common::logging::{init_logging_with_config, LogConfig};
use complyscan_common::Config;
use complyscan_core::{Action, ExecutionContext, Status};
use complyscan_engine::{
    render, Evaluation, Evaluator, ParameterMap, ProcedureRegistry, Report, ReportFormat,
    ScriptBridge,
};
use context::SystemContext;
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(
    name = "complyscan-assessor",
    version,
    about = "Assess host compliance with scripted checks and rule documents"
)]
struct Args {
    /// Compliance script to evaluate; '-' reads from standard input.
    #[arg(required_unless_present_any = ["rule", "list_procedures"])]
    script: Option<String>,

    /// Evaluate a JSON rule document instead of a script.
    #[arg(long, conflicts_with = "script")]
    rule: Option<PathBuf>,

    /// Action to perform: audit or remediate.
    #[arg(long, default_value = "audit")]
    action: Action,

    /// Rule parameter as KEY=VALUE; repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Substitute one path for another before any filesystem access,
    /// as FROM=TO; repeatable.
    #[arg(long = "redirect", value_name = "FROM=TO")]
    redirects: Vec<String>,

    /// Report format: nested, compact, json or last-non-compliant.
    #[arg(long)]
    format: Option<ReportFormat>,

    /// Write a JSON report envelope to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// List registered procedures and exit.
    #[arg(long)]
    list_procedures: bool,

    /// Configuration file.
    #[arg(long, default_value = "/etc/complyscan/assessor.toml")]
    config: PathBuf,

    /// Log level override.
    #[arg(long)]
    log_level: Option<String>,

    /// Log format override: pretty, json or compact.
    #[arg(long)]
    log_format: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(None) | Ok(Some(Status::Compliant)) => ExitCode::SUCCESS,
        Ok(Some(Status::NonCompliant)) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> anyhow::Result<Option<Status>> {
    let config = load_config(&args.config)?;
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let format = args.log_format.as_deref().unwrap_or(&config.logging.format);
    init_logging_with_config(LogConfig::from_strs(level, format));

    let registry = Arc::new(builtin_registry()?);
    if args.list_procedures {
        print_catalog(&registry);
        return Ok(None);
    }

    if args.action == Action::Remediate && !config.assessment.allow_remediation {
        bail!("remediation is disabled by configuration");
    }
    let report_format = match args.format {
        Some(format) => format,
        None => config.assessment.report_format.parse()?,
    };

    let context: Arc<dyn ExecutionContext> = Arc::new(build_context(&args.redirects)?);
    let started = Instant::now();
    let evaluation = match &args.rule {
        Some(path) => evaluate_rule(path, args, &config, Arc::clone(&registry), context)?,
        None => evaluate_script(args, &config, registry, context)?,
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(status = %evaluation.status, elapsed_ms, "assessment finished");

    print_result(&evaluation, report_format)?;
    if let Some(output) = &args.output {
        write_report(output, args.action, &evaluation, elapsed_ms)?;
    }
    Ok(Some(evaluation.status))
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = if path.exists() {
        Config::from_file(path)?
    } else {
        debug!(path = %path.display(), "config file absent, using defaults");
        Config::default()
    };
    Ok(config.merge_env())
}

fn build_context(redirects: &[String]) -> anyhow::Result<SystemContext> {
    let mut context = SystemContext::new();
    for redirect in redirects {
        let (from, to) = redirect
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --redirect '{}' (expected FROM=TO)", redirect))?;
        context = context.with_redirect(from, to);
    }
    Ok(context)
}

fn evaluate_rule(
    path: &Path,
    args: &Args,
    config: &Config,
    registry: Arc<ProcedureRegistry>,
    context: Arc<dyn ExecutionContext>,
) -> anyhow::Result<Evaluation> {
    let document = fs::read_to_string(path)
        .with_context(|| format!("failed to read rule document {:?}", path))?;
    let rule: serde_json::Value = serde_json::from_str(&document)
        .with_context(|| format!("failed to parse rule document {:?}", path))?;
    let parameters = parse_parameters(&args.params)?;
    let label = document_label(path);

    let mut evaluator = Evaluator::new(&label, registry, parameters, context)
        .with_script_budget(config.assessment.script_max_operations);
    let status = evaluator.evaluate(&rule, args.action)?;
    Ok(evaluator.finish(status)?)
}

fn evaluate_script(
    args: &Args,
    config: &Config,
    registry: Arc<ProcedureRegistry>,
    context: Arc<dyn ExecutionContext>,
) -> anyhow::Result<Evaluation> {
    let script = args
        .script
        .as_deref()
        .ok_or_else(|| anyhow!("no script or rule document given"))?;
    if !args.params.is_empty() {
        bail!("--param applies to rule documents; scripts take no parameters");
    }
    let (label, source) = if script == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read script from stdin")?;
        (String::from("stdin"), source)
    } else {
        let source = fs::read_to_string(script)
            .with_context(|| format!("failed to read script '{}'", script))?;
        (document_label(Path::new(script)), source)
    };

    let bridge = ScriptBridge::new(registry)
        .with_max_operations(config.assessment.script_max_operations);
    Ok(bridge.run(&label, &source, args.action, &context)?)
}

/// Scope label for a script or rule document: its file stem.
fn document_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_parameters(params: &[String]) -> anyhow::Result<ParameterMap> {
    let mut map = ParameterMap::new();
    for param in params {
        let (key, value) = param
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| anyhow!("invalid --param '{}' (expected KEY=VALUE)", param))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

fn print_result(evaluation: &Evaluation, format: ReportFormat) -> anyhow::Result<()> {
    let verdict = match evaluation.status {
        Status::Compliant => "Compliant",
        Status::NonCompliant => "Non-Compliant",
    };
    println!("Result: {}", verdict);
    let rendered = render(&evaluation.indicators, format)?;
    if !rendered.is_empty() {
        print!("{}", rendered);
        if !rendered.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn write_report(
    path: &Path,
    action: Action,
    evaluation: &Evaluation,
    elapsed_ms: u64,
) -> anyhow::Result<()> {
    let root = evaluation
        .indicators
        .root()
        .cloned()
        .ok_or_else(|| anyhow!("assessment produced no indicators"))?;
    let report = Report::new(action, evaluation.status, elapsed_ms, root);
    fs::write(path, report.to_json()?)
        .with_context(|| format!("failed to write report {:?}", path))?;
    Ok(())
}

fn print_catalog(registry: &ProcedureRegistry) {
    for descriptor in registry.descriptors() {
        println!(
            "{} ({}): {}",
            descriptor.name, descriptor.action, descriptor.description
        );
        for spec in descriptor.params {
            let requirement = if spec.required {
                String::from("required")
            } else {
                match spec.default {
                    Some(default) => format!("default: {}", default),
                    None => String::from("optional"),
                }
            };
            println!("  {} ({}) - {}", spec.name, requirement, spec.description);
        }
    }
}
