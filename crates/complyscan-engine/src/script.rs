//! Embedded script evaluation.
//!
//! Scripts get a deliberately narrow surface: the indicator primitives,
//! dispatch into registered procedures, and two read helpers. Every other
//! effect stays behind [`ExecutionContext`] implementations on the host
//! side. A fresh engine is built per evaluation, so scripts cannot leak
//! state into each other, and an operation budget bounds runaway scripts.

use crate::binding::ArgumentMap;
use crate::evaluator::{invoke_procedure, Evaluation};
use crate::indicators::IndicatorsTree;
use crate::registry::ProcedureRegistry;
use complyscan_core::{Action, Error, ExecutionContext, Result, Status};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;
const MAX_CALL_LEVELS: usize = 64;

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Tree state shared with the host functions of one evaluation.
#[derive(Clone)]
struct BridgeState {
    tree: IndicatorsTree,
    /// Scope depth at evaluation entry; scripts may not pop below it.
    base_depth: usize,
}

/// Evaluates script text against the procedure registry and an execution
/// context.
///
/// The bridge itself is stateless between evaluations; it only carries the
/// registry handle and the operation budget.
pub struct ScriptBridge {
    registry: Arc<ProcedureRegistry>,
    max_operations: u64,
}

impl ScriptBridge {
    pub fn new(registry: Arc<ProcedureRegistry>) -> Self {
        Self {
            registry,
            max_operations: DEFAULT_MAX_OPERATIONS,
        }
    }

    /// Cap the number of interpreter operations per evaluation.
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Evaluate script text against the currently open scope of
    /// `indicators`.
    ///
    /// The script's final expression is the verdict: a boolean, or a
    /// `[bool, message]` pair whose message is recorded as a leaf. A
    /// string return is treated as a script-raised error. Anything else
    /// is `EINVAL`. The indicator stack must come back at the depth it
    /// had on entry.
    pub fn evaluate(
        &self,
        source: &str,
        action: Action,
        indicators: &mut IndicatorsTree,
        context: &Arc<dyn ExecutionContext>,
    ) -> Result<Status> {
        let base_depth = indicators.depth();
        let state = Rc::new(RefCell::new(BridgeState {
            tree: std::mem::take(indicators),
            base_depth,
        }));
        let engine = self.build_engine(&state, action, context);
        let outcome = engine.eval::<Dynamic>(source);
        drop(engine);

        let state = match Rc::try_unwrap(state) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.borrow().clone(),
        };
        *indicators = state.tree;

        let verdict = interpret_verdict(outcome, indicators)?;
        if indicators.depth() != base_depth {
            return Err(Error::invalid_argument(
                "indicators stack not cleaned up properly",
            ));
        }
        Ok(verdict)
    }

    /// Evaluate a standalone script as its own top-level assessment.
    pub fn run(
        &self,
        label: &str,
        source: &str,
        action: Action,
        context: &Arc<dyn ExecutionContext>,
    ) -> Result<Evaluation> {
        let mut indicators = IndicatorsTree::new();
        indicators.push(label);
        let verdict = self.evaluate(source, action, &mut indicators, context)?;
        let sealed = indicators.pop().unwrap_or(Status::NonCompliant);
        if sealed != verdict {
            warn!(
                script = label,
                verdict = %verdict,
                aggregated = %sealed,
                "script verdict contradicts its indicators; keeping the aggregate"
            );
        }
        Ok(Evaluation {
            status: sealed,
            indicators,
        })
    }

    fn build_engine(
        &self,
        state: &Rc<RefCell<BridgeState>>,
        action: Action,
        context: &Arc<dyn ExecutionContext>,
    ) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.max_operations);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.on_print(|text| info!(target: "complyscan::script", "{}", text));

        let shared = Rc::clone(state);
        engine.register_fn("push", move |label: &str| {
            shared.borrow_mut().tree.push(label);
        });

        let shared = Rc::clone(state);
        engine.register_fn("pop", move || -> ScriptResult<()> {
            let mut state = shared.borrow_mut();
            if state.tree.depth() <= state.base_depth {
                return Err(runtime_error("pop with no open indicator scope"));
            }
            state.tree.pop();
            Ok(())
        });

        let shared = Rc::clone(state);
        engine.register_fn("compliant", move |message: &str| -> bool {
            shared.borrow_mut().tree.compliant(message);
            true
        });

        let shared = Rc::clone(state);
        engine.register_fn("non_compliant", move |message: &str| -> bool {
            shared.borrow_mut().tree.non_compliant(message);
            false
        });

        let shared = Rc::clone(state);
        let registry = Arc::clone(&self.registry);
        let shared_context = Arc::clone(context);
        engine.register_fn(
            "audit",
            move |name: &str, arguments: rhai::Map| -> ScriptResult<bool> {
                let args = convert_arguments(&arguments)?;
                let mut state = shared.borrow_mut();
                let status = invoke_procedure(
                    &registry,
                    name,
                    Action::Audit,
                    &args,
                    &mut state.tree,
                    shared_context.as_ref(),
                )
                .map_err(into_script_error)?;
                Ok(status.is_compliant())
            },
        );

        let shared = Rc::clone(state);
        let registry = Arc::clone(&self.registry);
        let shared_context = Arc::clone(context);
        engine.register_fn(
            "remediate",
            move |name: &str, arguments: rhai::Map| -> ScriptResult<bool> {
                if action == Action::Audit {
                    return Err(runtime_error("remediation not allowed in audit mode"));
                }
                let args = convert_arguments(&arguments)?;
                let mut state = shared.borrow_mut();
                let status = invoke_procedure(
                    &registry,
                    name,
                    Action::Remediate,
                    &args,
                    &mut state.tree,
                    shared_context.as_ref(),
                )
                .map_err(into_script_error)?;
                Ok(status.is_compliant())
            },
        );

        let shared_context = Arc::clone(context);
        engine.register_fn("file_contents", move |path: &str| -> ScriptResult<String> {
            shared_context.file_contents(path).map_err(into_script_error)
        });

        let shared_context = Arc::clone(context);
        engine.register_fn(
            "list_directory",
            move |path: &str| -> ScriptResult<Array> {
                let entries = shared_context
                    .list_directory(path)
                    .map_err(into_script_error)?;
                Ok(entries.into_iter().map(Dynamic::from).collect())
            },
        );

        engine
    }
}

/// Map the script's final expression onto a verdict, recording it as a
/// leaf where the original message would otherwise be lost.
fn interpret_verdict(
    outcome: ScriptResult<Dynamic>,
    indicators: &mut IndicatorsTree,
) -> Result<Status> {
    let value = match outcome {
        Ok(value) => value,
        Err(err) => return Err(Error::failure(format!("script evaluation failed: {}", err))),
    };
    if let Ok(verdict) = value.as_bool() {
        return Ok(record_verdict(verdict, None, indicators));
    }
    if value.is_string() {
        let text = value.into_string().unwrap_or_default();
        return Err(Error::failure(format!("script returned error: {}", text)));
    }
    if value.is_array() {
        let items = value.into_array().unwrap_or_default();
        let verdict = items
            .first()
            .and_then(|item| item.as_bool().ok())
            .ok_or_else(|| Error::invalid_argument("script must return a boolean verdict"))?;
        let message = items.get(1).and_then(|item| item.clone().into_string().ok());
        return Ok(record_verdict(verdict, message, indicators));
    }
    if value.is_unit() {
        return Err(Error::invalid_argument("script must return a boolean verdict"));
    }
    Err(Error::invalid_argument(format!(
        "script must return a boolean verdict, got {}",
        value.type_name()
    )))
}

fn record_verdict(
    verdict: bool,
    message: Option<String>,
    indicators: &mut IndicatorsTree,
) -> Status {
    if verdict {
        if let Some(message) = message {
            indicators.compliant(message);
        }
        Status::Compliant
    } else {
        indicators
            .non_compliant(message.unwrap_or_else(|| String::from("script reported non-compliant")))
    }
}

fn convert_arguments(map: &rhai::Map) -> ScriptResult<ArgumentMap> {
    let mut args = ArgumentMap::new();
    for (key, value) in map.iter() {
        let raw = if value.is_string() {
            value.clone().into_string().unwrap_or_default()
        } else if value.is_int() {
            value.as_int().map(|v| v.to_string()).unwrap_or_default()
        } else if value.is_bool() {
            value.as_bool().map(|v| v.to_string()).unwrap_or_default()
        } else {
            return Err(runtime_error(format!(
                "argument '{}' must be a string, integer or boolean",
                key
            )));
        };
        args.insert(key.to_string(), raw);
    }
    Ok(args)
}

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

fn into_script_error(err: Error) -> Box<EvalAltResult> {
    runtime_error(err.message)
}
