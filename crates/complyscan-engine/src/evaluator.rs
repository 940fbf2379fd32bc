//! Procedure dispatch and composite rule evaluation.

use crate::binding::{self, ArgumentMap};
use crate::indicators::IndicatorsTree;
use crate::registry::{ProcedureDescriptor, ProcedureRegistry};
use crate::script::ScriptBridge;
use complyscan_core::{Action, Error, ExecutionContext, Result, Status};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info_span, warn};

/// Rule parameters available for `$name` substitution.
pub type ParameterMap = BTreeMap<String, String>;

/// Verdict plus the findings recorded while reaching it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub status: Status,
    pub indicators: IndicatorsTree,
}

/// Run one registered procedure through the full lifecycle: resolve the
/// descriptor, validate and default the arguments, invoke inside a fresh
/// scope, verify stack balance and aggregate the verdict.
///
/// Dispatch owns no state of its own, so repeating a call with the same
/// arguments against an unchanged context yields the same evaluation.
pub fn dispatch(
    registry: &ProcedureRegistry,
    name: &str,
    action: Action,
    args: &ArgumentMap,
    context: &dyn ExecutionContext,
) -> Result<Evaluation> {
    let mut indicators = IndicatorsTree::new();
    let status = invoke_procedure(registry, name, action, args, &mut indicators, context)?;
    Ok(Evaluation { status, indicators })
}

/// Resolve, validate and invoke into an existing tree. Shared by
/// [`dispatch`], the rule evaluator and the script bridge.
pub(crate) fn invoke_procedure(
    registry: &ProcedureRegistry,
    name: &str,
    action: Action,
    args: &ArgumentMap,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let descriptor = registry.resolve(name, action)?;
    let effective = binding::apply_defaults(args, descriptor.params)?;
    invoke_scoped(descriptor, &effective, indicators, context)
}

/// Invoke a resolved descriptor inside its own child scope, converting
/// panics to `EFAULT` errors and failing invocations that leave the
/// indicator stack unbalanced.
fn invoke_scoped(
    descriptor: &ProcedureDescriptor,
    args: &ArgumentMap,
    indicators: &mut IndicatorsTree,
    context: &dyn ExecutionContext,
) -> Result<Status> {
    let span = info_span!("procedure", name = descriptor.name, action = %descriptor.action);
    let _guard = span.enter();

    let entry_depth = indicators.depth();
    indicators.push(descriptor.name);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        descriptor.run(args, indicators, context)
    }));
    let returned = match outcome {
        Ok(returned) => returned,
        Err(payload) => {
            return Err(Error::fault(format!(
                "procedure '{}' panicked: {}",
                descriptor.name,
                panic_message(payload)
            )));
        }
    };
    let status = returned?;

    if indicators.depth() != entry_depth + 1 {
        return Err(Error::invalid_argument(format!(
            "indicators stack not cleaned up properly in '{}'",
            descriptor.name
        )));
    }
    let aggregated = indicators.pop().unwrap_or(Status::NonCompliant);
    if aggregated != status {
        warn!(
            procedure = descriptor.name,
            returned = %status,
            aggregated = %aggregated,
            "procedure status contradicts its indicators; keeping the aggregate"
        );
    }
    Ok(aggregated)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("unknown panic payload")
    }
}

/// Walks a composite rule document, dispatching registered procedures and
/// embedded scripts into one shared indicator tree.
///
/// A rule node is an object with exactly one key: `anyOf` and `allOf`
/// take arrays of rules, `not` takes a rule, `script` takes source text,
/// and any other key names a registered procedure whose value is its
/// argument object. String arguments starting with `$` are substituted
/// from the parameter map before binding.
pub struct Evaluator {
    registry: Arc<ProcedureRegistry>,
    parameters: ParameterMap,
    context: Arc<dyn ExecutionContext>,
    indicators: IndicatorsTree,
    script: ScriptBridge,
}

impl Evaluator {
    /// Start an evaluation; the rule name labels the root scope.
    pub fn new(
        rule_name: &str,
        registry: Arc<ProcedureRegistry>,
        parameters: ParameterMap,
        context: Arc<dyn ExecutionContext>,
    ) -> Self {
        let mut indicators = IndicatorsTree::new();
        indicators.push(rule_name);
        let script = ScriptBridge::new(Arc::clone(&registry));
        Self {
            registry,
            parameters,
            context,
            indicators,
            script,
        }
    }

    /// Cap the operation budget for embedded scripts.
    pub fn with_script_budget(mut self, budget: u64) -> Self {
        self.script = self.script.with_max_operations(budget);
        self
    }

    /// Evaluate one rule node. Errors abort the walk; a faulted evaluator
    /// should be dropped, not finished.
    pub fn evaluate(&mut self, rule: &Value, action: Action) -> Result<Status> {
        let object = rule
            .as_object()
            .ok_or_else(|| Error::invalid_argument("rule is not an object"))?;
        if object.len() != 1 {
            return Err(Error::invalid_argument(
                "rule object must contain exactly one key",
            ));
        }
        let (name, value) = match object.iter().next() {
            Some(entry) => entry,
            None => {
                return Err(Error::invalid_argument(
                    "rule object must contain exactly one key",
                ))
            }
        };
        if value.is_null() {
            return Err(Error::invalid_argument("rule name or value is null"));
        }
        match name.as_str() {
            "anyOf" => self.evaluate_list(value, action, true),
            "allOf" => self.evaluate_list(value, action, false),
            "not" => self.evaluate_not(value, action),
            "script" => self.evaluate_script(value, action),
            procedure => self.evaluate_procedure(procedure, value, action),
        }
    }

    /// Seal the evaluation with the overall rule status.
    ///
    /// The root scope carries the combinator result rather than the plain
    /// child aggregate: a compliant `anyOf` keeps its failed alternatives
    /// visible beneath a compliant root.
    pub fn finish(mut self, status: Status) -> Result<Evaluation> {
        if self.indicators.depth() != 1 {
            return Err(Error::invalid_argument(
                "indicators stack not cleaned up properly",
            ));
        }
        let sealed = self.indicators.pop_with(status);
        Ok(Evaluation {
            status: sealed,
            indicators: self.indicators,
        })
    }

    fn evaluate_list(&mut self, value: &Value, action: Action, any: bool) -> Result<Status> {
        let label = if any { "anyOf" } else { "allOf" };
        let items = value
            .as_array()
            .ok_or_else(|| Error::invalid_argument(format!("{} value is not an array", label)))?;
        self.indicators.push(label);
        let mut status = if any {
            Status::NonCompliant
        } else {
            Status::Compliant
        };
        for item in items {
            let item_status = self.evaluate(item, action)?;
            if any && item_status == Status::Compliant {
                status = Status::Compliant;
                break;
            }
            if !any && item_status == Status::NonCompliant {
                status = Status::NonCompliant;
                break;
            }
        }
        Ok(self.indicators.pop_with(status))
    }

    fn evaluate_not(&mut self, value: &Value, action: Action) -> Result<Status> {
        if !value.is_object() {
            return Err(Error::invalid_argument("not value is not an object"));
        }
        if action == Action::Remediate {
            debug!("negated rule always audits; nothing to remediate");
        }
        self.indicators.push("not");
        let inner = self.evaluate(value, Action::Audit)?;
        Ok(self.indicators.pop_with(inner.invert()))
    }

    fn evaluate_script(&mut self, value: &Value, action: Action) -> Result<Status> {
        let source = value
            .as_str()
            .ok_or_else(|| Error::invalid_argument("script value is not a string"))?;
        self.indicators.push("script");
        let status = self
            .script
            .evaluate(source, action, &mut self.indicators, &self.context)?;
        Ok(self.indicators.pop_with(status))
    }

    fn evaluate_procedure(&mut self, name: &str, value: &Value, action: Action) -> Result<Status> {
        let arguments = self.collect_arguments(name, value)?;
        invoke_procedure(
            &self.registry,
            name,
            action,
            &arguments,
            &mut self.indicators,
            self.context.as_ref(),
        )
    }

    fn collect_arguments(&self, name: &str, value: &Value) -> Result<ArgumentMap> {
        let object = value.as_object().ok_or_else(|| {
            Error::invalid_argument(format!(
                "arguments for procedure '{}' must be an object",
                name
            ))
        })?;
        let mut arguments = ArgumentMap::new();
        for (key, item) in object {
            let raw = item.as_str().ok_or_else(|| {
                Error::invalid_argument(format!(
                    "argument '{}' of procedure '{}' must be a string",
                    key, name
                ))
            })?;
            let resolved = match raw.strip_prefix('$') {
                Some(parameter) => self.parameters.get(parameter).cloned().ok_or_else(|| {
                    Error::invalid_argument(format!("parameter '${}' is not defined", parameter))
                })?,
                None => raw.to_string(),
            };
            arguments.insert(key.clone(), resolved);
        }
        Ok(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{optional, required, BindParams, ParamSpec};
    use crate::pattern::Pattern;
    use crate::testing::StaticContext;
    use complyscan_core::codes;
    use serde_json::json;

    struct NoParams;

    impl BindParams for NoParams {
        const SPECS: &'static [ParamSpec] = &[];

        fn bind(_args: &ArgumentMap) -> Result<Self> {
            Ok(NoParams)
        }
    }

    struct ProbeParams {
        filename: String,
    }

    impl BindParams for ProbeParams {
        const SPECS: &'static [ParamSpec] =
            &[ParamSpec::required("filename", "File that must be readable")];

        fn bind(args: &ArgumentMap) -> Result<Self> {
            Ok(Self {
                filename: required(args, "filename")?,
            })
        }
    }

    fn audit_probe_file(
        params: &ProbeParams,
        indicators: &mut IndicatorsTree,
        context: &dyn ExecutionContext,
    ) -> Result<Status> {
        context.file_contents(&params.filename)?;
        Ok(indicators.compliant(format!("file '{}' is readable", params.filename)))
    }

    struct ThresholdParams {
        threshold: i64,
        #[allow(dead_code)]
        pattern: Option<Pattern>,
    }

    impl BindParams for ThresholdParams {
        const SPECS: &'static [ParamSpec] = &[
            ParamSpec::required("threshold", "Value under test"),
            ParamSpec::optional("pattern", "Optional regex, unused by the body"),
        ];

        fn bind(args: &ArgumentMap) -> Result<Self> {
            Ok(Self {
                threshold: required(args, "threshold")?,
                pattern: optional(args, "pattern")?,
            })
        }
    }

    fn audit_threshold(
        params: &ThresholdParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        if params.threshold >= 0 {
            Ok(indicators.compliant(format!("threshold {} is acceptable", params.threshold)))
        } else {
            Ok(indicators.non_compliant(format!("threshold {} is negative", params.threshold)))
        }
    }

    struct DefaultedParams {
        mode: String,
    }

    impl BindParams for DefaultedParams {
        const SPECS: &'static [ParamSpec] =
            &[ParamSpec::optional("mode", "Scan mode").with_default("fast")];

        fn bind(args: &ArgumentMap) -> Result<Self> {
            Ok(Self {
                mode: required(args, "mode")?,
            })
        }
    }

    fn audit_defaulted(
        params: &DefaultedParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        Ok(indicators.compliant(format!("mode {}", params.mode)))
    }

    fn audit_nested(
        _params: &NoParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        indicators.push("check-1");
        indicators.non_compliant("bad value");
        let inner = indicators.pop().unwrap_or(Status::NonCompliant);
        indicators.compliant("other ok");
        Ok(inner)
    }

    fn audit_unbalanced(
        _params: &NoParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        indicators.push("left open");
        Ok(Status::Compliant)
    }

    fn audit_panicky(
        _params: &NoParams,
        _indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        panic!("boom");
    }

    fn audit_contradicting(
        _params: &NoParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        indicators.non_compliant("recorded failure");
        Ok(Status::Compliant)
    }

    fn audit_marker(
        _params: &NoParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        Ok(indicators.compliant("audited"))
    }

    fn remediate_marker(
        _params: &NoParams,
        indicators: &mut IndicatorsTree,
        _context: &dyn ExecutionContext,
    ) -> Result<Status> {
        Ok(indicators.compliant("remediated"))
    }

    fn registry() -> ProcedureRegistry {
        ProcedureRegistry::builder()
            .register(ProcedureDescriptor::audit(
                "probe_file",
                "Reads a file through the context",
                audit_probe_file,
            ))
            .unwrap()
            .register(ProcedureDescriptor::audit(
                "threshold_check",
                "Accepts non-negative thresholds",
                audit_threshold,
            ))
            .unwrap()
            .register(ProcedureDescriptor::audit(
                "defaulted",
                "Reports its mode",
                audit_defaulted,
            ))
            .unwrap()
            .register(ProcedureDescriptor::audit(
                "nested_report",
                "Records a nested scope",
                audit_nested,
            ))
            .unwrap()
            .register(ProcedureDescriptor::audit(
                "unbalanced_scope",
                "Forgets to pop",
                audit_unbalanced,
            ))
            .unwrap()
            .register(ProcedureDescriptor::audit("panicky", "Panics", audit_panicky))
            .unwrap()
            .register(ProcedureDescriptor::audit(
                "contradicting",
                "Lies about its own findings",
                audit_contradicting,
            ))
            .unwrap()
            .register(ProcedureDescriptor::audit(
                "marker",
                "Marks the audit arm",
                audit_marker,
            ))
            .unwrap()
            .register(ProcedureDescriptor::remediate(
                "marker",
                "Marks the remediate arm",
                remediate_marker,
            ))
            .unwrap()
            .build()
    }

    fn args(pairs: &[(&str, &str)]) -> ArgumentMap {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_dispatch_compliant_procedure() {
        let context = StaticContext::new();
        let evaluation = dispatch(
            &registry(),
            "threshold_check",
            Action::Audit,
            &args(&[("threshold", "5")]),
            &context,
        )
        .unwrap();

        assert_eq!(evaluation.status, Status::Compliant);
        let root = evaluation.indicators.root().unwrap();
        assert_eq!(root.label, "threshold_check");
        assert_eq!(root.status, Some(Status::Compliant));
        assert_eq!(root.children.len(), 1);
        assert_eq!(evaluation.indicators.depth(), 0);
    }

    #[test]
    fn test_dispatch_missing_required_parameter() {
        let context = StaticContext::new();
        let err = dispatch(
            &registry(),
            "threshold_check",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap_err();

        assert_eq!(err.code, codes::EINVAL);
        assert_eq!(err.message, "missing 'threshold'");
        assert_eq!(context.call_count(), 0);
    }

    #[test]
    fn test_dispatch_bad_regex_never_touches_context() {
        let context = StaticContext::new();
        let err = dispatch(
            &registry(),
            "threshold_check",
            Action::Audit,
            &args(&[("threshold", "1"), ("pattern", "[")]),
            &context,
        )
        .unwrap_err();

        assert_eq!(err.code, codes::EINVAL);
        assert!(err.message.contains("compilation failed"));
        assert_eq!(context.call_count(), 0);
    }

    #[test]
    fn test_dispatch_propagates_context_errors_with_code() {
        let context = StaticContext::new();
        let err = dispatch(
            &registry(),
            "probe_file",
            Action::Audit,
            &args(&[("filename", "/etc/absent")]),
            &context,
        )
        .unwrap_err();

        assert_eq!(err.code, codes::ENOENT);
        assert!(err.message.contains("/etc/absent"));
    }

    #[test]
    fn test_dispatch_fills_defaults() {
        let context = StaticContext::new();
        let evaluation = dispatch(
            &registry(),
            "defaulted",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap();
        let root = evaluation.indicators.root().unwrap();
        assert_eq!(root.children[0].message.as_deref(), Some("mode fast"));
    }

    #[test]
    fn test_dispatch_unknown_procedure_is_enosys() {
        let context = StaticContext::new();
        let err = dispatch(
            &registry(),
            "no_such_check",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap_err();
        assert_eq!(err.code, codes::ENOSYS);
    }

    #[test]
    fn test_dispatch_nested_scopes_aggregate_to_root() {
        let context = StaticContext::new();
        let evaluation = dispatch(
            &registry(),
            "nested_report",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap();

        assert_eq!(evaluation.status, Status::NonCompliant);
        let root = evaluation.indicators.root().unwrap();
        assert_eq!(root.status, Some(Status::NonCompliant));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].label, "check-1");
        assert_eq!(root.children[0].status, Some(Status::NonCompliant));
        assert_eq!(root.children[1].status, Some(Status::Compliant));
    }

    #[test]
    fn test_dispatch_rejects_unbalanced_stack() {
        let context = StaticContext::new();
        let err = dispatch(
            &registry(),
            "unbalanced_scope",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap_err();
        assert_eq!(err.code, codes::EINVAL);
        assert!(err.message.contains("indicators stack not cleaned up properly"));
        assert!(err.message.contains("unbalanced_scope"));
    }

    #[test]
    fn test_dispatch_contains_panics() {
        let context = StaticContext::new();
        let registry = registry();
        let err = dispatch(
            &registry,
            "panicky",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap_err();
        assert_eq!(err.code, codes::EFAULT);
        assert!(err.message.contains("procedure 'panicky' panicked"));
        assert!(err.message.contains("boom"));

        // the registry stays usable afterwards
        let evaluation = dispatch(
            &registry,
            "threshold_check",
            Action::Audit,
            &args(&[("threshold", "0")]),
            &context,
        )
        .unwrap();
        assert_eq!(evaluation.status, Status::Compliant);
    }

    #[test]
    fn test_indicators_override_contradicting_return() {
        let context = StaticContext::new();
        let evaluation = dispatch(
            &registry(),
            "contradicting",
            Action::Audit,
            &ArgumentMap::new(),
            &context,
        )
        .unwrap();
        assert_eq!(evaluation.status, Status::NonCompliant);
    }

    #[test]
    fn test_dispatch_is_repeatable() {
        let context = StaticContext::new().with_file("/etc/demo", "data");
        let registry = registry();
        let arguments = args(&[("filename", "/etc/demo")]);

        let first = dispatch(&registry, "probe_file", Action::Audit, &arguments, &context).unwrap();
        let second =
            dispatch(&registry, "probe_file", Action::Audit, &arguments, &context).unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.indicators.root(), second.indicators.root());
    }

    #[test]
    fn test_dispatch_remediate_falls_back_to_audit() {
        let context = StaticContext::new();
        let evaluation = dispatch(
            &registry(),
            "threshold_check",
            Action::Remediate,
            &args(&[("threshold", "3")]),
            &context,
        )
        .unwrap();
        assert_eq!(evaluation.status, Status::Compliant);
    }

    fn evaluator(context: StaticContext, parameters: ParameterMap) -> Evaluator {
        Evaluator::new(
            "demo-rule",
            Arc::new(registry()),
            parameters,
            Arc::new(context),
        )
    }

    #[test]
    fn test_any_of_succeeds_past_failed_alternatives() {
        let rule = json!({
            "anyOf": [
                { "threshold_check": { "threshold": "-1" } },
                { "threshold_check": { "threshold": "5" } }
            ]
        });
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        let status = evaluator.evaluate(&rule, Action::Audit).unwrap();
        assert_eq!(status, Status::Compliant);

        let evaluation = evaluator.finish(status).unwrap();
        assert_eq!(evaluation.status, Status::Compliant);
        let root = evaluation.indicators.root().unwrap();
        assert_eq!(root.label, "demo-rule");
        assert_eq!(root.status, Some(Status::Compliant));
        let any_of = &root.children[0];
        assert_eq!(any_of.label, "anyOf");
        assert_eq!(any_of.status, Some(Status::Compliant));
        // the failed alternative stays visible
        assert_eq!(any_of.children[0].status, Some(Status::NonCompliant));
        assert_eq!(any_of.children[1].status, Some(Status::Compliant));
    }

    #[test]
    fn test_all_of_short_circuits() {
        let rule = json!({
            "allOf": [
                { "threshold_check": { "threshold": "-1" } },
                { "probe_file": { "filename": "/etc/demo" } }
            ]
        });
        let context = StaticContext::new().with_file("/etc/demo", "data");
        let mut evaluator = Evaluator::new(
            "demo-rule",
            Arc::new(registry()),
            ParameterMap::new(),
            Arc::new(context),
        );
        let status = evaluator.evaluate(&rule, Action::Audit).unwrap();
        assert_eq!(status, Status::NonCompliant);
        let evaluation = evaluator.finish(status).unwrap();
        let all_of = &evaluation.indicators.root().unwrap().children[0];
        assert_eq!(all_of.label, "allOf");
        // probe_file was never reached
        assert_eq!(all_of.children.len(), 1);
    }

    #[test]
    fn test_any_of_short_circuits_on_first_success() {
        let rule = json!({
            "anyOf": [
                { "threshold_check": { "threshold": "1" } },
                { "probe_file": { "filename": "/etc/demo" } }
            ]
        });
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        let status = evaluator.evaluate(&rule, Action::Audit).unwrap();
        assert_eq!(status, Status::Compliant);
        let evaluation = evaluator.finish(status).unwrap();
        assert_eq!(
            evaluation.indicators.root().unwrap().children[0]
                .children
                .len(),
            1
        );
    }

    #[test]
    fn test_not_inverts_and_audits() {
        let rule = json!({ "not": { "marker": {} } });
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        // remediate action: the negated inner rule must still audit
        let status = evaluator.evaluate(&rule, Action::Remediate).unwrap();
        assert_eq!(status, Status::NonCompliant);

        let evaluation = evaluator.finish(status).unwrap();
        let not_scope = &evaluation.indicators.root().unwrap().children[0];
        assert_eq!(not_scope.label, "not");
        assert_eq!(not_scope.status, Some(Status::NonCompliant));
        let marker = &not_scope.children[0];
        assert_eq!(
            marker.children[0].message.as_deref(),
            Some("audited"),
            "negation must force the audit arm"
        );
    }

    #[test]
    fn test_empty_any_of_is_non_compliant_and_empty_all_of_compliant() {
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        let status = evaluator
            .evaluate(&json!({ "anyOf": [] }), Action::Audit)
            .unwrap();
        assert_eq!(status, Status::NonCompliant);
        let status = evaluator
            .evaluate(&json!({ "allOf": [] }), Action::Audit)
            .unwrap();
        assert_eq!(status, Status::Compliant);
    }

    #[test]
    fn test_rule_shape_errors() {
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());

        let err = evaluator.evaluate(&json!([1, 2]), Action::Audit).unwrap_err();
        assert_eq!(err.message, "rule is not an object");

        let err = evaluator.evaluate(&json!({}), Action::Audit).unwrap_err();
        assert_eq!(err.message, "rule object must contain exactly one key");

        let err = evaluator
            .evaluate(
                &json!({ "a": { "x": "1" }, "b": { "y": "2" } }),
                Action::Audit,
            )
            .unwrap_err();
        assert_eq!(err.message, "rule object must contain exactly one key");

        let err = evaluator
            .evaluate(&json!({ "marker": null }), Action::Audit)
            .unwrap_err();
        assert_eq!(err.message, "rule name or value is null");

        let err = evaluator
            .evaluate(&json!({ "anyOf": {} }), Action::Audit)
            .unwrap_err();
        assert_eq!(err.message, "anyOf value is not an array");

        let err = evaluator
            .evaluate(&json!({ "allOf": "x" }), Action::Audit)
            .unwrap_err();
        assert_eq!(err.message, "allOf value is not an array");

        let err = evaluator
            .evaluate(&json!({ "not": [1] }), Action::Audit)
            .unwrap_err();
        assert_eq!(err.message, "not value is not an object");

        let err = evaluator
            .evaluate(&json!({ "threshold_check": { "threshold": 5 } }), Action::Audit)
            .unwrap_err();
        assert_eq!(
            err.message,
            "argument 'threshold' of procedure 'threshold_check' must be a string"
        );
    }

    #[test]
    fn test_parameter_substitution() {
        let mut parameters = ParameterMap::new();
        parameters.insert("limit".to_string(), "7".to_string());
        let rule = json!({ "threshold_check": { "threshold": "$limit" } });
        let mut evaluator = evaluator(StaticContext::new(), parameters);
        assert_eq!(
            evaluator.evaluate(&rule, Action::Audit).unwrap(),
            Status::Compliant
        );
    }

    #[test]
    fn test_undefined_parameter_is_invalid() {
        let rule = json!({ "threshold_check": { "threshold": "$missing" } });
        let context = StaticContext::new();
        let mut evaluator = Evaluator::new(
            "demo-rule",
            Arc::new(registry()),
            ParameterMap::new(),
            Arc::new(context),
        );
        let err = evaluator.evaluate(&rule, Action::Audit).unwrap_err();
        assert_eq!(err.code, codes::EINVAL);
        assert_eq!(err.message, "parameter '$missing' is not defined");
    }

    #[test]
    fn test_unknown_procedure_in_rule() {
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        let err = evaluator
            .evaluate(&json!({ "no_such": {} }), Action::Audit)
            .unwrap_err();
        assert_eq!(err.code, codes::ENOSYS);
    }

    #[test]
    fn test_script_rule_records_scope() {
        let rule = json!({ "script": "non_compliant(\"scripted failure\")" });
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        let status = evaluator.evaluate(&rule, Action::Audit).unwrap();
        assert_eq!(status, Status::NonCompliant);

        let evaluation = evaluator.finish(status).unwrap();
        let script_scope = &evaluation.indicators.root().unwrap().children[0];
        assert_eq!(script_scope.label, "script");
        assert_eq!(script_scope.status, Some(Status::NonCompliant));
        assert_eq!(
            script_scope.children[0].message.as_deref(),
            Some("scripted failure")
        );
    }

    #[test]
    fn test_finish_seals_the_root() {
        let mut evaluator = evaluator(StaticContext::new(), ParameterMap::new());
        let status = evaluator
            .evaluate(&json!({ "marker": {} }), Action::Audit)
            .unwrap();
        let evaluation = evaluator.finish(status).unwrap();
        assert_eq!(evaluation.indicators.depth(), 0);
        assert_eq!(evaluation.indicators.status(), Some(Status::Compliant));
    }
}
