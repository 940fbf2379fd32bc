//! Catalog of registered procedures.

use crate::binding::{ArgumentMap, BindParams, ParamSpec};
use crate::indicators::IndicatorsTree;
use complyscan_core::{Action, Error, ExecutionContext, Result, Status};
use std::collections::BTreeMap;
use tracing::info;

/// Type-erased procedure body: raw arguments in, verdict out.
pub type ProcedureFn = Box<
    dyn Fn(&ArgumentMap, &mut IndicatorsTree, &dyn ExecutionContext) -> Result<Status>
        + Send
        + Sync,
>;

/// A registered procedure: identity, declared parameters, and the callable
/// that binds and runs it.
pub struct ProcedureDescriptor {
    pub name: &'static str,
    pub action: Action,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    invoke: ProcedureFn,
}

impl std::fmt::Debug for ProcedureDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureDescriptor")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("description", &self.description)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ProcedureDescriptor {
    /// Wrap a typed audit body behind the binder.
    pub fn audit<P: BindParams + 'static>(
        name: &'static str,
        description: &'static str,
        body: fn(&P, &mut IndicatorsTree, &dyn ExecutionContext) -> Result<Status>,
    ) -> Self {
        Self::wrap(name, Action::Audit, description, body)
    }

    /// Wrap a typed remediation body behind the binder.
    pub fn remediate<P: BindParams + 'static>(
        name: &'static str,
        description: &'static str,
        body: fn(&P, &mut IndicatorsTree, &dyn ExecutionContext) -> Result<Status>,
    ) -> Self {
        Self::wrap(name, Action::Remediate, description, body)
    }

    fn wrap<P: BindParams + 'static>(
        name: &'static str,
        action: Action,
        description: &'static str,
        body: fn(&P, &mut IndicatorsTree, &dyn ExecutionContext) -> Result<Status>,
    ) -> Self {
        let invoke: ProcedureFn = Box::new(move |args, indicators, context| {
            let params = P::bind(args)?;
            body(&params, indicators, context)
        });
        Self {
            name,
            action,
            description,
            params: P::SPECS,
            invoke,
        }
    }

    /// Bind the arguments and run the body. A binding failure returns
    /// before the body ever sees the context.
    pub fn run(
        &self,
        args: &ArgumentMap,
        indicators: &mut IndicatorsTree,
        context: &dyn ExecutionContext,
    ) -> Result<Status> {
        (self.invoke)(args, indicators, context)
    }
}

#[derive(Debug, Default)]
struct ProcedureArms {
    audit: Option<ProcedureDescriptor>,
    remediate: Option<ProcedureDescriptor>,
}

/// Immutable catalog mapping `(name, action)` to procedures.
///
/// Built once at startup through [`RegistryBuilder`]; afterwards access is
/// read-only, so concurrent dispatches share it freely.
pub struct ProcedureRegistry {
    entries: BTreeMap<&'static str, ProcedureArms>,
}

impl ProcedureRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Exact lookup, no fallback.
    pub fn lookup(&self, name: &str, action: Action) -> Option<&ProcedureDescriptor> {
        let arms = self.entries.get(name)?;
        match action {
            Action::Audit => arms.audit.as_ref(),
            Action::Remediate => arms.remediate.as_ref(),
        }
    }

    /// Resolve a dispatch target.
    ///
    /// An unknown name is `ENOSYS`. A remediation request against an
    /// audit-only procedure falls back to the audit arm so the check is
    /// still evaluated; the fallback is logged.
    pub fn resolve(&self, name: &str, action: Action) -> Result<&ProcedureDescriptor> {
        let arms = self
            .entries
            .get(name)
            .ok_or_else(|| Error::unsupported(format!("unknown procedure '{}'", name)))?;
        match action {
            Action::Audit => arms.audit.as_ref().ok_or_else(|| {
                Error::unsupported(format!("no audit action registered for procedure '{}'", name))
            }),
            Action::Remediate => match (&arms.remediate, &arms.audit) {
                (Some(descriptor), _) => Ok(descriptor),
                (None, Some(descriptor)) => {
                    info!(
                        procedure = name,
                        "no remediation registered, falling back to audit"
                    );
                    Ok(descriptor)
                }
                (None, None) => Err(Error::unsupported(format!("unknown procedure '{}'", name))),
            },
        }
    }

    /// All descriptors in name order, audit arm first, for catalog output.
    pub fn descriptors(&self) -> impl Iterator<Item = &ProcedureDescriptor> {
        self.entries
            .values()
            .flat_map(|arms| arms.audit.iter().chain(arms.remediate.iter()))
    }

    /// Number of distinct procedure names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates registrations during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<&'static str, ProcedureArms>,
}

impl RegistryBuilder {
    /// Add a descriptor. Registering the same `(name, action)` pair twice
    /// is a configuration error.
    pub fn register(mut self, descriptor: ProcedureDescriptor) -> Result<Self> {
        let arms = self.entries.entry(descriptor.name).or_default();
        let slot = match descriptor.action {
            Action::Audit => &mut arms.audit,
            Action::Remediate => &mut arms.remediate,
        };
        if slot.is_some() {
            return Err(Error::invalid_argument(format!(
                "procedure '{}' is already registered for {}",
                descriptor.name, descriptor.action
            )));
        }
        *slot = Some(descriptor);
        Ok(self)
    }

    pub fn build(self) -> ProcedureRegistry {
        ProcedureRegistry {
            entries: self.entries,
        }
    }
}
