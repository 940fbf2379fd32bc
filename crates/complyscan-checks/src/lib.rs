//! Builtin compliance procedures.
//!
//! Each module contributes descriptors for one family of checks; the
//! [`builtin_registry`] collects them all. Dispatching a procedure only
//! needs the registry and an execution context:
//!
//! ```no_run
//! use complyscan_checks::builtin_registry;
//! use complyscan_core::{Action, ExecutionContext, FileMetadata, Result};
//! use std::collections::BTreeMap;
//!
//! struct HostContext;
//!
//! impl ExecutionContext for HostContext {
//!     fn execute_command(&self, _command: &str) -> Result<String> {
//!         todo!()
//!     }
//!     fn file_contents(&self, _path: &str) -> Result<String> {
//!         todo!()
//!     }
//!     fn file_metadata(&self, _path: &str) -> Result<FileMetadata> {
//!         todo!()
//!     }
//!     fn list_directory(&self, _path: &str) -> Result<Vec<String>> {
//!         todo!()
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let registry = builtin_registry()?;
//! let mut args = BTreeMap::new();
//! args.insert("filename".to_string(), "/etc/passwd".to_string());
//! args.insert("permissions".to_string(), "644".to_string());
//! let evaluation = complyscan_engine::dispatch(
//!     &registry,
//!     "file_permissions",
//!     Action::Audit,
//!     &args,
//!     &HostContext,
//! )?;
//! println!("{}", evaluation.status);
//! # Ok(())
//! # }
//! ```

pub mod files;
pub mod packages;
pub mod sysctl;

#[cfg(test)]
pub(crate) mod testing;

use complyscan_core::Result;
use complyscan_engine::ProcedureRegistry;

/// Registry preloaded with every builtin procedure.
pub fn builtin_registry() -> Result<ProcedureRegistry> {
    Ok(ProcedureRegistry::builder()
        .register(files::file_exists())?
        .register(files::file_permissions_audit())?
        .register(files::file_permissions_remediate())?
        .register(files::file_regex_match())?
        .register(files::no_duplicate_entries())?
        .register(packages::package_installed())?
        .register(sysctl::ensure_sysctl_audit())?
        .register(sysctl::ensure_sysctl_remediate())?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use complyscan_core::Action;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.len(), 6);
        for name in [
            "ensure_sysctl",
            "file_exists",
            "file_permissions",
            "file_regex_match",
            "no_duplicate_entries",
            "package_installed",
        ] {
            assert!(
                registry.lookup(name, Action::Audit).is_some(),
                "missing audit arm for {}",
                name
            );
        }
        assert!(registry.lookup("file_permissions", Action::Remediate).is_some());
        assert!(registry.lookup("ensure_sysctl", Action::Remediate).is_some());
        assert!(registry.lookup("file_exists", Action::Remediate).is_none());
    }

    #[test]
    fn test_every_descriptor_documents_its_parameters() {
        let registry = builtin_registry().unwrap();
        for descriptor in registry.descriptors() {
            assert!(!descriptor.description.is_empty(), "{}", descriptor.name);
            for spec in descriptor.params {
                assert!(
                    !spec.description.is_empty(),
                    "{} / {}",
                    descriptor.name,
                    spec.name
                );
            }
        }
    }
}
