//! Canned execution context for procedure tests.

use complyscan_core::{Error, ExecutionContext, FileMetadata, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Context that answers from fixed maps and records every command line.
///
/// `chmod`, `chown`, `chgrp` and `sysctl -w` command lines are applied to
/// the canned state, so remediation procedures that re-audit after fixing
/// observe their own writes.
#[derive(Default)]
pub struct MockContext {
    files: Mutex<BTreeMap<String, String>>,
    commands: BTreeMap<String, String>,
    redirects: BTreeMap<String, String>,
    directories: BTreeMap<String, Vec<String>>,
    metadata: Mutex<BTreeMap<String, FileMetadata>>,
    executed: Mutex<Vec<String>>,
}

impl MockContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_string());
        self
    }

    pub fn with_command(mut self, command: &str, stdout: &str) -> Self {
        self.commands.insert(command.to_string(), stdout.to_string());
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    pub fn with_directory(mut self, path: &str, entries: &[&str]) -> Self {
        self.directories.insert(
            path.to_string(),
            entries.iter().map(|entry| entry.to_string()).collect(),
        );
        self
    }

    pub fn with_metadata(self, path: &str, metadata: FileMetadata) -> Self {
        self.metadata.lock().unwrap().insert(path.to_string(), metadata);
        self
    }

    /// Every command line passed to `execute_command`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn apply_file_command(&self, command: &str) -> Option<()> {
        let mut parts = command.split_whitespace();
        let verb = parts.next()?;
        let argument = parts.next()?;
        let path = parts.next()?.trim_matches('\'').to_string();
        let mut metadata = self.metadata.lock().unwrap();
        let entry = metadata.get_mut(&path)?;
        match verb {
            "chmod" => {
                entry.mode = u32::from_str_radix(argument, 8).ok()?;
            }
            "chown" => {
                entry.owner = Some(argument.trim_matches('\'').to_string());
            }
            "chgrp" => {
                entry.group = Some(argument.trim_matches('\'').to_string());
            }
            _ => return None,
        }
        Some(())
    }

    fn apply_sysctl_write(&self, command: &str) -> Option<()> {
        let assignment = command.strip_prefix("sysctl -w ")?;
        let (name, value) = assignment.split_once('=')?;
        let path = format!("/proc/sys/{}", name.replace('.', "/"));
        let resolved = self.special_file_path(&path);
        self.files
            .lock()
            .unwrap()
            .insert(resolved, format!("{}\n", value));
        Some(())
    }
}

impl ExecutionContext for MockContext {
    fn execute_command(&self, command: &str) -> Result<String> {
        self.executed.lock().unwrap().push(command.to_string());
        if self.apply_file_command(command).is_some() {
            return Ok(String::new());
        }
        if self.apply_sysctl_write(command).is_some() {
            return Ok(String::new());
        }
        self.commands
            .get(command)
            .cloned()
            .ok_or_else(|| Error::failure(format!("command '{}' exited with status 1", command)))
    }

    fn file_contents(&self, path: &str) -> Result<String> {
        let resolved = self.special_file_path(path);
        self.files
            .lock()
            .unwrap()
            .get(&resolved)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("failed to read '{}'", resolved)))
    }

    fn file_metadata(&self, path: &str) -> Result<FileMetadata> {
        let resolved = self.special_file_path(path);
        self.metadata
            .lock()
            .unwrap()
            .get(&resolved)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("failed to stat '{}'", resolved)))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let resolved = self.special_file_path(path);
        self.directories
            .get(&resolved)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("failed to list '{}'", resolved)))
    }

    fn special_file_path(&self, path: &str) -> String {
        self.redirects
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }
}

/// Metadata for a root-owned file with the given permission bits.
pub fn root_file(mode: u32) -> FileMetadata {
    FileMetadata {
        mode,
        uid: 0,
        gid: 0,
        owner: Some(String::from("root")),
        group: Some(String::from("root")),
    }
}
