//! Canned execution context for engine tests.

use complyscan_core::{Error, ExecutionContext, FileMetadata, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Context that answers from fixed maps and counts how often it was
/// touched, so tests can assert that binding failures never reach it.
#[derive(Default)]
pub struct StaticContext {
    files: BTreeMap<String, String>,
    commands: BTreeMap<String, String>,
    redirects: BTreeMap<String, String>,
    metadata: BTreeMap<String, FileMetadata>,
    directories: BTreeMap<String, Vec<String>>,
    calls: AtomicUsize,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
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

    pub fn with_metadata(mut self, path: &str, metadata: FileMetadata) -> Self {
        self.metadata.insert(path.to_string(), metadata);
        self
    }

    pub fn with_directory(mut self, path: &str, entries: &[&str]) -> Self {
        self.directories.insert(
            path.to_string(),
            entries.iter().map(|entry| entry.to_string()).collect(),
        );
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExecutionContext for StaticContext {
    fn execute_command(&self, command: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands
            .get(command)
            .cloned()
            .ok_or_else(|| Error::failure(format!("command '{}' exited with status 1", command)))
    }

    fn file_contents(&self, path: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let resolved = self.special_file_path(path);
        self.files
            .get(&resolved)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("failed to read '{}'", resolved)))
    }

    fn file_metadata(&self, path: &str) -> Result<FileMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let resolved = self.special_file_path(path);
        self.metadata
            .get(&resolved)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("failed to stat '{}'", resolved)))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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
