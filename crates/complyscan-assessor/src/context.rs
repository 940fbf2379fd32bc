//! Execution context backed by the local machine.

use complyscan_core::{Error, ExecutionContext, FileMetadata, Result};
use std::collections::BTreeMap;
use std::fs;
use std::process::Command;
use tracing::debug;

/// Runs commands and reads files on the assessed host itself.
///
/// Redirects substitute one path for another before any filesystem access,
/// which keeps rules written against well-known paths testable against
/// fixtures.
#[derive(Default)]
pub struct SystemContext {
    redirects: BTreeMap<String, String>,
}

impl SystemContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }
}

impl ExecutionContext for SystemContext {
    fn execute_command(&self, command: &str) -> Result<String> {
        debug!(command, "executing");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|err| Error::from(err).context(format!("failed to spawn '{}'", command)))?;
        if !output.status.success() {
            let status = output.status.code().unwrap_or(-1);
            return Err(Error::failure(format!(
                "command '{}' exited with status {}",
                command, status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn file_contents(&self, path: &str) -> Result<String> {
        let resolved = self.special_file_path(path);
        fs::read_to_string(&resolved)
            .map_err(|err| Error::from(err).context(format!("failed to read '{}'", resolved)))
    }

    fn file_metadata(&self, path: &str) -> Result<FileMetadata> {
        let resolved = self.special_file_path(path);
        let metadata = fs::metadata(&resolved)
            .map_err(|err| Error::from(err).context(format!("failed to stat '{}'", resolved)))?;
        Ok(host_metadata(&metadata))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let resolved = self.special_file_path(path);
        let entries = fs::read_dir(&resolved)
            .map_err(|err| Error::from(err).context(format!("failed to list '{}'", resolved)))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|err| Error::from(err).context(format!("failed to list '{}'", resolved)))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn special_file_path(&self, path: &str) -> String {
        self.redirects
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }
}

#[cfg(unix)]
fn host_metadata(metadata: &fs::Metadata) -> FileMetadata {
    use std::os::unix::fs::MetadataExt;

    let uid = metadata.uid();
    let gid = metadata.gid();
    FileMetadata {
        mode: metadata.mode() & 0o7777,
        uid,
        gid,
        owner: lookup_name("passwd", uid),
        group: lookup_name("group", gid),
    }
}

#[cfg(not(unix))]
fn host_metadata(_metadata: &fs::Metadata) -> FileMetadata {
    FileMetadata {
        mode: 0,
        uid: 0,
        gid: 0,
        owner: None,
        group: None,
    }
}

/// Resolve a uid or gid to its name through `getent`. Lookup failures
/// degrade to `None`; the numeric id still identifies the principal.
#[cfg(unix)]
fn lookup_name(database: &str, id: u32) -> Option<String> {
    let output = Command::new("getent")
        .arg(database)
        .arg(id.to_string())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let name = text.split(':').next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
