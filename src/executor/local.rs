//! Local machine executor.
//!
//! This module provides [`LocalExecutor`], which treats the machine rssalt
//! runs on as the target: commands go through `sh -c` with their output
//! relayed to a [`Ui`], and uploads are plain filesystem copies.

use std::fs;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;
use which::which;

use super::output::relay;
use super::{ExecutionResult, RemoteExecutor};
use crate::error::SaltError;
use crate::ui::{TracingUi, Ui};

/// Executor whose target is the local machine.
///
/// When `dry_run` is true, commands and uploads are logged but not performed,
/// and every command reports `ExecutionResult { code: None }`. Command output
/// is relayed line by line to the output [`Ui`], [`TracingUi`] by default.
pub struct LocalExecutor {
    dry_run: bool,
    output: Arc<dyn Ui>,
}

impl LocalExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            output: Arc::new(TracingUi),
        }
    }

    /// Sends command output to `output` instead of the log.
    #[must_use]
    pub fn with_output(mut self, output: Arc<dyn Ui>) -> Self {
        self.output = output;
        self
    }
}

impl RemoteExecutor for LocalExecutor {
    fn run(&self, command: &str) -> Result<ExecutionResult> {
        if self.dry_run {
            tracing::info!("dry run: {}", command);
            return Ok(ExecutionResult { code: None });
        }

        let shell = which("sh").context("command not found: sh")?;
        let mut child = Command::new(&shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {} -c {}", shell.display(), command))?;
        tracing::trace!(pid = child.id(), "started: {}", command);

        let status = relay(&mut child, self.output.as_ref()).map_err(|e| SaltError::Execution {
            command: command.to_string(),
            status: format!("failed to collect command status: {}", e),
        })?;

        // Killed by a signal.
        let code = status.code().ok_or_else(|| SaltError::Execution {
            command: command.to_string(),
            status: format!("terminated without an exit code: {}", status),
        })?;
        tracing::trace!("exit code {}: {}", code, command);
        Ok(ExecutionResult::exited(code))
    }

    fn upload_file(&self, remote_path: &str, source: &mut dyn Read) -> Result<()> {
        if self.dry_run {
            tracing::info!("dry run: upload file to {}", remote_path);
            return Ok(());
        }

        let mut target = fs::File::create(remote_path)
            .map_err(|e| SaltError::io(format!("failed to create {}", remote_path), e))?;
        io::copy(source, &mut target)
            .map_err(|e| SaltError::io(format!("failed to write {}", remote_path), e))?;
        Ok(())
    }

    fn upload_dir(&self, remote_path: &str, local_path: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!("dry run: upload directory {} to {}", local_path, remote_path);
            return Ok(());
        }

        let source = Utf8Path::new(local_path);
        let destination = if local_path.ends_with('/') || local_path.ends_with('\\') {
            Utf8PathBuf::from(remote_path)
        } else {
            let name = source
                .file_name()
                .with_context(|| format!("cannot determine directory name of {}", local_path))?;
            Utf8Path::new(remote_path).join(name)
        };

        copy_tree(source, &destination)
    }
}

/// Copies every entry under `source` into `destination`, keeping relative
/// paths. File permissions are preserved by `fs::copy`; directory
/// permissions are applied once the walk is done, deepest first, so a
/// read-only directory can still be filled.
fn copy_tree(source: &Utf8Path, destination: &Utf8Path) -> Result<()> {
    let mut directories = Vec::new();

    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", source))?;
        let relative = entry
            .path()
            .strip_prefix(source.as_std_path())
            .with_context(|| format!("{} is not under {}", entry.path().display(), source))?;
        let target = destination.as_std_path().join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                SaltError::io(format!("failed to create directory {}", target.display()), e)
            })?;
            let permissions = entry
                .metadata()
                .with_context(|| format!("failed to read metadata of {}", entry.path().display()))?
                .permissions();
            directories.push((target, permissions));
        } else {
            tracing::trace!("copying {} to {}", entry.path().display(), target.display());
            fs::copy(entry.path(), &target).map_err(|e| {
                SaltError::io(
                    format!("failed to copy {} to {}", entry.path().display(), target.display()),
                    e,
                )
            })?;
        }
    }

    for (target, permissions) in directories.into_iter().rev() {
        fs::set_permissions(&target, permissions).map_err(|e| {
            SaltError::io(format!("failed to set permissions on {}", target.display()), e)
        })?;
    }
    Ok(())
}
