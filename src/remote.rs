//! Command dispatch to the target.
//!
//! [`RemoteShell`] renders [`RemoteCommand`]s for the resolved OS family,
//! runs them through a [`RemoteExecutor`] and turns exit codes into typed
//! errors. Every remote operation first checks the run's cancellation token.

use std::io::Read;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::RemoteCommand;
use crate::error::SaltError;
use crate::executor::{ExecutionResult, RemoteExecutor};
use crate::os::OsFamily;
use crate::ui::Ui;

/// Exit code shells use when the command itself cannot be found.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Interprets the exit status of a rendered command.
///
/// - `0` (or no status, in dry-run mode) is success
/// - `127` is [`SaltError::CommandNotFound`]
/// - anything else is [`SaltError::Execution`] carrying the code
pub fn check_exit_status(command: &str, result: &ExecutionResult) -> Result<(), SaltError> {
    match result.code {
        None | Some(0) => Ok(()),
        Some(EXIT_COMMAND_NOT_FOUND) => Err(SaltError::CommandNotFound {
            command: command.to_string(),
        }),
        Some(code) => Err(SaltError::Execution {
            command: command.to_string(),
            status: format!("non-zero exit status: {}", code),
        }),
    }
}

/// Session over one target for the duration of a provisioning run.
pub struct RemoteShell<'a> {
    executor: &'a dyn RemoteExecutor,
    ui: &'a dyn Ui,
    cancel: &'a CancellationToken,
    family: OsFamily,
}

impl<'a> RemoteShell<'a> {
    pub fn new(
        executor: &'a dyn RemoteExecutor,
        ui: &'a dyn Ui,
        cancel: &'a CancellationToken,
        family: OsFamily,
    ) -> Self {
        Self {
            executor,
            ui,
            cancel,
            family,
        }
    }

    pub fn ui(&self) -> &dyn Ui {
        self.ui
    }

    /// Fails with [`SaltError::Cancelled`] once the token has been cancelled.
    pub fn ensure_not_cancelled(&self, operation: &str) -> Result<(), SaltError> {
        if self.cancel.is_cancelled() {
            return Err(SaltError::Cancelled(operation.to_string()));
        }
        Ok(())
    }

    /// Creates `path` and any missing parents on the target.
    pub fn create_dir(&self, path: &str) -> Result<()> {
        self.ui.message(&format!("Creating directory: {}", path));
        self.execute(RemoteCommand::CreateDir { path })
            .with_context(|| format!("failed to create remote directory {}", path))
    }

    /// Recursively removes `path` on the target.
    pub fn remove_dir(&self, path: &str) -> Result<()> {
        self.ui.message(&format!("Removing directory: {}", path));
        self.execute(RemoteCommand::DeleteDir { path })
            .with_context(|| format!("failed to remove remote directory {}", path))
    }

    /// Runs `salt-call state.apply` for `state`, or the highstate when
    /// `state` is empty.
    pub fn apply_state(
        &self,
        env: &str,
        state_dir: &str,
        pillar_dir: Option<&str>,
        state: &str,
    ) -> Result<()> {
        let command = RemoteCommand::apply(env, state_dir, pillar_dir, state);
        self.ui
            .message(&format!("Executing Salt: {}", command.render(self.family)));
        self.execute(command)
    }

    /// Uploads a single stream to `remote_path`.
    pub fn upload_file(&self, remote_path: &str, source: &mut dyn Read) -> Result<()> {
        self.ensure_not_cancelled(&format!("uploading {}", remote_path))?;
        self.executor.upload_file(remote_path, source)
    }

    /// Uploads a local directory to `remote_path`.
    pub fn upload_dir(&self, remote_path: &str, local_path: &str) -> Result<()> {
        self.ensure_not_cancelled(&format!("uploading {}", local_path))?;
        self.executor.upload_dir(remote_path, local_path)
    }

    fn execute(&self, command: RemoteCommand<'_>) -> Result<()> {
        self.ensure_not_cancelled(&format!("running {}", command.label()))?;

        let rendered = command.render(self.family);
        debug!(family = %self.family, "running remote command: {}", rendered);

        // Transport errors are returned as-is.
        let result = self.executor.run(&rendered)?;
        debug!("remote command finished: {:?}", result.code);

        check_exit_status(&rendered, &result)?;
        Ok(())
    }
}
