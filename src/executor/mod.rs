//! Remote execution abstraction for rssalt.
//!
//! This module provides:
//! - [`RemoteExecutor`]: Trait for the transport that runs commands and
//!   receives uploads on the target
//! - [`ExecutionResult`]: Result of a remote command
//! - [`LocalExecutor`]: Implementation that treats the local machine as the target

mod local;
mod output;

use std::io::Read;

use anyhow::Result;

pub use local::LocalExecutor;

/// Result of remote command execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code of the command (None in dry-run mode)
    pub code: Option<i32>,
}

impl ExecutionResult {
    /// Creates a result for a command that exited with `code`.
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (code is None), this always returns true.
    pub fn success(&self) -> bool {
        self.code.is_none_or(|c| c == 0)
    }
}

/// Transport used to reach the target machine.
///
/// An `Err` from any method is a transport failure (e.g. a dropped
/// connection) and is propagated without reinterpretation. A command that ran
/// but failed is reported through [`ExecutionResult::code`] instead.
///
/// Remote paths are always `/`-delimited.
pub trait RemoteExecutor: Send + Sync {
    /// Runs a fully rendered command line on the target.
    fn run(&self, command: &str) -> Result<ExecutionResult>;

    /// Writes the contents of `source` to `remote_path`.
    fn upload_file(&self, remote_path: &str, source: &mut dyn Read) -> Result<()>;

    /// Copies a local directory tree to `remote_path`.
    ///
    /// When `local_path` ends with a separator, the *contents* of the
    /// directory are placed in `remote_path`; otherwise the directory itself
    /// becomes a child of `remote_path`.
    fn upload_dir(&self, remote_path: &str, local_path: &str) -> Result<()>;
}
