//! Domain-specific error types for rssalt.
//!
//! This module defines `SaltError`, a `thiserror`-based enum that
//! provides typed error variants for the failure modes of a provisioning
//! run. Validation and the command helpers return `Result<T, SaltError>`,
//! while orchestration and trait boundaries use `anyhow::Result`.
//!
//! `SaltError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at boundaries that return `anyhow::Result`,
//! and callers can recover the typed variant with `downcast_ref`.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For other kinds the
/// OS-level message is included directly.
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

fn bullet_list(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("\n  * {}", e))
        .collect::<String>()
}

/// Domain-specific error type for rssalt.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SaltError {
    /// A single validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// One or more configuration problems, collected so they can all be fixed at once.
    #[error("invalid configuration ({} error(s)):{}", .0.len(), bullet_list(.0))]
    InvalidConfig(Vec<String>),

    /// A remote command exited with a non-zero status.
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The rendered command string.
        command: String,
        /// Human-readable reason, e.g. `non-zero exit status: 42`.
        status: String,
    },

    /// A remote command exited with status 127.
    #[error(
        "{command} could not be found. Verify that it is available on the PATH \
        after connecting to the machine"
    )]
    CommandNotFound {
        /// The rendered command string.
        command: String,
    },

    /// Content could not be transferred to the target.
    #[error("failed to upload {path}: {message}")]
    Upload {
        /// The local path being uploaded.
        path: String,
        /// The underlying failure, flattened with its causes.
        message: String,
    },

    /// The run was cancelled before the named operation started.
    #[error("provisioning cancelled before {0}")]
    Cancelled(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred (usually contains a path).
        context: String,
        /// Derived from [`io_error_kind_message`].
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl SaltError {
    /// Creates an `Io` variant with the `message` field derived from `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Creates an `Upload` variant, flattening the error chain into the message.
    pub(crate) fn upload(path: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Upload {
            path: path.into(),
            message: format!("{:#}", err),
        }
    }
}
