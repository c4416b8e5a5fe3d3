//! Remote command construction.
//!
//! Every command the provisioner sends is one variant of [`RemoteCommand`],
//! rendered for a specific [`OsFamily`]. Each variant carries exactly the
//! arguments its template needs.

use std::fmt;

use crate::os::OsFamily;

const POWERSHELL: &str = "PowerShell -ExecutionPolicy Bypass -OutputFormat Text -Command";

/// A command to run on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand<'a> {
    /// Create a directory and any missing parents.
    CreateDir { path: &'a str },
    /// Recursively remove a directory.
    DeleteDir { path: &'a str },
    /// `salt-call state.apply` with only a file root.
    Apply {
        env: &'a str,
        state_dir: &'a str,
        state: &'a str,
    },
    /// `salt-call state.apply` with a file root and a pillar root.
    ApplyWithPillar {
        env: &'a str,
        state_dir: &'a str,
        pillar_dir: &'a str,
        state: &'a str,
    },
}

impl<'a> RemoteCommand<'a> {
    /// Builds an apply command, adding `--pillar-root` when `pillar_dir` is
    /// present and non-empty.
    ///
    /// An empty `state` applies the highstate of the whole tree.
    pub fn apply(
        env: &'a str,
        state_dir: &'a str,
        pillar_dir: Option<&'a str>,
        state: &'a str,
    ) -> Self {
        match pillar_dir {
            Some(pillar_dir) if !pillar_dir.is_empty() => Self::ApplyWithPillar {
                env,
                state_dir,
                pillar_dir,
                state,
            },
            _ => Self::Apply {
                env,
                state_dir,
                state,
            },
        }
    }

    /// Short label used in progress and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateDir { .. } => "create directory",
            Self::DeleteDir { .. } => "remove directory",
            Self::Apply { .. } | Self::ApplyWithPillar { .. } => "salt-call",
        }
    }

    /// Renders the full command line for the given family.
    pub fn render(&self, family: OsFamily) -> String {
        match (self, family) {
            (Self::CreateDir { path }, OsFamily::Linux) => format!("mkdir -p '{}'", path),
            (Self::CreateDir { path }, OsFamily::Windows) => format!(
                "{} {{New-Item -ItemType Directory -Path {} -Force}}",
                POWERSHELL, path
            ),
            (Self::DeleteDir { path }, OsFamily::Linux) => format!("rm -rf '{}'", path),
            (Self::DeleteDir { path }, OsFamily::Windows) => {
                format!("{} {{Remove-Item -Recurse -Force {}}}", POWERSHELL, path)
            }
            (
                Self::Apply {
                    env,
                    state_dir,
                    state,
                },
                family,
            ) => salt_call(family, env, &format!("--file-root={}", state_dir), state),
            (
                Self::ApplyWithPillar {
                    env,
                    state_dir,
                    pillar_dir,
                    state,
                },
                family,
            ) => salt_call(
                family,
                env,
                &format!("--file-root={} --pillar-root={}", state_dir, pillar_dir),
                state,
            ),
        }
    }
}

fn salt_call(family: OsFamily, env: &str, roots: &str, state: &str) -> String {
    let prefix = match family {
        OsFamily::Linux => "sudo ",
        OsFamily::Windows => "",
    };
    let mut command = format!("{}{}salt-call --local {} state.apply", prefix, env, roots);
    if !state.is_empty() {
        command.push(' ');
        command.push_str(state);
    }
    command
}

impl fmt::Display for RemoteCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derives the state name `state.apply` expects from a relative state file path.
///
/// Backslashes are normalized to `/` and a trailing `.sls` is removed.
pub fn state_name(relative_path: &str) -> String {
    let normalized = relative_path.replace('\\', "/");
    match normalized.strip_suffix(".sls") {
        Some(stripped) => stripped.to_string(),
        None => normalized,
    }
}
