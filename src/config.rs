//! YAML configuration for the Salt provisioner.
//!
//! The configuration is decoded as-is; defaulting and validation happen in
//! [`crate::request::ProvisionRequest::from_config`].

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::SaltError;

/// Decoded provisioner configuration.
///
/// Relative local paths are resolved against `base_dir` when they are read;
/// the remote layout keeps the path exactly as declared.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// OS of the target; unknown values fall back to linux.
    #[serde(default)]
    pub target_os: String,

    /// State files to upload and apply one by one, in order.
    #[serde(default)]
    pub state_files: Vec<Utf8PathBuf>,

    /// State tree to upload and apply as a highstate.
    #[serde(default)]
    pub state_tree: Option<Utf8PathBuf>,

    #[serde(default)]
    pub pillar_files: Vec<Utf8PathBuf>,

    #[serde(default)]
    pub pillar_tree: Option<Utf8PathBuf>,

    /// Remote `--file-root`. Defaults from the OS profile.
    #[serde(default, alias = "staging_directory")]
    pub remote_state_dir: Option<String>,

    /// Remote `--pillar-root`. Defaults from the OS profile.
    #[serde(default)]
    pub remote_pillar_dir: Option<String>,

    /// `KEY=VALUE` entries passed to salt-call.
    #[serde(default)]
    pub environment_vars: Vec<String>,

    /// Template with `{key}` and `{value}` placeholders.
    #[serde(default)]
    pub env_var_format: Option<String>,

    /// Remove the remote directories once salt-call has finished.
    #[serde(default, alias = "clean_staging_directory")]
    pub clean: bool,

    /// Directory that relative local paths are resolved against. Never read
    /// from YAML; [`load_config`] sets it to the file's directory.
    #[serde(skip)]
    pub base_dir: Option<Utf8PathBuf>,
}

impl Config {
    /// Sets the directory that relative local paths are resolved against.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<Utf8PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }
}

/// Loads a configuration file.
///
/// The file's parent directory becomes the base for relative local paths.
pub fn load_config(path: &Utf8Path) -> Result<Config, SaltError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| SaltError::io(format!("failed to read config file {}", path), e))?;
    let config: Config = serde_yaml::from_str(&contents)
        .map_err(|e| SaltError::Config(format!("failed to parse {}: {}", path, e)))?;

    Ok(match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => config.with_base_dir(parent),
        _ => config,
    })
}
