//! Validated provisioning request.
//!
//! [`ProvisionRequest::from_config`] turns a decoded [`Config`] into the
//! immutable request the orchestrator consumes. Every problem found is
//! collected and reported at once through [`SaltError::InvalidConfig`], before
//! anything touches the target.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::env::{self, EnvVarFormat};
use crate::error::{SaltError, io_error_kind_message};
use crate::os::{self, OsFamily};

/// A local file together with the path it keeps under the remote base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    /// Path used to read the file locally.
    pub local: Utf8PathBuf,
    /// `/`-delimited path relative to the remote base, as declared.
    pub relative: String,
}

impl ContentFile {
    /// Builds a content file from a declared path.
    ///
    /// `base_dir` only affects where the file is read from; the remote layout
    /// always follows the declared path.
    pub fn new(declared: &Utf8Path, base_dir: Option<&Utf8Path>) -> Self {
        let local = match base_dir {
            Some(base) if declared.is_relative() => base.join(declared),
            _ => declared.to_path_buf(),
        };
        Self {
            local,
            relative: normalize_relative(declared.as_str()),
        }
    }
}

/// Drops empty and `.` segments and joins the rest with `/`.
///
/// Both `/` and `\` are treated as separators. A leading drive prefix such as
/// `C:` is dropped like a leading `/`, whatever the host OS.
pub fn normalize_relative(path: &str) -> String {
    let mut segments = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .peekable();
    segments.next_if(|first| is_drive_prefix(first));
    segments.collect::<Vec<_>>().join("/")
}

fn is_drive_prefix(segment: &str) -> bool {
    matches!(segment.as_bytes(), [letter, b':'] if letter.is_ascii_alphabetic())
}

/// What to upload for the state or pillar section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Discrete files, in declaration order.
    Files(Vec<ContentFile>),
    /// One directory whose contents become the remote directory.
    Tree(Utf8PathBuf),
}

/// Everything a provisioning run needs, validated and defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub target_os: OsFamily,
    pub states: Content,
    pub pillar: Option<Content>,
    pub remote_state_dir: String,
    pub remote_pillar_dir: String,
    /// Raw `KEY=VALUE` entries, already checked by [`env::parse_env_var`].
    pub env_vars: Vec<String>,
    pub env_var_format: EnvVarFormat,
    pub clean: bool,
}

impl ProvisionRequest {
    /// Validates `config` and applies defaults from the target's OS profile.
    pub fn from_config(config: &Config) -> Result<Self, SaltError> {
        let mut errors = Vec::new();
        let base_dir = config.base_dir.as_deref();

        let target_os = os::resolve(&config.target_os);
        let profile = target_os.profile();

        let states = select_content(
            Section::STATE,
            &config.state_files,
            config.state_tree.as_deref(),
            base_dir,
            &mut errors,
        );
        let pillar = select_content(
            Section::PILLAR,
            &config.pillar_files,
            config.pillar_tree.as_deref(),
            base_dir,
            &mut errors,
        );

        for raw in &config.environment_vars {
            if let Err(e) = env::parse_env_var(raw) {
                errors.push(validation_message(e));
            }
        }

        let env_var_format = match config.env_var_format.as_deref() {
            Some(template) => match EnvVarFormat::parse(template) {
                Ok(format) => Some(format),
                Err(e) => {
                    errors.push(validation_message(e));
                    None
                }
            },
            None => Some(EnvVarFormat::default()),
        };

        let (Some(Some(states)), Some(env_var_format), true) =
            (states, env_var_format, errors.is_empty())
        else {
            return Err(SaltError::InvalidConfig(errors));
        };

        Ok(Self {
            target_os,
            states,
            pillar: pillar.flatten(),
            remote_state_dir: or_default(
                config.remote_state_dir.as_deref(),
                profile.default_state_dir,
            ),
            remote_pillar_dir: or_default(
                config.remote_pillar_dir.as_deref(),
                profile.default_pillar_dir,
            ),
            env_vars: config.environment_vars.clone(),
            env_var_format,
            clean: config.clean,
        })
    }

    /// Returns the remote pillar directory when a pillar section is configured.
    pub fn pillar_dir(&self) -> Option<&str> {
        self.pillar.as_ref().map(|_| self.remote_pillar_dir.as_str())
    }
}

struct Section {
    files_key: &'static str,
    tree_key: &'static str,
    required: bool,
}

impl Section {
    const STATE: Self = Self {
        files_key: "state_files",
        tree_key: "state_tree",
        required: true,
    };
    const PILLAR: Self = Self {
        files_key: "pillar_files",
        tree_key: "pillar_tree",
        required: false,
    };
}

/// Applies the files-xor-tree rule to one section.
///
/// Returns `None` when the section is invalid (errors are pushed), and
/// `Some(None)` for an optional section that was left empty.
fn select_content(
    section: Section,
    files: &[Utf8PathBuf],
    tree: Option<&Utf8Path>,
    base_dir: Option<&Utf8Path>,
    errors: &mut Vec<String>,
) -> Option<Option<Content>> {
    let tree = tree.filter(|t| !t.as_str().trim().is_empty());

    match (files.is_empty(), tree) {
        (true, None) if section.required => {
            errors.push(format!(
                "{} or {} must be specified",
                section.files_key, section.tree_key
            ));
            None
        }
        (true, None) => Some(None),
        (false, Some(_)) => {
            errors.push(format!(
                "{} and {} are mutually exclusive, specify one, not both",
                section.files_key, section.tree_key
            ));
            None
        }
        (false, None) => {
            let before = errors.len();
            let files: Vec<ContentFile> = files
                .iter()
                .map(|declared| ContentFile::new(declared, base_dir))
                .collect();
            for file in &files {
                check_file(section.files_key, file, errors);
            }
            (errors.len() == before).then_some(Some(Content::Files(files)))
        }
        (true, Some(tree)) => {
            let local = match base_dir {
                Some(base) if tree.is_relative() => base.join(tree),
                _ => tree.to_path_buf(),
            };
            check_dir(section.tree_key, tree, &local, errors)
                .then_some(Some(Content::Tree(local)))
        }
    }
}

fn check_file(key: &str, file: &ContentFile, errors: &mut Vec<String>) {
    if file.relative.split('/').any(|segment| segment == "..") {
        errors.push(format!("{}: {} must not contain '..' components", key, file.relative));
        return;
    }
    match fs::metadata(&file.local) {
        Ok(metadata) if metadata.is_dir() => {
            errors.push(format!("{}: {} must point to a file", key, file.local));
        }
        Ok(_) => {}
        Err(e) => errors.push(format!(
            "{}: {} is invalid: {}",
            key,
            file.local,
            io_error_kind_message(&e)
        )),
    }
}

fn check_dir(key: &str, declared: &Utf8Path, local: &Utf8Path, errors: &mut Vec<String>) -> bool {
    match fs::metadata(local) {
        Ok(metadata) if metadata.is_dir() => true,
        Ok(_) => {
            errors.push(format!("{}: {} must point to a directory", key, declared));
            false
        }
        Err(e) => {
            errors.push(format!(
                "{}: {} is invalid: {}",
                key,
                declared,
                io_error_kind_message(&e)
            ));
            false
        }
    }
}

fn or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn validation_message(err: SaltError) -> String {
    match err {
        SaltError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
