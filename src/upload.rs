//! Content upload.
//!
//! Local paths follow the host's conventions, remote paths are always
//! `/`-delimited. [`remote_join`] is the only place the two meet.

use std::fs::File;
use std::path::MAIN_SEPARATOR;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::SaltError;
use crate::remote::RemoteShell;
use crate::request::{ContentFile, normalize_relative};

/// Joins a relative path onto a remote base using `/` only.
///
/// Backslashes in either argument are treated as separators, so a path
/// declared on a Windows host lands correctly on a Linux target and the
/// other way round.
pub fn remote_join(base: &str, relative: &str) -> String {
    let base = base.replace('\\', "/");
    let base = base.trim_end_matches('/');
    let relative = normalize_relative(relative);
    if relative.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    format!("{}/{}", base, relative)
}

/// Returns the `/`-delimited parent of a normalized relative path, or `""`.
fn relative_parent(relative: &str) -> &str {
    relative.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Absolute form of a local path, for display only.
fn display_path(local: &Utf8Path) -> Utf8PathBuf {
    std::path::absolute(local)
        .ok()
        .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
        .unwrap_or_else(|| local.to_path_buf())
}

/// Cancellation is reported as-is; everything else becomes an upload error
/// naming `path`.
fn upload_error(path: &Utf8Path, err: anyhow::Error) -> anyhow::Error {
    if matches!(err.downcast_ref::<SaltError>(), Some(SaltError::Cancelled(_))) {
        return err;
    }
    SaltError::upload(path.as_str(), &err).into()
}

/// Places local content under remote directories.
pub struct Uploader<'a> {
    shell: &'a RemoteShell<'a>,
}

impl<'a> Uploader<'a> {
    pub fn new(shell: &'a RemoteShell<'a>) -> Self {
        Self { shell }
    }

    /// Uploads the contents of `local_dir` into `remote_base`.
    ///
    /// `remote_base` is created first. A trailing separator is appended to
    /// `local_dir` so the directory's contents, not the directory itself,
    /// land in `remote_base`.
    pub fn upload_tree(&self, remote_base: &str, local_dir: &Utf8Path) -> Result<()> {
        self.shell
            .ui()
            .message(&format!("Uploading directory: {}", display_path(local_dir)));

        let mut source = local_dir.as_str().to_string();
        if !source.ends_with('/') && !source.ends_with(MAIN_SEPARATOR) {
            source.push(MAIN_SEPARATOR);
        }

        self.shell
            .create_dir(remote_base)
            .and_then(|()| self.shell.upload_dir(remote_base, &source))
            .map_err(|e| upload_error(local_dir, e))
    }

    /// Uploads one file to `remote_base` joined with its relative path,
    /// creating the remote parent directory first.
    pub fn upload_file(&self, remote_base: &str, file: &ContentFile) -> Result<()> {
        let local = display_path(&file.local);
        self.shell.ui().message(&format!("Uploading file: {}", local));

        let remote_dir = remote_join(remote_base, relative_parent(&file.relative));
        let remote_file = remote_join(remote_base, &file.relative);
        debug!("uploading {} to {}", local, remote_file);

        self.shell
            .create_dir(&remote_dir)
            .and_then(|()| {
                let mut source = File::open(&file.local)
                    .map_err(|e| SaltError::io(format!("failed to open {}", local), e))?;
                self.shell
                    .upload_file(&remote_file, &mut source)
                    .with_context(|| format!("failed to transfer to {}", remote_file))
            })
            .map_err(|e| upload_error(&local, e))
    }
}
