//! Provisioning orchestrator.
//!
//! A run moves through the following stages, strictly in order:
//!
//! 1. **WorkspacePrepared**: state/pillar trees uploaded, or empty remote
//!    directories created for discrete files
//! 2. **ContentUploaded**: discrete state files, then pillar files, uploaded
//! 3. **Applied**: `salt-call state.apply` once per state file, or once for
//!    the whole tree (highstate)
//! 4. **CleanedUp**: remote directories removed, only when `clean` is set
//!
//! The first error moves the run to `Failed` and stops it. Nothing is rolled
//! back and nothing is retried.

use std::collections::HashMap;

use anyhow::{Context, Result};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::state_name;
use crate::config::Config;
use crate::env;
use crate::error::SaltError;
use crate::executor::RemoteExecutor;
use crate::remote::RemoteShell;
use crate::request::{Content, ProvisionRequest};
use crate::ui::Ui;
use crate::upload::Uploader;

/// Opaque values handed over by the host build; never interpreted here.
pub type GeneratedData = HashMap<String, serde_yaml::Value>;

/// Progress of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    Idle,
    WorkspacePrepared,
    ContentUploaded,
    Applied,
    CleanedUp,
    Done,
    Failed,
}

/// Salt masterless provisioner.
///
/// [`prepare`](Self::prepare) validates a configuration once;
/// [`provision`](Self::provision) may then be called for each target.
#[derive(Debug, Default)]
pub struct Provisioner {
    request: Option<ProvisionRequest>,
}

impl Provisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and defaults `config`.
    ///
    /// On error, every configuration problem is reported together and the
    /// previously prepared request (if any) is discarded.
    pub fn prepare(&mut self, config: &Config) -> Result<(), SaltError> {
        self.request = None;
        let request = ProvisionRequest::from_config(config)?;
        debug!("prepared request: {:?}", request);
        self.request = Some(request);
        Ok(())
    }

    /// Returns the validated request, if [`prepare`](Self::prepare) succeeded.
    pub fn request(&self) -> Option<&ProvisionRequest> {
        self.request.as_ref()
    }

    /// Runs the provisioning sequence against one target.
    ///
    /// `cancel` is checked before every remote operation; once it is
    /// cancelled no further commands are issued.
    pub fn provision(
        &self,
        cancel: &CancellationToken,
        ui: &dyn Ui,
        executor: &dyn RemoteExecutor,
        generated_data: &GeneratedData,
    ) -> Result<()> {
        let request = self.request.as_ref().ok_or_else(|| {
            SaltError::Validation("provision called before a successful prepare".to_string())
        })?;

        ui.say("Provisioning with Salt...");
        debug!(
            target_os = %request.target_os,
            "received {} generated data value(s)",
            generated_data.len()
        );

        let shell = RemoteShell::new(executor, ui, cancel, request.target_os);
        let mut run = Run {
            request,
            shell: &shell,
            uploader: Uploader::new(&shell),
            stage: Stage::Idle,
        };

        match run.execute() {
            Ok(()) => {
                run.advance(Stage::Done);
                info!("provisioning completed successfully");
                Ok(())
            }
            Err(e) => {
                debug!("stage {} failed: {:#}", run.stage, e);
                run.advance(Stage::Failed);
                Err(e)
            }
        }
    }
}

/// State of one provisioning run.
struct Run<'a> {
    request: &'a ProvisionRequest,
    shell: &'a RemoteShell<'a>,
    uploader: Uploader<'a>,
    stage: Stage,
}

impl Run<'_> {
    fn advance(&mut self, next: Stage) {
        debug!("stage: {} -> {}", self.stage, next);
        self.stage = next;
    }

    fn execute(&mut self) -> Result<()> {
        self.prepare_workspace()?;
        self.advance(Stage::WorkspacePrepared);

        self.upload_content()?;
        self.advance(Stage::ContentUploaded);

        self.apply()?;
        self.advance(Stage::Applied);

        if self.request.clean {
            self.clean_up();
            self.advance(Stage::CleanedUp);
        }
        Ok(())
    }

    fn prepare_workspace(&self) -> Result<()> {
        let request = self.request;
        let ui = self.shell.ui();

        match &request.states {
            Content::Tree(tree) => {
                ui.message("Uploading Salt state tree...");
                self.uploader
                    .upload_tree(&request.remote_state_dir, tree)
                    .context("failed to upload state tree")?;
            }
            Content::Files(_) => {
                ui.message("Creating Salt state directory...");
                self.shell
                    .create_dir(&request.remote_state_dir)
                    .context("failed to create state directory")?;
            }
        }

        match &request.pillar {
            Some(Content::Tree(tree)) => {
                ui.message("Uploading Salt pillar tree...");
                self.uploader
                    .upload_tree(&request.remote_pillar_dir, tree)
                    .context("failed to upload pillar tree")?;
            }
            Some(Content::Files(_)) => {
                ui.message("Creating Salt pillar directory...");
                self.shell
                    .create_dir(&request.remote_pillar_dir)
                    .context("failed to create pillar directory")?;
            }
            None => {}
        }
        Ok(())
    }

    fn upload_content(&self) -> Result<()> {
        let request = self.request;

        if let Content::Files(files) = &request.states {
            for file in files {
                self.uploader
                    .upload_file(&request.remote_state_dir, file)
                    .context("failed to upload state file")?;
            }
        }
        if let Some(Content::Files(files)) = &request.pillar {
            for file in files {
                self.uploader
                    .upload_file(&request.remote_pillar_dir, file)
                    .context("failed to upload pillar file")?;
            }
        }
        Ok(())
    }

    fn apply(&self) -> Result<()> {
        let request = self.request;
        let env = env::encode(&request.env_vars, &request.env_var_format)?;
        let pillar_dir = request.pillar_dir();

        match &request.states {
            Content::Files(files) => {
                for (index, file) in files.iter().enumerate() {
                    let state = state_name(&file.relative);
                    info!("applying state {}/{}: {}", index + 1, files.len(), state);
                    self.shell
                        .apply_state(&env.encoded, &request.remote_state_dir, pillar_dir, &state)
                        .with_context(|| format!("failed to apply state {}", state))?;
                }
            }
            Content::Tree(_) => {
                info!("applying highstate");
                self.shell
                    .apply_state(&env.encoded, &request.remote_state_dir, pillar_dir, "")
                    .context("failed to apply highstate")?;
            }
        }
        Ok(())
    }

    /// Removes the state and pillar directories independently; failures are
    /// reported and otherwise ignored.
    fn clean_up(&self) {
        let request = self.request;
        let ui = self.shell.ui();
        ui.message("Removing Salt directories...");

        let dirs = std::iter::once(request.remote_state_dir.as_str()).chain(request.pillar_dir());
        for dir in dirs {
            if let Err(e) = self.shell.remove_dir(dir) {
                warn!("cleanup of {} failed: {:#}", dir, e);
                ui.message(&format!("Warning: {:#}", e));
            }
        }
    }
}
