pub mod cli;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod os;
pub mod provisioner;
pub mod remote;
pub mod request;
pub mod ui;
pub mod upload;

pub use error::SaltError;

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

use crate::executor::RemoteExecutor;
use crate::provisioner::{GeneratedData, Provisioner};
use crate::ui::TracingUi;

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}

/// Loads and prepares the provisioner described by `file`.
fn load_provisioner(file: &camino::Utf8Path) -> Result<Provisioner> {
    let config = config::load_config(file)
        .with_context(|| format!("failed to load configuration from {}", file))?;
    let mut provisioner = Provisioner::new();
    provisioner
        .prepare(&config)
        .context("configuration validation failed")?;
    Ok(provisioner)
}

/// Cancels `token` once `seconds` have elapsed.
///
/// The watchdog thread is detached; it outlives the run only until the
/// deadline.
fn spawn_deadline(token: CancellationToken, seconds: u64) {
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(seconds));
        if !token.is_cancelled() {
            warn!("timeout of {}s reached, cancelling provisioning", seconds);
            token.cancel();
        }
    });
}

pub fn run_apply(opts: &cli::ApplyArgs, executor: &dyn RemoteExecutor) -> Result<()> {
    let provisioner = load_provisioner(&opts.file)?;

    let cancel = CancellationToken::new();
    if let Some(seconds) = opts.timeout {
        spawn_deadline(cancel.clone(), seconds);
    }

    let result = provisioner.provision(&cancel, &TracingUi, executor, &GeneratedData::new());
    cancel.cancel();
    result
}

pub fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let provisioner = load_provisioner(&opts.file)?;
    info!("validation successful:\n{:#?}", provisioner.request());
    Ok(())
}
