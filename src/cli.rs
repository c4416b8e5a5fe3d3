use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload Salt states and run salt-call against the target
    Apply(ApplyArgs),

    /// Validate the given YAML configuration
    Validate(ValidateArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the YAML file defining the provisioner configuration
    #[arg(short, long, default_value = "salt.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Do not run, just show what would be done
    #[arg(long)]
    pub dry_run: bool,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the YAML file to validate
    #[arg(short, long, default_value = "salt.yaml")]
    pub file: Utf8PathBuf,

    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Verbosity of the `tracing` output.
///
/// `--log-level debug` also shows every rendered remote command.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
