use std::io;
use std::process::ExitCode;

use clap::CommandFactory;
use rssalt::cli::{self, Commands};
use rssalt::executor::LocalExecutor;
use tracing::error;

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_level = match &args.command {
        Commands::Apply(opts) => opts.log_level,
        Commands::Validate(opts) => opts.log_level,
        Commands::Completions(opts) => {
            let mut cmd = cli::Cli::command();
            clap_complete::generate(opts.shell, &mut cmd, env!("CARGO_PKG_NAME"), &mut io::stdout());
            return ExitCode::SUCCESS;
        }
    };

    if let Err(e) = rssalt::init_logging(log_level) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match &args.command {
        Commands::Apply(opts) => {
            let executor = LocalExecutor::new(opts.dry_run);
            rssalt::run_apply(opts, &executor)
        }
        Commands::Validate(opts) => rssalt::run_validate(opts),
        Commands::Completions(_) => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
