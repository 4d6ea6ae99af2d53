use std::process::ExitCode;

use clap::Parser;

use ghwt::commands::create::CreateArgs;
use ghwt::error::{ErrorClass, ExitError};
use ghwt::telemetry::{self, LogFormat, Verbosity};

#[derive(Debug, Parser)]
#[command(
    name = "ghwt",
    version,
    about = "Create a git worktree from a GitHub issue or pull request"
)]
struct Cli {
    #[command(flatten)]
    create: CreateArgs,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,
    /// Log output format (stderr)
    #[arg(long, env = "GHWT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(Verbosity::from_flags(cli.verbose, cli.quiet), cli.log_format);

    let _span = tracing::info_span!("command", name = "create").entered();

    match cli.create.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<ExitError>() {
                if exit_err.class() == ErrorClass::UserCancelled {
                    eprintln!("{exit_err}");
                } else {
                    eprintln!("error: {exit_err}");
                }
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
