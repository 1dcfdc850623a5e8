mod cli;
mod commands;
mod error;
mod logging;
mod progress;

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};

use crate::cli::{Cli, Commands};
use crate::error::Result;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    match run_app(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_app(cli: Cli) -> Result<()> {
    potfit_persistence::init_dotenv();
    info!("potfit v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    match cli.command {
        Commands::Add(args) => commands::add::run(args),
        Commands::Fill(args) => commands::fill::run(args),
        Commands::Clean => commands::clean::run(),
        Commands::Status(args) => commands::status::run(args),
        Commands::TrainingSet(command) => commands::training::run(command),
    }
}
