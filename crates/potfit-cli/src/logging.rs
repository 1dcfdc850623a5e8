use std::fs::File;
use std::path::PathBuf;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::{CliError, Result};

pub fn level_for(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Instala el subscriber global. Los registros `log` de las librerías
/// entran por el puente `tracing-log`.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr)
                                   .with_target(false)
                                   .compact();

    let subscriber = tracing_subscriber::registry().with(level_for(verbosity, quiet))
                                                   .with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(&path).map_err(CliError::Io)?;
        let file_layer = fmt::layer().with_writer(file)
                                     .with_ansi(false)
                                     .with_thread_ids(true)
                                     .with_target(true);
        subscriber.with(file_layer)
                  .try_init()
                  .map_err(|e| CliError::Argument(format!("logger already installed: {e}")))?;
    } else {
        subscriber.try_init()
                  .map_err(|e| CliError::Argument(format!("logger already installed: {e}")))?;
    }
    Ok(())
}
