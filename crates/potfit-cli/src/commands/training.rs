use std::io::Write;

use potfit_core::training::{write_1b_training_set_to_path, write_2b_training_set_to_path, TrainingQuery};
use potfit_core::RecordStore;
use tracing::info;

use crate::cli::{EnergyQueryArgs, TrainingSetCommand};
use crate::error::{CliError, Result};

impl From<&EnergyQueryArgs> for TrainingQuery {
    fn from(args: &EnergyQueryArgs) -> Self {
        TrainingQuery { method: args.method.clone(),
                        basis: args.basis.clone(),
                        counterpoise: args.counterpoise,
                        tag: args.tag.clone() }
    }
}

pub fn run(command: TrainingSetCommand) -> Result<()> {
    let store = super::open_store()?;
    execute(&store, &command, &mut std::io::stdout())
}

pub fn execute<S, W>(store: &S, command: &TrainingSetCommand, out: &mut W) -> Result<()>
    where S: RecordStore,
          W: Write
{
    match command {
        TrainingSetCommand::OneBody { molecule, output, query } => {
            let written = write_1b_training_set_to_path(store, molecule, &query.into(), output)?;
            info!("Wrote 1-body training set for '{}' to {}.", molecule, output.display());
            writeln!(out, "{written} configurations written to {}", output.display())?;
        }
        TrainingSetCommand::TwoBody { monomers, output, query } => {
            let [monomer_1, monomer_2] = monomers.as_slice() else {
                return Err(CliError::Argument("--monomers takes exactly two names".into()));
            };
            let written = write_2b_training_set_to_path(store, monomer_1, monomer_2, &query.into(), output)?;
            info!("Wrote 2-body training set for '{}-{}' to {}.", monomer_1, monomer_2, output.display());
            writeln!(out, "{written} configurations written to {}", output.display())?;
        }
    }
    Ok(())
}
