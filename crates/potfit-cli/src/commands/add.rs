use std::fs;
use std::io::Write;
use std::path::Path;

use potfit_core::{NewCalculation, RecordStore};
use potfit_domain::Structure;
use tracing::info;

use crate::cli::AddArgs;
use crate::error::{CliError, Result};

/// Lee un arreglo JSON de estructuras y las vuelve a validar.
pub fn load_structures(path: &Path) -> Result<Vec<Structure>> {
    let text = fs::read_to_string(path)?;
    let raw: Vec<Structure> = serde_json::from_str(&text).map_err(|source| CliError::FileParsing { path: path.to_path_buf(),
                                                                                                    source })?;
    raw.into_iter()
       .map(|s| Structure::new(s.name(), s.fragments().to_vec(), s.is_optimized()).map_err(CliError::from))
       .collect()
}

pub fn run(args: AddArgs) -> Result<()> {
    let store = super::open_store()?;
    execute(&store, &args, &mut std::io::stdout())
}

pub fn execute<S, W>(store: &S, args: &AddArgs, out: &mut W) -> Result<()>
    where S: RecordStore,
          W: Write
{
    let structures = load_structures(&args.structures)?;
    let calculations: Vec<NewCalculation> = structures.iter()
                                                      .flat_map(|s| {
                                                          NewCalculation::standard_set(s,
                                                                                       &args.method,
                                                                                       &args.basis,
                                                                                       args.counterpoise,
                                                                                       &args.tag,
                                                                                       &args.client)
                                                      })
                                                      .collect();
    let inserted = store.add_calculations(&calculations)?;
    info!("Queued {} of {} calculations for {} structures.", inserted, calculations.len(), structures.len());
    writeln!(out,
             "queued {inserted} new calculations ({} already present)",
             calculations.len() - inserted)?;
    Ok(())
}
