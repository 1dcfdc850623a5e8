use std::io::Write;

use potfit_core::{recover_stuck_calculations, RecordStore};

use crate::error::Result;

pub fn run() -> Result<()> {
    let store = super::open_store()?;
    execute(&store, &mut std::io::stdout())
}

/// Ejecutar sólo con todos los runners detenidos: también devuelve a
/// `pending` las filas que un runner vivo tenga reclamadas.
pub fn execute<S, W>(store: &S, out: &mut W) -> Result<()>
    where S: RecordStore,
          W: Write
{
    let reset = recover_stuck_calculations(store)?;
    writeln!(out, "reset {reset} running calculations to pending")?;
    Ok(())
}
