use std::io::Write;

use potfit_core::RecordStore;

use crate::cli::StatusArgs;
use crate::error::Result;

pub fn run(args: StatusArgs) -> Result<()> {
    let store = super::open_store()?;
    execute(&store, &args, &mut std::io::stdout())
}

pub fn execute<S, W>(store: &S, args: &StatusArgs, out: &mut W) -> Result<()>
    where S: RecordStore,
          W: Write
{
    let counts = store.status_counts(args.client.as_deref())?;
    if let Some(client) = &args.client {
        writeln!(out, "client: {client}")?;
    }
    writeln!(out, "pending:  {:>10}", counts.pending)?;
    writeln!(out, "running:  {:>10}", counts.running)?;
    writeln!(out, "complete: {:>10}", counts.complete)?;
    writeln!(out, "failed:   {:>10}", counts.failed)?;
    writeln!(out, "total:    {:>10}", counts.total())?;
    Ok(())
}
