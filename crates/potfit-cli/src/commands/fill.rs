use std::io::{IsTerminal, Write};
use std::time::Duration;

use potfit_adapters::CommandCalculator;
use potfit_core::{BatchRunner, Calculator, CounterPrinter, NoProgress, RecordStore, RunSummary, RunnerConfig};
use tracing::{info, warn};

use crate::cli::FillArgs;
use crate::error::Result;
use crate::progress::{BarProgress, ProgressMode};

pub fn run(args: FillArgs) -> Result<()> {
    let store = super::open_store()?;
    let calculator = CommandCalculator::new(&args.calculator).with_args(args.calculator_args.iter().cloned())
                                                             .with_timeout(args.timeout.map(Duration::from_secs));
    info!("Using calculator program '{}'.", args.calculator.display());
    let summary = execute(&store, &calculator, &args, &mut std::io::stdout())?;
    if summary.failed > 0 {
        warn!("{} calculations failed; see the log column of failed rows.", summary.failed);
    }
    Ok(())
}

pub fn execute<S, C, W>(store: &S, calculator: &C, args: &FillArgs, out: &mut W) -> Result<RunSummary>
    where S: RecordStore,
          C: Calculator,
          W: Write
{
    let mut runner = BatchRunner::new(store, calculator).with_settings(args.calc_settings())
                                                        .with_config(RunnerConfig { batch_size: args.batch_size,
                                                                                    ..RunnerConfig::default() });
    let result = match ProgressMode::select(args.no_progress, std::io::stderr().is_terminal()) {
        ProgressMode::Off => runner.run(&args.client, args.count, &mut NoProgress),
        ProgressMode::Bar => {
            let mut bar = BarProgress::new(args.count);
            let result = runner.run(&args.client, args.count, &mut bar);
            bar.finish();
            result
        }
        ProgressMode::Counter => {
            let mut printer = CounterPrinter::new(std::io::stderr());
            let result = runner.run(&args.client, args.count, &mut printer);
            printer.finish();
            result
        }
    };
    let summary = result?;

    if summary.is_no_work() {
        writeln!(out, "no pending calculations for client '{}'", args.client)?;
    } else {
        writeln!(out,
                 "client '{}': {} calculations ({} complete, {} failed) in {} commits",
                 args.client, summary.attempted, summary.completed, summary.failed, summary.flushes)?;
        if summary.claims_lost() > 0 {
            writeln!(out, "{} rows were claimed by another process first", summary.claims_lost())?;
        }
    }
    Ok(summary)
}
