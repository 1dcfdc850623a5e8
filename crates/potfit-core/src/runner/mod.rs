//! Runner de lotes: reclama filas pendientes, invoca al calculador y escribe
//! los resultados al store en lotes de tamaño fijo.

pub mod batch;
pub mod progress;
pub mod state;

pub use batch::{BatchRunner, RunnerConfig};
pub use progress::{CounterPrinter, NoProgress, ProgressSink};
pub use state::{RunSummary, RunnerState};
