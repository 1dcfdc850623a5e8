//! potfit-core: cola persistente de cálculos y runner de commits por lotes.
//!
//! - `store`: contrato `RecordStore` y backend en memoria.
//! - `selector`: secuencia perezosa de filas pendientes por cliente.
//! - `calculator`: contrato del calculador externo.
//! - `runner`: máquina de estados `BatchRunner` y sumideros de progreso.
//! - `recovery`: reset `running -> pending` tras una caída.
//! - `training`: exportación de energías a archivos de ajuste.
pub mod calculator;
pub mod constants;
pub mod errors;
pub mod recovery;
pub mod runner;
pub mod selector;
pub mod store;
pub mod training;

pub use calculator::{CalcSettings, Calculator};
pub use errors::{CalculatorError, CoreError, StoreError};
pub use recovery::recover_stuck_calculations;
pub use runner::{BatchRunner, CounterPrinter, NoProgress, ProgressSink, RunSummary, RunnerConfig, RunnerState};
pub use selector::PendingSelector;
pub use store::{CalculationOutcome, EnergyFilter, FragmentEnergy, InMemoryRecordStore, NewCalculation, PendingCalculation,
                RecordStore, StatusCounts, StructureEnergies};
