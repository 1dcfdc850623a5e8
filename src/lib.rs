//! potfit
//!
//! Cola persistente de cálculos de energía (química cuántica) y runner de
//! lotes para generar datos de ajuste de potenciales.
//!
//! Este crate agrupa los crates del workspace:
//! - `domain`: estructuras, claves de cálculo, estados, unidades.
//! - `engine` (`potfit-core`): `RecordStore`, selector, `BatchRunner`, recuperación, export.
//! - `persistence`: backend Postgres (Diesel).
//! - `adapters`: calculadores concretos.

pub use potfit_adapters as adapters;
pub use potfit_core as engine;
pub use potfit_domain as domain;
pub use potfit_persistence as persistence;

pub use potfit_core::{recover_stuck_calculations, BatchRunner, CalcSettings, Calculator, CalculatorError, CoreError,
                      InMemoryRecordStore, NewCalculation, RecordStore, RunSummary, RunnerConfig, StoreError};
pub use potfit_domain::{Atom, CalcStatus, Fragment, Structure};
