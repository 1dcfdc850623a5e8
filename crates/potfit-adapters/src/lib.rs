//! potfit-adapters: implementaciones concretas del trait `Calculator`.
//!
//! - `CommandCalculator`: delega cada cálculo a un programa externo con un
//!   protocolo JSON por stdin.
//! - `TableCalculator`: energías fijas por (estructura, fragmentos), para
//!   demos y tests.

pub mod command;
pub mod table;

pub use command::{CalculationRequest, CommandCalculator};
pub use table::TableCalculator;
