//! Errores del core: store, calculador y runner.

use potfit_domain::{CalcStatus, DomainError};
use thiserror::Error;

/// Fallos del store de registros. Todos son fatales para la corrida en curso.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("calculation {0} not found")]
    NotFound(i64),
    #[error("invalid transition for calculation {id}: {from} -> {to}")]
    InvalidTransition { id: i64, from: CalcStatus, to: CalcStatus },
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Resultado fallido de `Calculator::compute`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalculatorError {
    /// El cálculo de esta fila falló (no convergió, salida ilegible,
    /// timeout...). Se registra como `failed`; la corrida continúa.
    #[error("computation failed: {0}")]
    Computation(String),
    /// El adaptador no puede operar en absoluto (p. ej. no existe el
    /// programa). Termina la corrida.
    #[error("calculator infrastructure failure: {0}")]
    Infrastructure(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("calculator unavailable: {0}")]
    Calculator(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("no calculated energies for '{0}'")]
    NoEnergies(String),
    #[error("no optimized energy for '{0}'")]
    NoOptimizedEnergy(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
