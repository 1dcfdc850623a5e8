//! Calculador de tabla: energías fijas indexadas por identidad de
//! estructura, fragmentos y flag counterpoise.

use std::collections::HashMap;

use potfit_core::{CalcSettings, Calculator, CalculatorError};
use potfit_domain::Structure;

type TableKey = (String, Vec<usize>, bool);

#[derive(Debug, Clone, Default)]
pub struct TableCalculator {
    energies: HashMap<TableKey, f64>,
    failures: HashMap<TableKey, String>,
}

impl TableCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_energy(mut self, structure: &Structure, fragment_indices: &[usize], counterpoise: bool, energy: f64) -> Self {
        self.energies.insert(key(structure, fragment_indices, counterpoise), energy);
        self
    }

    /// Registra un fallo de cálculo para la combinación dada.
    pub fn with_failure(mut self,
                        structure: &Structure,
                        fragment_indices: &[usize],
                        counterpoise: bool,
                        message: impl Into<String>)
                        -> Self {
        self.failures.insert(key(structure, fragment_indices, counterpoise), message.into());
        self
    }
}

fn key(structure: &Structure, fragment_indices: &[usize], counterpoise: bool) -> TableKey {
    let mut indices = fragment_indices.to_vec();
    indices.sort_unstable();
    (structure.identity(), indices, counterpoise)
}

impl Calculator for TableCalculator {
    fn compute(&self,
               structure: &Structure,
               fragment_indices: &[usize],
               method_basis: &str,
               counterpoise: bool,
               _settings: &CalcSettings)
               -> Result<f64, CalculatorError> {
        let k = key(structure, fragment_indices, counterpoise);
        if let Some(msg) = self.failures.get(&k) {
            return Err(CalculatorError::Computation(msg.clone()));
        }
        self.energies.get(&k).copied().ok_or_else(|| {
                                          CalculatorError::Computation(format!("no tabulated energy for {} {fragment_indices:?} {method_basis}",
                                                                               structure.name()))
                                      })
    }
}
