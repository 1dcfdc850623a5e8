//! Contrato del calculador externo de energías.

use std::collections::BTreeMap;

use potfit_domain::Structure;
use serde::{Deserialize, Serialize};

use crate::errors::CalculatorError;

/// Ajustes opacos que el runner reenvía al calculador sin interpretarlos
/// (memoria, hilos, programa...). `BTreeMap` para un orden estable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalcSettings {
    pub values: BTreeMap<String, String>,
}

impl CalcSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parsea pares `clave=valor`.
    pub fn parse_pair(pair: &str) -> Option<(String, String)> {
        let (k, v) = pair.split_once('=')?;
        let k = k.trim();
        if k.is_empty() {
            return None;
        }
        Some((k.to_string(), v.trim().to_string()))
    }
}

/// Calcula la energía (Hartree) de `fragment_indices` dentro de `structure`.
///
/// Con `counterpoise = true` el cálculo se hace en la base del complejo
/// completo. Un `CalculatorError::Computation` es terminal para la fila; un
/// `CalculatorError::Infrastructure` detiene la corrida.
pub trait Calculator {
    fn compute(&self,
               structure: &Structure,
               fragment_indices: &[usize],
               method_basis: &str,
               counterpoise: bool,
               settings: &CalcSettings)
               -> Result<f64, CalculatorError>;
}

impl<C: Calculator + ?Sized> Calculator for &C {
    fn compute(&self,
               structure: &Structure,
               fragment_indices: &[usize],
               method_basis: &str,
               counterpoise: bool,
               settings: &CalcSettings)
               -> Result<f64, CalculatorError> {
        (**self).compute(structure, fragment_indices, method_basis, counterpoise, settings)
    }
}
