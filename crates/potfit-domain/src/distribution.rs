//! Funciones de distribución usadas para generar configuraciones.
//!
//! Cada variante es una función pura de sus parámetros: `evaluate(x)` no
//! depende de estado mutable compartido. `RandomSampled` deriva su muestra de
//! una semilla fija combinada con `x`, de modo que la misma entrada produce
//! siempre la misma salida.

use crate::DomainError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DistributionFunction {
    Linear { intercept: f64, slope: f64 },
    Geometric { coefficient: f64, base: f64 },
    Logarithmic { min_val: f64, max_val: f64, min_x: f64, max_x: f64 },
    Constant(f64),
    Piecewise { functions: Vec<DistributionFunction>, cutoffs: Vec<f64> },
    RandomSampled { function: Box<DistributionFunction>, min: f64, max: f64, seed: u64 },
}

impl DistributionFunction {
    /// Recta que pasa por `(x1, y1)` y `(x2, y2)`.
    pub fn linear_from_two_points(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, DomainError> {
        if x1 == x2 {
            return Err(DomainError::ValidationError("linear function needs two distinct x values".to_string()));
        }
        let slope = (y2 - y1) / (x2 - x1);
        Ok(DistributionFunction::Linear { intercept: y1 - slope * x1, slope })
    }

    pub fn logarithmic(min_val: f64, max_val: f64, min_x: f64, max_x: f64) -> Result<Self, DomainError> {
        if min_val <= 0.0 || max_val <= 0.0 {
            return Err(DomainError::ValidationError("logarithmic bounds must be positive".to_string()));
        }
        if min_x == max_x {
            return Err(DomainError::ValidationError("logarithmic x range must not be empty".to_string()));
        }
        Ok(DistributionFunction::Logarithmic { min_val, max_val, min_x, max_x })
    }

    /// `functions[i]` aplica para `x < cutoffs[i]`; la última función cubre el
    /// resto, por lo que se exige `functions.len() == cutoffs.len() + 1`.
    pub fn piecewise(functions: Vec<DistributionFunction>, cutoffs: Vec<f64>) -> Result<Self, DomainError> {
        if functions.len() != cutoffs.len() + 1 {
            return Err(DomainError::ValidationError(format!("piecewise needs {} functions for {} cutoffs, got {}",
                                                            cutoffs.len() + 1,
                                                            cutoffs.len(),
                                                            functions.len())));
        }
        Ok(DistributionFunction::Piecewise { functions, cutoffs })
    }

    pub fn random_sampled(function: DistributionFunction, min: f64, max: f64, seed: u64) -> Result<Self, DomainError> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(DomainError::ValidationError(format!("invalid sampling range [{min}, {max}]")));
        }
        Ok(DistributionFunction::RandomSampled { function: Box::new(function), min, max, seed })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            DistributionFunction::Linear { intercept, slope } => intercept + x * slope,
            DistributionFunction::Geometric { coefficient, base } => coefficient * base.powf(x),
            DistributionFunction::Logarithmic { min_val, max_val, min_x, max_x } => {
                let dx = (max_val.ln() - min_val.ln()) / (max_x - min_x);
                (min_val.ln() + (x - min_x) * dx).exp()
            }
            DistributionFunction::Constant(v) => *v,
            DistributionFunction::Piecewise { functions, cutoffs } => {
                for (function, cutoff) in functions.iter().zip(cutoffs) {
                    if x < *cutoff {
                        return function.evaluate(x);
                    }
                }
                functions.last().map(|f| f.evaluate(x)).unwrap_or(f64::NAN)
            }
            DistributionFunction::RandomSampled { function, min, max, seed } => {
                let mut rng = StdRng::seed_from_u64(seed ^ x.to_bits());
                function.evaluate(rng.random_range(*min..=*max))
            }
        }
    }
}
