// calculation.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Estado persistido de un cálculo.
///
/// Las transiciones válidas son:
/// - `Pending` -> `Running` (claim por un cliente)
/// - `Running` -> `Complete` (con energía)
/// - `Running` -> `Failed` (sin energía)
/// - `Running` -> `Pending` (sólo vía procedimiento de recuperación)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalcStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl CalcStatus {
    /// Representación estable (minúsculas) usada en la columna `status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CalcStatus::Pending => "pending",
            CalcStatus::Running => "running",
            CalcStatus::Complete => "complete",
            CalcStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CalcStatus::Complete | CalcStatus::Failed)
    }

    pub fn can_transition_to(&self, next: CalcStatus) -> bool {
        matches!((self, next),
                 (CalcStatus::Pending, CalcStatus::Running)
                 | (CalcStatus::Running, CalcStatus::Complete)
                 | (CalcStatus::Running, CalcStatus::Failed)
                 | (CalcStatus::Running, CalcStatus::Pending))
    }
}

impl FromStr for CalcStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CalcStatus::Pending),
            "running" => Ok(CalcStatus::Running),
            "complete" => Ok(CalcStatus::Complete),
            "failed" => Ok(CalcStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CalcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifica un cálculo lógico: estructura + fragmentos + método/base + cp.
///
/// Los índices de fragmento se normalizan (ordenados, sin duplicados) para
/// que `[1, 0]` y `[0, 1]` representen el mismo cálculo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalculationKey {
    pub structure_id: String,
    pub method: String,
    pub basis: String,
    pub counterpoise: bool,
    pub fragment_indices: Vec<usize>,
}

impl CalculationKey {
    pub fn new(structure_id: impl Into<String>,
               method: impl Into<String>,
               basis: impl Into<String>,
               counterpoise: bool,
               fragment_indices: &[usize])
               -> Result<Self, DomainError> {
        let method = method.into();
        let basis = basis.into();
        if method.trim().is_empty() || basis.trim().is_empty() {
            return Err(DomainError::ValidationError("method and basis must not be empty".to_string()));
        }
        if fragment_indices.is_empty() {
            return Err(DomainError::ValidationError("a calculation needs at least one fragment index".to_string()));
        }
        let mut fragment_indices = fragment_indices.to_vec();
        fragment_indices.sort_unstable();
        fragment_indices.dedup();
        Ok(CalculationKey { structure_id: structure_id.into(),
                            method,
                            basis,
                            counterpoise,
                            fragment_indices })
    }

    /// Cadena `método/base` que recibe el calculador externo.
    pub fn method_basis(&self) -> String {
        format!("{}/{}", self.method, self.basis)
    }
}

/// Una fila de trabajo del store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRecord {
    pub id: i64,
    pub key: CalculationKey,
    pub tag: String,
    pub client: String,
    pub status: CalcStatus,
    /// Energía en Hartree; sólo presente en filas `Complete`.
    pub energy: Option<f64>,
    /// Diagnóstico del cálculo (mensaje de error en filas `Failed`).
    pub log: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_column_text() {
        for s in [CalcStatus::Pending, CalcStatus::Running, CalcStatus::Complete, CalcStatus::Failed] {
            assert_eq!(s.as_str().parse::<CalcStatus>().unwrap(), s);
        }
        assert_eq!("done".parse::<CalcStatus>(), Err(DomainError::UnknownStatus("done".into())));
    }

    #[test]
    fn transitions_follow_lifecycle() {
        assert!(CalcStatus::Pending.can_transition_to(CalcStatus::Running));
        assert!(CalcStatus::Running.can_transition_to(CalcStatus::Failed));
        assert!(CalcStatus::Running.can_transition_to(CalcStatus::Pending));
        assert!(!CalcStatus::Pending.can_transition_to(CalcStatus::Complete));
        assert!(!CalcStatus::Complete.can_transition_to(CalcStatus::Pending));
        assert!(CalcStatus::Failed.is_terminal());
    }

    #[test]
    fn key_normalizes_fragment_indices() {
        let a = CalculationKey::new("s", "HF", "STO-3G", false, &[1, 0, 1]).unwrap();
        assert_eq!(a.fragment_indices, vec![0, 1]);
        assert_eq!(a.method_basis(), "HF/STO-3G");
        assert!(CalculationKey::new("s", "", "STO-3G", false, &[0]).is_err());
        assert!(CalculationKey::new("s", "HF", "STO-3G", false, &[]).is_err());
    }
}
