use thiserror::Error;

/// Errores de validación del dominio (estructuras, claves de cálculo,
/// funciones de distribución).
#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("unknown calculation status: {0}")]
    UnknownStatus(String),
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::SerializationError(e.to_string())
    }
}
