//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y luego al
//! `StoreError` del core.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use potfit_core::StoreError;
use potfit_domain::CalcStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("calculation {0} not found")]
    RowNotFound(i64),
    #[error("calculation {id}: invalid transition {from} -> {to}")]
    InvalidTransition { id: i64, from: CalcStatus, to: CalcStatus },
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Corrupt(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(format!("structure payload: {err}"))
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::RowNotFound(id) => StoreError::NotFound(id),
            PersistenceError::InvalidTransition { id, from, to } => StoreError::InvalidTransition { id, from, to },
            PersistenceError::Corrupt(msg) | PersistenceError::CheckViolation(msg) => StoreError::Corrupt(msg),
            PersistenceError::ForeignKeyViolation(msg) | PersistenceError::UniqueViolation(msg) => StoreError::Corrupt(msg),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_and_missing_rows_keep_their_meaning() {
        let e: StoreError = PersistenceError::RowNotFound(7).into();
        assert_eq!(e, StoreError::NotFound(7));
        let e: StoreError = PersistenceError::InvalidTransition { id: 3,
                                                                  from: CalcStatus::Pending,
                                                                  to: CalcStatus::Complete }.into();
        assert!(matches!(e, StoreError::InvalidTransition { id: 3, .. }));
    }

    #[test]
    fn connection_problems_become_unavailable() {
        let e: StoreError = PersistenceError::TransientIo("pool timeout".into()).into();
        assert!(matches!(e, StoreError::Unavailable(msg) if msg.contains("pool timeout")));
        let e: StoreError = PersistenceError::from(DieselError::NotFound).into();
        assert!(matches!(e, StoreError::Unavailable(_)));
    }
}
