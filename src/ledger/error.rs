//! Ledger Error Types
//!
//! One taxonomy shared by the store, the transfer coordinator and the
//! service facade. The calling layer maps these to response semantics via
//! [`LedgerError::code`] and [`LedgerError::http_status`].

use thiserror::Error;

/// PostgreSQL SQLSTATE codes the ledger classifies explicitly.
pub mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Rejected before any write. Never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or a row still referenced by the ledger.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store-detected conflict between concurrent transactions.
    /// The whole operation may be retried from the start.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // === Caller-layer checks (service facade) ===
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid currency {got}, account currency {expected}")]
    CurrencyMismatch { expected: String, got: String },
}

impl LedgerError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::SerializationFailure(_) => "SERIALIZATION_FAILURE",
            LedgerError::Internal(_) => "INTERNAL",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
        }
    }

    /// Suggested HTTP status for the calling layer
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidArgument(_) | LedgerError::CurrencyMismatch { .. } => 400,
            LedgerError::Forbidden(_) => 403,
            LedgerError::NotFound(_) => 404,
            LedgerError::Conflict(_) | LedgerError::SerializationFailure(_) => 409,
            LedgerError::Internal(_) => 500,
        }
    }

    /// Only serialization failures are safe to retry as a whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::SerializationFailure(_))
    }

    pub(crate) fn account_not_found(id: crate::core_types::AccountId) -> Self {
        LedgerError::NotFound(format!("account {}", id))
    }
}

/// SQLSTATE of a driver error, if the database reported one.
pub fn sqlstate_of(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => LedgerError::NotFound("no rows in result set".to_string()),
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                match db.code().as_deref() {
                    Some(
                        sqlstate::SERIALIZATION_FAILURE
                        | sqlstate::DEADLOCK_DETECTED
                        | sqlstate::LOCK_NOT_AVAILABLE,
                    ) => LedgerError::SerializationFailure(message),
                    Some(sqlstate::UNIQUE_VIOLATION) => LedgerError::Conflict(message),
                    Some(sqlstate::FOREIGN_KEY_VIOLATION) => LedgerError::NotFound(message),
                    Some(sqlstate::CHECK_VIOLATION) => LedgerError::InvalidArgument(message),
                    _ => LedgerError::Internal(e.to_string()),
                }
            }
            _ => LedgerError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::InvalidArgument("x".into()).code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            LedgerError::SerializationFailure("x".into()).code(),
            "SERIALIZATION_FAILURE"
        );
        assert_eq!(
            LedgerError::CurrencyMismatch {
                expected: "USD".into(),
                got: "EUR".into()
            }
            .code(),
            "CURRENCY_MISMATCH"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::InvalidArgument("x".into()).http_status(), 400);
        assert_eq!(LedgerError::Forbidden("x".into()).http_status(), 403);
        assert_eq!(LedgerError::NotFound("x".into()).http_status(), 404);
        assert_eq!(LedgerError::Conflict("x".into()).http_status(), 409);
        assert_eq!(LedgerError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn test_only_serialization_failure_is_retryable() {
        assert!(LedgerError::SerializationFailure("x".into()).is_retryable());
        assert!(!LedgerError::NotFound("x".into()).is_retryable());
        assert!(!LedgerError::Internal("x".into()).is_retryable());
        assert!(!LedgerError::InvalidArgument("x".into()).is_retryable());
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err: LedgerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(sqlstate_of(&sqlx::Error::RowNotFound), None);
    }

    #[test]
    fn test_sqlx_pool_timeout_maps_to_internal() {
        let err: LedgerError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, LedgerError::Internal(_)));
    }

    #[test]
    fn test_display() {
        let err = LedgerError::CurrencyMismatch {
            expected: "USD".into(),
            got: "EUR".into(),
        };
        assert_eq!(err.to_string(), "Invalid currency EUR, account currency USD");
    }
}
