//! Ledger Store Errors
//!
//! Error types for storage operations.

use uuid::Uuid;

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Username or email already taken
    #[error("Duplicate user: {field} already registered")]
    DuplicateUser { field: String },

    /// Row references a user or account that does not exist
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Idempotency key inserted twice
    #[error("Idempotency key already exists: {0}")]
    DuplicateIdempotencyKey(Uuid),

    /// Write attempted on a row this transaction did not lock
    #[error("Row not locked by this transaction: {0}")]
    NotLocked(String),

    /// Update targeted a row that does not exist
    #[error("Row not found: {0}")]
    RowNotFound(String),

    /// Stored data failed to decode into a typed record
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Store cannot serve requests (lock poisoned, injected failure, ...)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Check if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateUser { .. }
                | StoreError::ForeignKeyViolation(_)
                | StoreError::DuplicateIdempotencyKey(_)
        )
    }

    /// Check if this error is transient (a caller-initiated retry may succeed)
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| is_transient_sqlstate(&code))
            }
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// SQLSTATEs worth retrying: serialization failure, deadlock, lock timeout,
/// and the connection exception class. Data and constraint errors never are.
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code, "40001" | "40P01" | "55P03") || code.starts_with("08")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_retryable() {
        assert!(StoreError::Unavailable("pool timed out".to_string()).is_retryable());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StoreError::ForeignKeyViolation("account 9".to_string()).is_retryable());
        assert!(!StoreError::CorruptRow("status".to_string()).is_retryable());
    }

    #[test]
    fn test_only_transient_sqlstates_are_retryable() {
        for code in ["40001", "40P01", "55P03", "08006", "08001"] {
            assert!(is_transient_sqlstate(code), "{} should be retryable", code);
        }
        // numeric overflow, check violation, unique violation, undefined table
        for code in ["22003", "23514", "23505", "42P01"] {
            assert!(!is_transient_sqlstate(code), "{} should not be retryable", code);
        }
    }

    #[test]
    fn test_non_database_sqlx_errors() {
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::PoolClosed).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::Protocol("bad frame".to_string())).is_retryable());
    }

    #[test]
    fn test_constraint_violation() {
        let dup = StoreError::DuplicateUser {
            field: "email".to_string(),
        };
        assert!(dup.is_constraint_violation());
        assert!(!StoreError::NotLocked("account 1".to_string()).is_constraint_violation());
    }
}
