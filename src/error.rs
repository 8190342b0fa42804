//! Error handling module
//!
//! The ledger's error taxonomy. Every variant has a stable machine-readable
//! code; storage details stay in the error source and never reach `Display`.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::domain::{AccountId, DomainError, UserId};
use crate::entity::{Account, AccountStatus};
use crate::store::StoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Which side of an operation an account was referenced as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Account,
    Source,
    Destination,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Account => f.write_str("account"),
            AccountRole::Source => f.write_str("source"),
            AccountRole::Destination => f.write_str("destination"),
        }
    }
}

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account not found: {account_id} ({role})")]
    AccountNotFound {
        account_id: AccountId,
        role: AccountRole,
    },

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Account {account_id} is {status}")]
    AccountInactive {
        account_id: AccountId,
        status: AccountStatus,
    },

    #[error("Unauthorized: requesting user does not own account {account_id}")]
    Unauthorized { account_id: AccountId },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    #[error("Duplicate user: {0} already registered")]
    DuplicateUser(String),

    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyConflict(Uuid),

    #[error("Account balance must be zero before closing (is {0})")]
    NonZeroBalance(Decimal),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage unavailable or commit failed")]
    Storage(#[source] StoreError),
}

/// Serializable error body for transport adapters
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: &'static str,
    pub retryable: bool,
}

impl LedgerError {
    pub fn account_not_found(account_id: AccountId) -> Self {
        Self::AccountNotFound {
            account_id,
            role: AccountRole::Account,
        }
    }

    /// Attach account context to an entity-level error
    pub fn for_account(err: DomainError, account: &Account) -> Self {
        match err {
            DomainError::AccountInactive { .. } => Self::AccountInactive {
                account_id: account.id(),
                status: account.status(),
            },
            other => other.into(),
        }
    }

    /// Stable machine-readable kind
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound { .. } => "account_not_found",
            LedgerError::UserNotFound(_) => "user_not_found",
            LedgerError::AccountInactive { .. } => "account_inactive",
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::SameAccountTransfer => "same_account_transfer",
            LedgerError::DuplicateUser(_) => "duplicate_user",
            LedgerError::IdempotencyConflict(_) => "idempotency_conflict",
            LedgerError::NonZeroBalance(_) => "non_zero_balance",
            LedgerError::InvalidRequest(_) => "invalid_request",
            LedgerError::Storage(_) => "storage_error",
        }
    }

    /// Only storage failures may be retried, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_retryable())
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Storage(_))
    }

    pub fn to_response(&self) -> ErrorResponse {
        if let LedgerError::Storage(e) = self {
            tracing::error!(error = ?e, "Storage error");
        }

        ErrorResponse {
            error: self.to_string(),
            error_code: self.error_code(),
            retryable: self.is_retryable(),
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAmount(msg) => LedgerError::InvalidAmount(msg),
            DomainError::InsufficientFunds {
                required,
                available,
            } => LedgerError::InsufficientFunds {
                required,
                available,
            },
            DomainError::NonZeroBalance(balance) => LedgerError::NonZeroBalance(balance),
            DomainError::AccountInactive { status } => {
                LedgerError::InvalidRequest(format!("account is {}", status))
            }
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUser { field } => LedgerError::DuplicateUser(field),
            StoreError::DuplicateIdempotencyKey(key) => LedgerError::IdempotencyConflict(key),
            other => LedgerError::Storage(other),
        }
    }
}
