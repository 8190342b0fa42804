//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Errors raised by entity-level balance arithmetic.
///
/// These carry no storage context; the handlers attach account ids when
/// converting them into `LedgerError`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Amount is zero, negative, too precise, or overflows
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit exceeds the available balance
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Status does not allow the requested change
    #[error("Account is {status}")]
    AccountInactive { status: String },

    /// Closing requires an empty account
    #[error("Account balance must be zero (is {0})")]
    NonZeroBalance(Decimal),
}

impl DomainError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds { required, available }
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_message() {
        let err = DomainError::insufficient_funds(dec!(100), dec!(50));
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_amount_error_becomes_invalid_amount() {
        let err: DomainError = AmountError::NotPositive(dec!(0)).into();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }
}
