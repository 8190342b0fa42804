//! Domain module
//!
//! Core domain types and business logic.

pub mod amount;
pub mod context;
pub mod error;
pub mod ids;

pub use amount::{Amount, AmountError, Balance, MAX_BALANCE, MAX_SCALE};
pub use context::OperationContext;
pub use error::DomainError;
pub use ids::{AccountId, TransactionId, UserId};
