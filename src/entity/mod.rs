//! Entity module
//!
//! Typed records for users, accounts and transactions.

pub mod account;
pub mod transaction;
pub mod user;

pub use account::{Account, AccountStatus, AccountType, NewAccount};
pub use transaction::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
pub use user::{NewUser, User};

/// Accounts leave the store by value; a copy is all a caller ever holds.
pub type AccountSnapshot = Account;

/// Committed transaction record as returned to callers.
pub type TransactionSnapshot = Transaction;
