//! bank_ledger Library
//!
//! Transactional ledger engine: users, accounts, deposits, withdrawals and
//! transfers with strict balance invariants under concurrency.

pub mod config;
pub mod db;
pub mod domain;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod jobs;
pub mod ledger;
pub mod query;
pub mod recorder;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use domain::{AccountId, Amount, AmountError, Balance, DomainError, OperationContext};
pub use domain::{TransactionId, UserId};
pub use entity::{Account, AccountStatus, AccountType, Transaction, TransactionKind, User};
pub use error::{AccountRole, LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerSettings};
pub use store::{LedgerStats, LedgerStore, MemoryLedgerStore, PgLedgerStore, StoreError};
