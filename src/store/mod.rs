//! Ledger Store module
//!
//! Durable storage for users, accounts, transactions and idempotency records.
//! Reads go straight to the store; every mutation happens inside a
//! [`LedgerTx`], which either commits all of its writes or none of them.

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AccountId, UserId};
use crate::entity::{Account, NewAccount, NewTransaction, NewUser, Transaction, User};
use crate::idempotency::IdempotencyRecord;

pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregate figures over the whole ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub users: i64,
    pub active_accounts: i64,
    pub transactions: i64,
    /// Sum of balances over active accounts
    pub total_active_balance: Decimal,
}

/// Read side of a ledger store plus the entry point for transactions
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Open a transactional context
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Active accounts of one owner, in creation order
    async fn accounts_for_owner(&self, owner_id: UserId) -> StoreResult<Vec<Account>>;

    /// Most recent first
    async fn transactions_for_account(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transaction>>;

    /// Inclusive on both ends, most recent first
    async fn transactions_in_range(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>>;

    /// Every record of one account, oldest first
    async fn account_history(&self, account_id: AccountId) -> StoreResult<Vec<Transaction>>;

    async fn stats(&self) -> StoreResult<LedgerStats>;

    /// Delete idempotency records created before `cutoff`; returns how many
    async fn purge_idempotency_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// A scoped transactional context.
///
/// Rows returned by the `lock_*` methods stay locked until the context
/// commits, rolls back or is dropped. Dropping without commit discards every
/// write.
#[async_trait]
pub trait LedgerTx: Send {
    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User>;

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>>;

    async fn set_user_active(&mut self, id: UserId, active: bool) -> StoreResult<()>;

    async fn insert_account(&mut self, account: NewAccount) -> StoreResult<Account>;

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Lock every account of an owner, whatever its status, ascending by id
    async fn lock_owner_accounts(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>>;

    /// Persist balance and status of a locked account
    async fn update_account(&mut self, account: &Account) -> StoreResult<()>;

    /// Append a record; the store assigns the id
    async fn insert_transaction(&mut self, transaction: NewTransaction) -> StoreResult<Transaction>;

    async fn find_idempotency(&mut self, key: Uuid) -> StoreResult<Option<IdempotencyRecord>>;

    async fn save_idempotency(&mut self, record: IdempotencyRecord) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
