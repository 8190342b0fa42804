//! Query Layer
//!
//! Read-only access to accounts, users and transaction history. Reads see the
//! store's committed state and take no locks, except `reconcile_account`,
//! which holds the account row while it replays the history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{AccountId, TransactionId, UserId};
use crate::entity::{Account, Transaction, User};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerStats, LedgerStore};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Outcome of replaying one account's records against its stored balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    pub stored_balance: Decimal,
    /// Sum of signed record amounts, starting from zero
    pub replayed_balance: Decimal,
    pub record_count: usize,
    /// Records whose `balance_after` disagrees with the running sum
    pub mismatched_records: Vec<TransactionId>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.stored_balance == self.replayed_balance && self.mismatched_records.is_empty()
    }

    pub fn drift(&self) -> Decimal {
        self.stored_balance - self.replayed_balance
    }
}

/// Read-side service
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn LedgerStore>,
    default_limit: i64,
    max_limit: i64,
}

impl QueryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_limits(store, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
    }

    pub fn with_limits(store: Arc<dyn LedgerStore>, default_limit: i64, max_limit: i64) -> Self {
        Self {
            store,
            default_limit,
            max_limit,
        }
    }

    pub async fn get_account(&self, account_id: AccountId) -> LedgerResult<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or(LedgerError::account_not_found(account_id))
    }

    /// Active accounts of `owner_id` in creation order; unknown owners have none
    pub async fn list_accounts(&self, owner_id: UserId) -> LedgerResult<Vec<Account>> {
        Ok(self.store.accounts_for_owner(owner_id).await?)
    }

    /// Most recent first. `limit` defaults to the configured page size and is
    /// clamped to the configured maximum.
    pub async fn transactions_for_account(
        &self,
        account_id: AccountId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> LedgerResult<Vec<Transaction>> {
        let limit = self.page_limit(limit)?;
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(LedgerError::InvalidRequest(
                "offset must not be negative".to_string(),
            ));
        }

        self.get_account(account_id).await?;
        Ok(self
            .store
            .transactions_for_account(account_id, limit, offset)
            .await?)
    }

    /// Records created within `[start, end]`, most recent first
    pub async fn transactions_in_range(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<Transaction>> {
        if start > end {
            return Err(LedgerError::InvalidRequest(
                "range start is after range end".to_string(),
            ));
        }

        self.get_account(account_id).await?;
        Ok(self
            .store
            .transactions_in_range(account_id, start, end)
            .await?)
    }

    pub async fn get_user(&self, user_id: UserId) -> LedgerResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub async fn find_user_by_username(&self, username: &str) -> LedgerResult<Option<User>> {
        Ok(self.store.find_user_by_username(username.trim()).await?)
    }

    pub async fn ledger_stats(&self) -> LedgerResult<LedgerStats> {
        Ok(self.store.stats().await?)
    }

    /// Replay an account's records and compare with its stored balance.
    /// Never mutates anything.
    pub async fn reconcile_account(&self, account_id: AccountId) -> LedgerResult<Reconciliation> {
        let mut tx = self.store.begin().await?;
        let account = tx
            .lock_account(account_id)
            .await?
            .ok_or(LedgerError::account_not_found(account_id))?;

        // No write to this account can commit while the row is held
        let history = self.store.account_history(account_id).await?;
        tx.rollback().await?;

        let mut running = Decimal::ZERO;
        let mut mismatched_records = Vec::new();
        for record in &history {
            running += record.signed_amount();
            if record.balance_after != running {
                mismatched_records.push(record.id);
            }
        }

        let reconciliation = Reconciliation {
            account_id,
            stored_balance: account.balance().value(),
            replayed_balance: running,
            record_count: history.len(),
            mismatched_records,
        };

        if reconciliation.is_consistent() {
            tracing::debug!(%account_id, records = reconciliation.record_count, "Account reconciled");
        } else {
            tracing::warn!(
                %account_id,
                drift = %reconciliation.drift(),
                mismatched = reconciliation.mismatched_records.len(),
                "Account balance drifted from its history"
            );
        }

        Ok(reconciliation)
    }

    fn page_limit(&self, limit: Option<i64>) -> LedgerResult<i64> {
        match limit {
            None => Ok(self.default_limit.min(self.max_limit)),
            Some(l) if l <= 0 => Err(LedgerError::InvalidRequest(
                "limit must be positive".to_string(),
            )),
            Some(l) => Ok(l.min(self.max_limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;

    fn service() -> QueryService {
        QueryService::with_limits(Arc::new(MemoryLedgerStore::new()), 50, 500)
    }

    #[test]
    fn test_page_limit() {
        let queries = service();
        assert_eq!(queries.page_limit(None).unwrap(), 50);
        assert_eq!(queries.page_limit(Some(10)).unwrap(), 10);
        assert_eq!(queries.page_limit(Some(10_000)).unwrap(), 500);
        assert!(matches!(
            queries.page_limit(Some(0)),
            Err(LedgerError::InvalidRequest(_))
        ));
        assert!(queries.page_limit(Some(-3)).is_err());
    }

    #[tokio::test]
    async fn test_invalid_paging_rejected_before_lookup() {
        let queries = service();
        let result = queries
            .transactions_for_account(AccountId(1), Some(10), Some(-1))
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let queries = service();
        let now = Utc::now();
        let result = queries
            .transactions_in_range(AccountId(1), now, now - chrono::Duration::days(1))
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let queries = service();
        assert!(matches!(
            queries.get_account(AccountId(404)).await,
            Err(LedgerError::AccountNotFound { .. })
        ));
        assert!(matches!(
            queries.reconcile_account(AccountId(404)).await,
            Err(LedgerError::AccountNotFound { .. })
        ));
    }

    #[test]
    fn test_reconciliation_drift() {
        let reconciliation = Reconciliation {
            account_id: AccountId(1),
            stored_balance: Decimal::new(1000, 2),
            replayed_balance: Decimal::new(900, 2),
            record_count: 2,
            mismatched_records: vec![],
        };
        assert!(!reconciliation.is_consistent());
        assert_eq!(reconciliation.drift(), Decimal::new(100, 2));
    }
}
