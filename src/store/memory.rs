//! In-memory Ledger Store
//!
//! Process-local backend for tests, demos and the load tool. Rows are locked
//! with per-row async mutexes; a transaction stages its writes privately and
//! applies them in one step under the state lock at commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
#[cfg(test)]
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{LedgerStats, LedgerStore, LedgerTx, StoreError, StoreResult};
use crate::domain::{AccountId, TransactionId, UserId};
use crate::entity::{Account, NewAccount, NewTransaction, NewUser, Transaction, User};
use crate::idempotency::IdempotencyRecord;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    accounts: BTreeMap<AccountId, Account>,
    /// Committed records per account, in commit order
    history: HashMap<AccountId, Vec<Transaction>>,
    transaction_count: i64,
    idempotency: HashMap<Uuid, IdempotencyRecord>,
}

impl State {
    fn username_taken(&self, username: &str) -> bool {
        self.users.values().any(|u| u.username == username)
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }
}

/// Lazily created async mutex per row key
struct LockTable<K> {
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Copy + std::fmt::Display> LockTable<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: K, timeout: Duration) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StoreError::Unavailable("lock table poisoned".to_string()))?;
            locks.entry(key).or_default().clone()
        };

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::Unavailable(format!("lock timeout on row {}", key)))
    }
}

struct Inner {
    state: Mutex<State>,
    account_locks: LockTable<AccountId>,
    user_locks: LockTable<UserId>,
    next_user_id: AtomicI64,
    next_account_id: AtomicI64,
    next_transaction_id: AtomicI64,
    lock_timeout: Duration,
    #[cfg(test)]
    fail_next_commit: AtomicBool,
}

impl Inner {
    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("ledger state lock poisoned".to_string()))
    }

    #[cfg(test)]
    fn take_injected_failure(&self) -> bool {
        self.fail_next_commit.swap(false, Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn take_injected_failure(&self) -> bool {
        false
    }
}

/// In-memory [`LedgerStore`]; clones share the same data
#[derive(Clone)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Row lock waits longer than `lock_timeout` fail with `Unavailable`
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                account_locks: LockTable::new(),
                user_locks: LockTable::new(),
                next_user_id: AtomicI64::new(1),
                next_account_id: AtomicI64::new(1),
                next_transaction_id: AtomicI64::new(1),
                lock_timeout,
                #[cfg(test)]
                fail_next_commit: AtomicBool::new(false),
            }),
        }
    }

    /// Make the next commit fail after all checks pass
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(MemoryTx::new(self.inner.clone())))
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.inner.state()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .state()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self.inner.state()?.accounts.get(&id).cloned())
    }

    async fn accounts_for_owner(&self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        Ok(self
            .inner
            .state()?
            .accounts
            .values()
            .filter(|a| a.owner_id() == owner_id && a.is_active())
            .cloned()
            .collect())
    }

    async fn transactions_for_account(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.inner.state()?;
        let mut records: Vec<Transaction> =
            state.history.get(&account_id).cloned().unwrap_or_default();
        drop(state);

        sort_newest_first(&mut records);
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn transactions_in_range(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.inner.state()?;
        let mut records: Vec<Transaction> = state
            .history
            .get(&account_id)
            .map(|all| {
                all.iter()
                    .filter(|t| t.created_at >= start && t.created_at <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(state);

        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn account_history(&self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        let state = self.inner.state()?;
        let mut records: Vec<Transaction> =
            state.history.get(&account_id).cloned().unwrap_or_default();
        drop(state);

        records.sort_by_key(|t| t.id);
        Ok(records)
    }

    async fn stats(&self) -> StoreResult<LedgerStats> {
        let state = self.inner.state()?;
        let active: Vec<&Account> = state.accounts.values().filter(|a| a.is_active()).collect();

        Ok(LedgerStats {
            users: state.users.len() as i64,
            active_accounts: active.len() as i64,
            transactions: state.transaction_count,
            total_active_balance: active
                .iter()
                .map(|a| a.balance().value())
                .sum::<Decimal>(),
        })
    }

    async fn purge_idempotency_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.inner.state()?;
        let before = state.idempotency.len();
        state.idempotency.retain(|_, r| r.created_at >= cutoff);
        Ok((before - state.idempotency.len()) as u64)
    }
}

fn sort_newest_first(records: &mut [Transaction]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

// =========================================================================
// MemoryTx
// =========================================================================

struct MemoryTx {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    /// Locked or inserted accounts as this transaction sees them
    accounts: BTreeMap<AccountId, Account>,
    dirty_accounts: BTreeSet<AccountId>,
    inserted_accounts: BTreeSet<AccountId>,
    users: BTreeMap<UserId, User>,
    dirty_users: BTreeSet<UserId>,
    inserted_users: BTreeSet<UserId>,
    transactions: Vec<Transaction>,
    idempotency: Vec<IdempotencyRecord>,
}

impl MemoryTx {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            guards: Vec::new(),
            accounts: BTreeMap::new(),
            dirty_accounts: BTreeSet::new(),
            inserted_accounts: BTreeSet::new(),
            users: BTreeMap::new(),
            dirty_users: BTreeSet::new(),
            inserted_users: BTreeSet::new(),
            transactions: Vec::new(),
            idempotency: Vec::new(),
        }
    }

    fn staged_user_conflict(&self, user: &NewUser) -> Option<&'static str> {
        for id in &self.inserted_users {
            if let Some(staged) = self.users.get(id) {
                if staged.username == user.username {
                    return Some("username");
                }
                if staged.email == user.email {
                    return Some("email");
                }
            }
        }
        None
    }

    fn user_exists(&self, state: &State, id: UserId) -> bool {
        self.users.contains_key(&id) || state.users.contains_key(&id)
    }

    fn account_exists(&self, state: &State, id: AccountId) -> bool {
        self.accounts.contains_key(&id) || state.accounts.contains_key(&id)
    }

    /// Checks that can only be decided against the latest committed state
    fn validate_commit(&self, state: &State) -> StoreResult<()> {
        for id in &self.inserted_users {
            if let Some(user) = self.users.get(id) {
                if state.username_taken(&user.username) {
                    return Err(StoreError::DuplicateUser {
                        field: "username".to_string(),
                    });
                }
                if state.email_taken(&user.email) {
                    return Err(StoreError::DuplicateUser {
                        field: "email".to_string(),
                    });
                }
            }
        }

        for record in &self.idempotency {
            if state.idempotency.contains_key(&record.key) {
                return Err(StoreError::DuplicateIdempotencyKey(record.key));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        {
            let state = self.inner.state()?;
            if state.username_taken(&user.username) {
                return Err(StoreError::DuplicateUser {
                    field: "username".to_string(),
                });
            }
            if state.email_taken(&user.email) {
                return Err(StoreError::DuplicateUser {
                    field: "email".to_string(),
                });
            }
        }
        if let Some(field) = self.staged_user_conflict(&user) {
            return Err(StoreError::DuplicateUser {
                field: field.to_string(),
            });
        }

        let id = UserId(self.inner.next_user_id.fetch_add(1, Ordering::SeqCst));
        let user = user.into_user(id, Utc::now());
        self.users.insert(id, user.clone());
        self.inserted_users.insert(id);
        self.dirty_users.insert(id);
        Ok(user)
    }

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        if let Some(user) = self.users.get(&id) {
            return Ok(Some(user.clone()));
        }
        let exists = self.inner.state()?.users.contains_key(&id);
        if !exists {
            return Ok(None);
        }

        let guard = self.inner.user_locks.acquire(id, self.inner.lock_timeout).await?;
        self.guards.push(guard);
        tracing::debug!(user_id = %id, "User row locked");

        let user = self.inner.state()?.users.get(&id).cloned();
        if let Some(user) = &user {
            self.users.insert(id, user.clone());
        }
        Ok(user)
    }

    async fn set_user_active(&mut self, id: UserId, active: bool) -> StoreResult<()> {
        let user = self
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotLocked(format!("user {}", id)))?;
        user.active = active;
        self.dirty_users.insert(id);
        Ok(())
    }

    async fn insert_account(&mut self, account: NewAccount) -> StoreResult<Account> {
        let owner_known = {
            let state = self.inner.state()?;
            self.user_exists(&state, account.owner_id)
        };
        if !owner_known {
            return Err(StoreError::ForeignKeyViolation(format!(
                "account owner {} does not exist",
                account.owner_id
            )));
        }

        let id = AccountId(self.inner.next_account_id.fetch_add(1, Ordering::SeqCst));
        let account = Account::from_new(id, account, Utc::now());
        self.accounts.insert(id, account.clone());
        self.inserted_accounts.insert(id);
        self.dirty_accounts.insert(id);
        Ok(account)
    }

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        if let Some(account) = self.accounts.get(&id) {
            return Ok(Some(account.clone()));
        }
        let exists = self.inner.state()?.accounts.contains_key(&id);
        if !exists {
            return Ok(None);
        }

        let guard = self.inner.account_locks.acquire(id, self.inner.lock_timeout).await?;
        self.guards.push(guard);
        tracing::debug!(account_id = %id, "Account row locked");

        // Re-read after the lock: the previous holder may have committed
        let account = self.inner.state()?.accounts.get(&id).cloned();
        if let Some(account) = &account {
            self.accounts.insert(id, account.clone());
        }
        Ok(account)
    }

    async fn lock_owner_accounts(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        let ids: BTreeSet<AccountId> = {
            let state = self.inner.state()?;
            state
                .accounts
                .values()
                .filter(|a| a.owner_id() == owner_id)
                .map(|a| a.id())
                .chain(
                    self.accounts
                        .values()
                        .filter(|a| a.owner_id() == owner_id)
                        .map(|a| a.id()),
                )
                .collect()
        };

        let mut locked = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.lock_account(id).await? {
                locked.push(account);
            }
        }
        Ok(locked)
    }

    async fn update_account(&mut self, account: &Account) -> StoreResult<()> {
        let id = account.id();
        if !self.accounts.contains_key(&id) {
            return Err(StoreError::NotLocked(format!("account {}", id)));
        }
        self.accounts.insert(id, account.clone());
        self.dirty_accounts.insert(id);
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: NewTransaction) -> StoreResult<Transaction> {
        {
            let state = self.inner.state()?;
            if let Some(missing) = transaction
                .referenced_accounts()
                .into_iter()
                .find(|id| !self.account_exists(&state, *id))
            {
                return Err(StoreError::ForeignKeyViolation(format!(
                    "transaction references unknown account {}",
                    missing
                )));
            }
        }

        let id = TransactionId(self.inner.next_transaction_id.fetch_add(1, Ordering::SeqCst));
        let record = transaction.into_transaction(id, Utc::now());
        self.transactions.push(record.clone());
        Ok(record)
    }

    async fn find_idempotency(&mut self, key: Uuid) -> StoreResult<Option<IdempotencyRecord>> {
        if let Some(staged) = self.idempotency.iter().find(|r| r.key == key) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.state()?.idempotency.get(&key).cloned())
    }

    async fn save_idempotency(&mut self, record: IdempotencyRecord) -> StoreResult<()> {
        let committed = self.inner.state()?.idempotency.contains_key(&record.key);
        if committed || self.idempotency.iter().any(|r| r.key == record.key) {
            return Err(StoreError::DuplicateIdempotencyKey(record.key));
        }
        self.idempotency.push(record);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = *self;
        let inner = this.inner.clone();
        let mut state = inner.state()?;

        this.validate_commit(&state)?;

        if inner.take_injected_failure() {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        for id in &this.dirty_users {
            if let Some(user) = this.users.remove(id) {
                state.users.insert(*id, user);
            }
        }
        for id in &this.dirty_accounts {
            if let Some(account) = this.accounts.remove(id) {
                state.accounts.insert(*id, account);
            }
        }
        let inserted = this.transactions.len() as i64;
        for record in this.transactions.drain(..) {
            state.history.entry(record.account_id).or_default().push(record);
        }
        state.transaction_count += inserted;
        for record in this.idempotency.drain(..) {
            state.idempotency.insert(record.key, record);
        }

        drop(state);
        // Row locks release only after the new state is visible
        this.guards.clear();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Balance};
    use crate::entity::{AccountType, TransactionKind};
    use rust_decimal_macros::dec;

    async fn seed(store: &MemoryLedgerStore, balance: Decimal) -> (User, Account) {
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(NewUser::new("alice", "alice@example.com", "hash").unwrap())
            .await
            .unwrap();
        let account = tx
            .insert_account(NewAccount::new(user.id, AccountType::Savings, balance, "USD").unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (user, account)
    }

    fn deposit_record(account_id: AccountId, amount: Decimal, after: Decimal) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Deposit,
            amount: Amount::new(amount).unwrap(),
            account_id,
            from_account_id: None,
            to_account_id: Some(account_id),
            balance_after: Balance::new(after).unwrap(),
            transfer_id: None,
            description: "Deposit".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryLedgerStore::new();
        let (_, account) = seed(&store, dec!(100)).await;

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_account(account.id()).await.unwrap().unwrap();
        locked.deposit(dec!(50)).unwrap();
        tx.update_account(&locked).await.unwrap();
        tx.insert_transaction(deposit_record(account.id(), dec!(50), dec!(150)))
            .await
            .unwrap();

        // Not visible before commit
        let before = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(before.balance().value(), dec!(100));

        tx.commit().await.unwrap();

        let after = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(after.balance().value(), dec!(150));
        assert_eq!(store.stats().await.unwrap().transactions, 1);
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryLedgerStore::new();
        let (_, account) = seed(&store, dec!(100)).await;

        {
            let mut tx = store.begin().await.unwrap();
            let mut locked = tx.lock_account(account.id()).await.unwrap().unwrap();
            locked.withdraw(dec!(100)).unwrap();
            tx.update_account(&locked).await.unwrap();
        }

        let after = store.get_account(account.id()).await.unwrap().unwrap();
        assert_eq!(after.balance().value(), dec!(100));

        // Lock was released on drop
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_account(account.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_requires_lock() {
        let store = MemoryLedgerStore::new();
        let (_, account) = seed(&store, dec!(10)).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.update_account(&account).await;
        assert!(matches!(result, Err(StoreError::NotLocked(_))));
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();

        let orphan = NewAccount::new(UserId(99), AccountType::Checking, dec!(0), "USD").unwrap();
        assert!(matches!(
            tx.insert_account(orphan).await,
            Err(StoreError::ForeignKeyViolation(_))
        ));

        let dangling = deposit_record(AccountId(42), dec!(1), dec!(1));
        assert!(matches!(
            tx.insert_transaction(dangling).await,
            Err(StoreError::ForeignKeyViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_inserted_user_visible_after_commit() {
        let store = MemoryLedgerStore::new();
        let (user, _) = seed(&store, dec!(0)).await;

        let stored = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.username, "alice");
        assert!(stored.active);
        assert!(store.find_user_by_username("alice").await.unwrap().is_some());
        assert_eq!(store.stats().await.unwrap().users, 1);

        // A later transaction can lock the user it did not insert
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_user(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_user_detected() {
        let store = MemoryLedgerStore::new();
        seed(&store, dec!(0)).await;

        let mut tx = store.begin().await.unwrap();
        let same_email = NewUser::new("alice2", "ALICE@example.com", "hash").unwrap();
        match tx.insert_user(same_email).await {
            Err(StoreError::DuplicateUser { field }) => assert_eq!(field, "email"),
            other => panic!("expected duplicate email, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let store = MemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let (_, account) = seed(&store, dec!(10)).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_account(account.id()).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let result = waiter.lock_account(account.id()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_ids_come_from_store_sequences() {
        let store = MemoryLedgerStore::new();
        let (user, account) = seed(&store, dec!(0)).await;
        assert_eq!(user.id, UserId(1));
        assert_eq!(account.id(), AccountId(1));

        let mut tx = store.begin().await.unwrap();
        tx.lock_account(account.id()).await.unwrap();
        let first = tx
            .insert_transaction(deposit_record(account.id(), dec!(1), dec!(1)))
            .await
            .unwrap();
        let second = tx
            .insert_transaction(deposit_record(account.id(), dec!(1), dec!(2)))
            .await
            .unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_purge_idempotency() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_idempotency(IdempotencyRecord {
            key: Uuid::new_v4(),
            operation: "deposit".to_string(),
            request_hash: "00".to_string(),
            response_body: serde_json::json!({}),
            created_at: Utc::now() - chrono::Duration::hours(48),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let purged = store
            .purge_idempotency_before(Utc::now() - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }
}
