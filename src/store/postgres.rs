//! PostgreSQL Ledger Store
//!
//! `sqlx` backend. Row locks are `SELECT ... FOR UPDATE`, ids come from
//! BIGSERIAL sequences and every transaction runs with a local lock timeout.
//! The DDL lives in `schema/ledger.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use std::time::Duration;
use uuid::Uuid;

use super::{LedgerStats, LedgerStore, LedgerTx, StoreError, StoreResult};
use crate::domain::{AccountId, Balance, TransactionId, UserId};
use crate::entity::{
    Account, AccountStatus, AccountType, NewAccount, NewTransaction, NewUser, Transaction,
    TransactionKind, TransactionStatus, User,
};
use crate::idempotency::IdempotencyRecord;

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

const USER_COLUMNS: &str = "id, username, email, password_hash, active, created_at";
const ACCOUNT_COLUMNS: &str = "id, owner_id, account_type, balance, currency, status, created_at";
const TRANSACTION_COLUMNS: &str = "id, transaction_type, amount, account_id, from_account_id, \
     to_account_id, balance_after, transfer_id, description, status, created_at";

// =========================================================================
// Row types
// =========================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    owner_id: i64,
    account_type: String,
    balance: Decimal,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let account_type: AccountType = row.account_type.parse().map_err(StoreError::CorruptRow)?;
        let status: AccountStatus = row.status.parse().map_err(StoreError::CorruptRow)?;
        let balance = Balance::new(row.balance)
            .map_err(|e| StoreError::CorruptRow(format!("account {}: {}", row.id, e)))?;

        Ok(Account::from_db_state(
            AccountId(row.id),
            UserId(row.owner_id),
            account_type,
            balance,
            row.currency,
            status,
            row.created_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    transaction_type: String,
    amount: Decimal,
    account_id: i64,
    from_account_id: Option<i64>,
    to_account_id: Option<i64>,
    balance_after: Decimal,
    transfer_id: Option<Uuid>,
    description: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind: TransactionKind = row
            .transaction_type
            .parse()
            .map_err(StoreError::CorruptRow)?;
        let status: TransactionStatus = row.status.parse().map_err(StoreError::CorruptRow)?;

        Ok(Transaction {
            id: TransactionId(row.id),
            kind,
            amount: row.amount,
            account_id: AccountId(row.account_id),
            from_account_id: row.from_account_id.map(AccountId),
            to_account_id: row.to_account_id.map(AccountId),
            balance_after: row.balance_after,
            transfer_id: row.transfer_id,
            description: row.description,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    key: Uuid,
    operation: String,
    request_hash: String,
    response_body: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<IdempotencyRow> for IdempotencyRecord {
    fn from(row: IdempotencyRow) -> Self {
        IdempotencyRecord {
            key: row.key,
            operation: row.operation,
            request_hash: row.request_hash,
            response_body: row.response_body,
            created_at: row.created_at,
        }
    }
}

fn collect_transactions(rows: Vec<TransactionRow>) -> StoreResult<Vec<Transaction>> {
    rows.into_iter().map(Transaction::try_from).collect()
}

/// Translate constraint violations into store errors
fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("23505") => match db.constraint() {
                Some("users_username_key") => {
                    return StoreError::DuplicateUser {
                        field: "username".to_string(),
                    }
                }
                Some("users_email_key") => {
                    return StoreError::DuplicateUser {
                        field: "email".to_string(),
                    }
                }
                _ => {}
            },
            Some("23503") => return StoreError::ForeignKeyViolation(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

// =========================================================================
// PgLedgerStore
// =========================================================================

/// PostgreSQL-backed [`LedgerStore`]
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PgTx { tx }))
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn accounts_for_owner(&self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM accounts
            WHERE owner_id = $1 AND status = 'active'
            ORDER BY id
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(owner_id.value())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn transactions_for_account(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(account_id.value())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        collect_transactions(rows)
    }

    async fn transactions_in_range(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1 AND created_at BETWEEN $2 AND $3
            ORDER BY created_at DESC, id DESC
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(account_id.value())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        collect_transactions(rows)
    }

    async fn account_history(&self, account_id: AccountId) -> StoreResult<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE account_id = $1 ORDER BY id",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id.value())
        .fetch_all(&self.pool)
        .await?;

        collect_transactions(rows)
    }

    async fn stats(&self) -> StoreResult<LedgerStats> {
        let (users, active_accounts, transactions, total_active_balance): (i64, i64, i64, Decimal) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM accounts WHERE status = 'active'),
                    (SELECT COUNT(*) FROM transactions),
                    (SELECT COALESCE(SUM(balance), 0) FROM accounts WHERE status = 'active')
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(LedgerStats {
            users,
            active_accounts,
            transactions,
            total_active_balance,
        })
    }

    async fn purge_idempotency_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =========================================================================
// PgTx
// =========================================================================

struct PgTx {
    tx: SqlxTransaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn insert_user(&mut self, user: NewUser) -> StoreResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn lock_user(&mut self, id: UserId) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        tracing::debug!(user_id = %id, found = row.is_some(), "User row locked");
        Ok(row.map(User::from))
    }

    async fn set_user_active(&mut self, id: UserId, active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET active = $2 WHERE id = $1")
            .bind(id.value())
            .bind(active)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("user {}", id)));
        }
        Ok(())
    }

    async fn insert_account(&mut self, account: NewAccount) -> StoreResult<Account> {
        let row: AccountRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO accounts (owner_id, account_type, balance, currency)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.owner_id.value())
        .bind(account.account_type.as_str())
        .bind(account.balance.value())
        .bind(&account.currency)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        row.try_into()
    }

    async fn lock_account(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        tracing::debug!(account_id = %id, found = row.is_some(), "Account row locked");
        row.map(Account::try_from).transpose()
    }

    async fn lock_owner_accounts(&mut self, owner_id: UserId) -> StoreResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE owner_id = $1 ORDER BY id FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(owner_id.value())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn update_account(&mut self, account: &Account) -> StoreResult<()> {
        let result = sqlx::query("UPDATE accounts SET balance = $2, status = $3 WHERE id = $1")
            .bind(account.id().value())
            .bind(account.balance().value())
            .bind(account.status().as_str())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound(format!("account {}", account.id())));
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: NewTransaction) -> StoreResult<Transaction> {
        let row: TransactionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO transactions (
                transaction_type, amount, account_id, from_account_id, to_account_id,
                balance_after, transfer_id, description, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'completed')
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(transaction.kind.as_str())
        .bind(transaction.amount.value())
        .bind(transaction.account_id.value())
        .bind(transaction.from_account_id.map(AccountId::value))
        .bind(transaction.to_account_id.map(AccountId::value))
        .bind(transaction.balance_after.value())
        .bind(transaction.transfer_id)
        .bind(&transaction.description)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        row.try_into()
    }

    async fn find_idempotency(&mut self, key: Uuid) -> StoreResult<Option<IdempotencyRecord>> {
        let row: Option<IdempotencyRow> = sqlx::query_as(
            r#"
            SELECT key, operation, request_hash, response_body, created_at
            FROM idempotency_keys
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(IdempotencyRecord::from))
    }

    async fn save_idempotency(&mut self, record: IdempotencyRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, operation, request_hash, response_body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.key)
        .bind(&record.operation)
        .bind(&record.request_hash)
        .bind(&record.response_body)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateIdempotencyKey(record.key)
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
