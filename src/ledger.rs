//! Ledger facade
//!
//! One entry point over the handlers and the query service. Methods taking a
//! plain requesting user id build the `OperationContext` themselves; callers
//! needing correlation ids or idempotency keys go through the handlers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{AccountId, OperationContext, UserId};
use crate::entity::{AccountSnapshot, AccountType, TransactionSnapshot, User};
use crate::error::LedgerResult;
use crate::handlers::{
    AccountCommand, AccountHandler, DepositCommand, DepositHandler, MovementReceipt,
    OpenAccountCommand, OpenAccountResult, RegisterUserCommand, RegisterUserResult,
    RemoveUserCommand, RemoveUserResult, TransferCommand, TransferHandler, TransferReceipt,
    UserHandler, WithdrawCommand, WithdrawHandler,
};
use crate::query::{QueryService, Reconciliation, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::store::{LedgerStats, LedgerStore, MemoryLedgerStore};

/// Tunables the engine takes from configuration
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub default_currency: String,
    pub default_page_limit: i64,
    pub max_page_limit: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
        }
    }
}

impl From<&Config> for LedgerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_currency: config.default_currency.clone(),
            default_page_limit: config.default_page_limit,
            max_page_limit: config.max_page_limit,
        }
    }
}

/// The ledger engine
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    deposits: DepositHandler,
    withdrawals: WithdrawHandler,
    transfers: TransferHandler,
    accounts: AccountHandler,
    users: UserHandler,
    queries: QueryService,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_settings(store, LedgerSettings::default())
    }

    pub fn with_settings(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Self {
            deposits: DepositHandler::new(store.clone()),
            withdrawals: WithdrawHandler::new(store.clone()),
            transfers: TransferHandler::new(store.clone()),
            accounts: AccountHandler::new(store.clone(), settings.default_currency),
            users: UserHandler::new(store.clone()),
            queries: QueryService::with_limits(
                store.clone(),
                settings.default_page_limit,
                settings.max_page_limit,
            ),
            store,
        }
    }

    /// Ledger over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // =========================================================================
    // Handler access (context-aware entry points)
    // =========================================================================

    pub fn deposits(&self) -> &DepositHandler {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &WithdrawHandler {
        &self.withdrawals
    }

    pub fn transfers(&self) -> &TransferHandler {
        &self.transfers
    }

    pub fn accounts(&self) -> &AccountHandler {
        &self.accounts
    }

    pub fn users(&self) -> &UserHandler {
        &self.users
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    // =========================================================================
    // Funds movement
    // =========================================================================

    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> LedgerResult<MovementReceipt> {
        let mut command = DepositCommand::new(account_id, amount);
        command.description = describe(description);
        self.deposits
            .execute(command, &OperationContext::new())
            .await
    }

    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
        requesting_user_id: UserId,
    ) -> LedgerResult<MovementReceipt> {
        let mut command = WithdrawCommand::new(account_id, amount);
        command.description = describe(description);
        self.withdrawals
            .execute(command, &OperationContext::for_user(requesting_user_id))
            .await
    }

    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        description: &str,
        requesting_user_id: UserId,
    ) -> LedgerResult<TransferReceipt> {
        let mut command = TransferCommand::new(from, to, amount);
        command.description = describe(description);
        self.transfers
            .execute(command, &OperationContext::for_user(requesting_user_id))
            .await
    }

    // =========================================================================
    // Account lifecycle
    // =========================================================================

    pub async fn open_account(
        &self,
        owner_id: UserId,
        account_type: AccountType,
        initial_balance: Decimal,
    ) -> LedgerResult<OpenAccountResult> {
        self.accounts
            .open(
                OpenAccountCommand::new(owner_id, account_type, initial_balance),
                &OperationContext::for_user(owner_id),
            )
            .await
    }

    pub async fn close_account(
        &self,
        account_id: AccountId,
        requesting_user_id: UserId,
    ) -> LedgerResult<AccountSnapshot> {
        self.accounts
            .close(
                AccountCommand::new(account_id),
                &OperationContext::for_user(requesting_user_id),
            )
            .await
    }

    pub async fn freeze_account(&self, account_id: AccountId) -> LedgerResult<AccountSnapshot> {
        self.accounts
            .freeze(AccountCommand::new(account_id), &OperationContext::new())
            .await
    }

    pub async fn unfreeze_account(&self, account_id: AccountId) -> LedgerResult<AccountSnapshot> {
        self.accounts
            .unfreeze(AccountCommand::new(account_id), &OperationContext::new())
            .await
    }

    // =========================================================================
    // User registry
    // =========================================================================

    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> LedgerResult<RegisterUserResult> {
        self.users
            .register(
                RegisterUserCommand::new(username, email, password_hash),
                &OperationContext::new(),
            )
            .await
    }

    pub async fn remove_user(&self, user_id: UserId) -> LedgerResult<RemoveUserResult> {
        self.users
            .remove(RemoveUserCommand::new(user_id), &OperationContext::new())
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_account(&self, account_id: AccountId) -> LedgerResult<AccountSnapshot> {
        self.queries.get_account(account_id).await
    }

    pub async fn list_accounts(&self, owner_id: UserId) -> LedgerResult<Vec<AccountSnapshot>> {
        self.queries.list_accounts(owner_id).await
    }

    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> LedgerResult<Vec<TransactionSnapshot>> {
        self.queries
            .transactions_for_account(account_id, limit, offset)
            .await
    }

    pub async fn transactions_in_range(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<Vec<TransactionSnapshot>> {
        self.queries
            .transactions_in_range(account_id, start, end)
            .await
    }

    pub async fn get_user(&self, user_id: UserId) -> LedgerResult<User> {
        self.queries.get_user(user_id).await
    }

    pub async fn find_user_by_username(&self, username: &str) -> LedgerResult<Option<User>> {
        self.queries.find_user_by_username(username).await
    }

    pub async fn stats(&self) -> LedgerResult<LedgerStats> {
        self.queries.ledger_stats().await
    }

    pub async fn reconcile_account(&self, account_id: AccountId) -> LedgerResult<Reconciliation> {
        self.queries.reconcile_account(account_id).await
    }
}

fn describe(description: &str) -> Option<String> {
    let trimmed = description.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
