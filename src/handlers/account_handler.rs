//! Account Handler
//!
//! Account lifecycle: open, close, freeze and unfreeze.

use std::sync::Arc;

use crate::domain::OperationContext;
use crate::entity::{Account, NewAccount};
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::idempotency::IdempotencyGuard;
use crate::recorder::{RecordRequest, TransactionRecorder};
use crate::store::LedgerStore;

use super::support::{commit, ensure_owner, lock_existing, log_rejection, parse_amount};
use super::{AccountCommand, OpenAccountCommand, OpenAccountResult};

const INITIAL_DEPOSIT: &str = "Initial deposit";

/// Handler for the account lifecycle
pub struct AccountHandler {
    store: Arc<dyn LedgerStore>,
    default_currency: String,
}

impl AccountHandler {
    pub fn new(store: Arc<dyn LedgerStore>, default_currency: impl Into<String>) -> Self {
        Self {
            store,
            default_currency: default_currency.into(),
        }
    }

    // =========================================================================
    // open
    // =========================================================================

    /// Open an account for an active user. A positive opening balance is
    /// recorded as a deposit in the same unit.
    pub async fn open(
        &self,
        command: OpenAccountCommand,
        context: &OperationContext,
    ) -> LedgerResult<OpenAccountResult> {
        let result = self.apply_open(command, context).await;
        if let Err(e) = &result {
            log_rejection("open_account", context, e);
        }
        result
    }

    async fn apply_open(
        &self,
        command: OpenAccountCommand,
        context: &OperationContext,
    ) -> LedgerResult<OpenAccountResult> {
        let command = command.normalized();
        let guard = IdempotencyGuard::maybe(context.idempotency_key, "open_account", &command)?;

        let mut tx = self.store.begin().await?;

        // Locked so a concurrent removal cannot slip in between check and insert
        let owner = tx
            .lock_user(command.owner_id)
            .await?
            .filter(|u| u.active)
            .ok_or(LedgerError::UserNotFound(command.owner_id))?;

        if let Some(guard) = &guard {
            if let Some(result) = guard.replay(&mut *tx).await? {
                return Ok(result);
            }
        }

        let currency = normalize_currency(command.currency.as_deref(), &self.default_currency)?;
        let new = NewAccount::new(
            owner.id,
            command.account_type,
            command.initial_balance,
            currency,
        )?;

        let account = tx.insert_account(new).await?;

        let initial_transaction_id = if account.balance().is_zero() {
            None
        } else {
            let amount = parse_amount(account.balance().value())?;
            let record = TransactionRecorder::record(
                &mut *tx,
                RecordRequest::deposit(account.id(), amount, account.balance())
                    .with_description(Some(INITIAL_DEPOSIT.to_string())),
            )
            .await?;
            Some(record.id)
        };

        let result = OpenAccountResult {
            account,
            initial_transaction_id,
        };

        if let Some(guard) = &guard {
            guard.save(&mut *tx, &result).await?;
        }
        commit(tx, "open_account").await?;

        tracing::info!(
            account_id = %result.account.id(),
            owner_id = %owner.id,
            account_type = %result.account.account_type(),
            initial_balance = %result.account.balance(),
            "Account opened"
        );

        Ok(result)
    }

    // =========================================================================
    // close / freeze / unfreeze
    // =========================================================================

    /// Close an account on behalf of its owner. The balance must be zero.
    pub async fn close(
        &self,
        command: AccountCommand,
        context: &OperationContext,
    ) -> LedgerResult<Account> {
        self.transition(command, context, "close_account", true, |account| {
            account
                .close()
                .map_err(|e| LedgerError::for_account(e, account))
        })
        .await
    }

    /// Administrative freeze; frozen accounts reject every movement
    pub async fn freeze(
        &self,
        command: AccountCommand,
        context: &OperationContext,
    ) -> LedgerResult<Account> {
        self.transition(command, context, "freeze_account", false, |account| {
            account
                .freeze()
                .map_err(|e| LedgerError::for_account(e, account))
        })
        .await
    }

    pub async fn unfreeze(
        &self,
        command: AccountCommand,
        context: &OperationContext,
    ) -> LedgerResult<Account> {
        self.transition(command, context, "unfreeze_account", false, |account| {
            account
                .unfreeze()
                .map_err(|e| LedgerError::for_account(e, account))
        })
        .await
    }

    /// Lock, apply a status change, persist. `owner_only` restricts the
    /// change, and any stored receipt, to the account owner.
    async fn transition<F>(
        &self,
        command: AccountCommand,
        context: &OperationContext,
        operation: &'static str,
        owner_only: bool,
        change: F,
    ) -> LedgerResult<Account>
    where
        F: FnOnce(&mut Account) -> LedgerResult<()> + Send,
    {
        let result = self
            .apply_transition(command, context, operation, owner_only, change)
            .await;
        if let Err(e) = &result {
            log_rejection(operation, context, e);
        }
        result
    }

    async fn apply_transition<F>(
        &self,
        command: AccountCommand,
        context: &OperationContext,
        operation: &'static str,
        owner_only: bool,
        change: F,
    ) -> LedgerResult<Account>
    where
        F: FnOnce(&mut Account) -> LedgerResult<()> + Send,
    {
        let guard = IdempotencyGuard::maybe(context.idempotency_key, operation, &command)?;

        let mut tx = self.store.begin().await?;
        let mut account =
            lock_existing(&mut *tx, command.account_id, AccountRole::Account).await?;

        if owner_only {
            ensure_owner(&account, context)?;
        }

        if let Some(guard) = &guard {
            if let Some(snapshot) = guard.replay(&mut *tx).await? {
                return Ok(snapshot);
            }
        }

        change(&mut account)?;
        tx.update_account(&account).await?;

        if let Some(guard) = &guard {
            guard.save(&mut *tx, &account).await?;
        }
        commit(tx, operation).await?;

        tracing::info!(
            operation,
            account_id = %account.id(),
            status = %account.status(),
            "Account status changed"
        );

        Ok(account)
    }
}

/// Three ASCII letters, stored uppercase
fn normalize_currency(requested: Option<&str>, default: &str) -> LedgerResult<String> {
    let code = requested
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(default)
        .to_ascii_uppercase();

    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(LedgerError::InvalidRequest(format!(
            "invalid currency code '{}'",
            code
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(None, "USD").unwrap(), "USD");
        assert_eq!(normalize_currency(Some("eur"), "USD").unwrap(), "EUR");
        assert_eq!(normalize_currency(Some("  "), "USD").unwrap(), "USD");
        assert!(normalize_currency(Some("EURO"), "USD").is_err());
        assert!(normalize_currency(Some("U$D"), "USD").is_err());
    }
}
