//! Shared handler steps: row loading, guard checks, commit and outcome logging.

use rust_decimal::Decimal;

use crate::domain::{AccountId, Amount, DomainError, OperationContext};
use crate::entity::Account;
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::store::LedgerTx;

/// Lock an account row, failing with `AccountNotFound` for `role`
pub(crate) async fn lock_existing(
    tx: &mut dyn LedgerTx,
    account_id: AccountId,
    role: AccountRole,
) -> LedgerResult<Account> {
    tx.lock_account(account_id)
        .await?
        .ok_or(LedgerError::AccountNotFound { account_id, role })
}

/// Lock two accounts in ascending id order and hand them back as (a, b)
pub(crate) async fn lock_pair(
    tx: &mut dyn LedgerTx,
    a: AccountId,
    b: AccountId,
) -> LedgerResult<(Option<Account>, Option<Account>)> {
    if a <= b {
        let first = tx.lock_account(a).await?;
        let second = tx.lock_account(b).await?;
        Ok((first, second))
    } else {
        let first = tx.lock_account(b).await?;
        let second = tx.lock_account(a).await?;
        Ok((second, first))
    }
}

pub(crate) fn ensure_active(account: &Account) -> LedgerResult<()> {
    if account.is_active() {
        Ok(())
    } else {
        Err(LedgerError::AccountInactive {
            account_id: account.id(),
            status: account.status(),
        })
    }
}

/// The requesting user must be present and own the account
pub(crate) fn ensure_owner(account: &Account, context: &OperationContext) -> LedgerResult<()> {
    match context.request_user_id {
        Some(user_id) if account.is_owned_by(user_id) => Ok(()),
        _ => Err(LedgerError::Unauthorized {
            account_id: account.id(),
        }),
    }
}

pub(crate) fn parse_amount(value: Decimal) -> LedgerResult<Amount> {
    Amount::new(value).map_err(|e| DomainError::from(e).into())
}

/// Commit, logging storage failures with the operation name
pub(crate) async fn commit(tx: Box<dyn LedgerTx>, operation: &'static str) -> LedgerResult<()> {
    tx.commit().await.map_err(|e| {
        tracing::error!(operation, error = %e, "Commit failed, unit rolled back");
        LedgerError::from(e)
    })
}

/// Log a rejected operation at a level matching its cause
pub(crate) fn log_rejection(operation: &'static str, context: &OperationContext, err: &LedgerError) {
    if err.is_client_error() {
        tracing::warn!(
            operation,
            error_code = err.error_code(),
            correlation_id = ?context.correlation_id,
            "Operation rejected: {}",
            err
        );
    } else {
        tracing::error!(
            operation,
            error_code = err.error_code(),
            correlation_id = ?context.correlation_id,
            error = ?err,
            "Operation failed"
        );
    }
}
