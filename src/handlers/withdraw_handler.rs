//! Withdraw Handler
//!
//! Debits an account on behalf of its owner. The balance may reach zero but
//! never go below it.

use std::sync::Arc;

use crate::domain::OperationContext;
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::idempotency::IdempotencyGuard;
use crate::recorder::{RecordRequest, TransactionRecorder};
use crate::store::LedgerStore;

use super::support::{
    commit, ensure_active, ensure_owner, lock_existing, log_rejection, parse_amount,
};
use super::{MovementReceipt, WithdrawCommand};

const OPERATION: &str = "withdraw";

/// Handler for withdrawals
pub struct WithdrawHandler {
    store: Arc<dyn LedgerStore>,
}

impl WithdrawHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the withdraw command; `context.request_user_id` must own the account
    pub async fn execute(
        &self,
        command: WithdrawCommand,
        context: &OperationContext,
    ) -> LedgerResult<MovementReceipt> {
        let result = self.apply(command, context).await;
        if let Err(e) = &result {
            log_rejection(OPERATION, context, e);
        }
        result
    }

    async fn apply(
        &self,
        command: WithdrawCommand,
        context: &OperationContext,
    ) -> LedgerResult<MovementReceipt> {
        let command = command.normalized();
        let guard = IdempotencyGuard::maybe(context.idempotency_key, OPERATION, &command)?;

        let mut tx = self.store.begin().await?;
        let mut account =
            lock_existing(&mut *tx, command.account_id, AccountRole::Account).await?;

        // Only the owner may see a stored receipt
        ensure_owner(&account, context)?;

        if let Some(guard) = &guard {
            if let Some(receipt) = guard.replay(&mut *tx).await? {
                return Ok(receipt);
            }
        }

        ensure_active(&account)?;
        let amount = parse_amount(command.amount)?;

        let new_balance = account
            .withdraw(amount.value())
            .map_err(|e| LedgerError::for_account(e, &account))?;
        tx.update_account(&account).await?;

        let record = TransactionRecorder::record(
            &mut *tx,
            RecordRequest::withdrawal(account.id(), amount, new_balance)
                .with_description(command.description),
        )
        .await?;

        let receipt = MovementReceipt {
            account_id: account.id(),
            new_balance: new_balance.value(),
            transaction_id: record.id,
        };

        if let Some(guard) = &guard {
            guard.save(&mut *tx, &receipt).await?;
        }
        commit(tx, OPERATION).await?;

        tracing::info!(
            account_id = %receipt.account_id,
            amount = %amount,
            new_balance = %receipt.new_balance,
            transaction_id = %receipt.transaction_id,
            "Withdrawal completed"
        );

        Ok(receipt)
    }
}
