//! Deposit Handler
//!
//! Credits a single account and records a `deposit` entry in one unit.

use std::sync::Arc;

use crate::domain::OperationContext;
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::idempotency::IdempotencyGuard;
use crate::recorder::{RecordRequest, TransactionRecorder};
use crate::store::LedgerStore;

use super::support::{commit, ensure_active, lock_existing, log_rejection, parse_amount};
use super::{DepositCommand, MovementReceipt};

const OPERATION: &str = "deposit";

/// Handler for deposits
pub struct DepositHandler {
    store: Arc<dyn LedgerStore>,
}

impl DepositHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the deposit command
    pub async fn execute(
        &self,
        command: DepositCommand,
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
        command: DepositCommand,
        context: &OperationContext,
    ) -> LedgerResult<MovementReceipt> {
        let command = command.normalized();
        let guard = IdempotencyGuard::maybe(context.idempotency_key, OPERATION, &command)?;

        let mut tx = self.store.begin().await?;
        let mut account =
            lock_existing(&mut *tx, command.account_id, AccountRole::Account).await?;

        if let Some(guard) = &guard {
            if let Some(receipt) = guard.replay(&mut *tx).await? {
                return Ok(receipt);
            }
        }

        ensure_active(&account)?;
        let amount = parse_amount(command.amount)?;

        let new_balance = account
            .deposit(amount.value())
            .map_err(|e| LedgerError::for_account(e, &account))?;
        tx.update_account(&account).await?;

        let record = TransactionRecorder::record(
            &mut *tx,
            RecordRequest::deposit(account.id(), amount, new_balance)
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
            "Deposit completed"
        );

        Ok(receipt)
    }
}
