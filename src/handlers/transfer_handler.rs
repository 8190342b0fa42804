//! Transfer Handler
//!
//! Moves funds between two accounts with full validation. Both balances and
//! both transaction legs commit together or not at all.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::{AccountRole, LedgerError, LedgerResult};
use crate::idempotency::IdempotencyGuard;
use crate::recorder::{RecordRequest, TransactionRecorder};
use crate::store::LedgerStore;

use super::support::{commit, ensure_active, ensure_owner, lock_pair, log_rejection, parse_amount};
use super::{TransferCommand, TransferReceipt};

const OPERATION: &str = "transfer";

/// Handler for account-to-account transfers
pub struct TransferHandler {
    store: Arc<dyn LedgerStore>,
}

impl TransferHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute the transfer command
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> LedgerResult<TransferReceipt> {
        let result = self.apply(command, context).await;
        if let Err(e) = &result {
            log_rejection(OPERATION, context, e);
        }
        result
    }

    async fn apply(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> LedgerResult<TransferReceipt> {
        let command = command.normalized();
        let from_id = command.from_account_id;
        let to_id = command.to_account_id;

        // Checked before anything else, including the amount
        if from_id == to_id {
            return Err(LedgerError::SameAccountTransfer);
        }
        let amount = parse_amount(command.amount)?;

        let guard = IdempotencyGuard::maybe(context.idempotency_key, OPERATION, &command)?;

        let mut tx = self.store.begin().await?;
        let (from, to) = lock_pair(&mut *tx, from_id, to_id).await?;

        let mut from = from.ok_or(LedgerError::AccountNotFound {
            account_id: from_id,
            role: AccountRole::Source,
        })?;
        let mut to = to.ok_or(LedgerError::AccountNotFound {
            account_id: to_id,
            role: AccountRole::Destination,
        })?;

        // Only the source owner may see a stored receipt
        ensure_owner(&from, context)?;

        if let Some(guard) = &guard {
            if let Some(receipt) = guard.replay(&mut *tx).await? {
                return Ok(receipt);
            }
        }

        ensure_active(&from)?;
        ensure_active(&to)?;

        let new_from_balance = from
            .withdraw(amount.value())
            .map_err(|e| LedgerError::for_account(e, &from))?;
        let new_to_balance = to
            .deposit(amount.value())
            .map_err(|e| LedgerError::for_account(e, &to))?;

        tx.update_account(&from).await?;
        tx.update_account(&to).await?;

        let transfer_id = Uuid::new_v4();
        let debit = TransactionRecorder::record(
            &mut *tx,
            RecordRequest::transfer_out(from_id, to_id, amount, new_from_balance, transfer_id)
                .with_description(command.description.clone()),
        )
        .await?;
        let credit = TransactionRecorder::record(
            &mut *tx,
            RecordRequest::transfer_in(from_id, to_id, amount, new_to_balance, transfer_id)
                .with_description(command.description),
        )
        .await?;

        let receipt = TransferReceipt {
            transfer_id,
            from_account_id: from_id,
            to_account_id: to_id,
            amount: amount.value(),
            new_from_balance: new_from_balance.value(),
            debit_transaction_id: debit.id,
            credit_transaction_id: credit.id,
        };

        if let Some(guard) = &guard {
            guard.save(&mut *tx, &receipt).await?;
        }
        commit(tx, OPERATION).await?;

        tracing::info!(
            %transfer_id,
            from_account_id = %from_id,
            to_account_id = %to_id,
            amount = %amount,
            "Transfer completed"
        );

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountId;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_command() {
        let cmd = TransferCommand::new(AccountId(1), AccountId(2), dec!(100.00))
            .with_description("Test payment");

        assert_eq!(cmd.amount, dec!(100.00));
        assert_eq!(cmd.description, Some("Test payment".to_string()));
    }
}
