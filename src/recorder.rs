//! Transaction Recorder
//!
//! Builds immutable transaction records and appends them through an open
//! store transaction. Ids come from the store's sequence; the recorder never
//! numbers anything itself.

use uuid::Uuid;

use crate::domain::{AccountId, Amount, Balance};
use crate::entity::{NewTransaction, Transaction, TransactionKind};
use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerTx;

/// Longest description the schema stores
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// A record waiting to be validated and appended
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRequest {
    pub kind: TransactionKind,
    pub amount: Amount,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub balance_after: Balance,
    pub transfer_id: Option<Uuid>,
    pub description: Option<String>,
}

impl RecordRequest {
    pub fn deposit(account_id: AccountId, amount: Amount, balance_after: Balance) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            amount,
            from_account_id: None,
            to_account_id: Some(account_id),
            balance_after,
            transfer_id: None,
            description: None,
        }
    }

    pub fn withdrawal(account_id: AccountId, amount: Amount, balance_after: Balance) -> Self {
        Self {
            kind: TransactionKind::Withdrawal,
            amount,
            from_account_id: Some(account_id),
            to_account_id: None,
            balance_after,
            transfer_id: None,
            description: None,
        }
    }

    /// Debit leg; `balance_after` is the source's balance
    pub fn transfer_out(
        from: AccountId,
        to: AccountId,
        amount: Amount,
        balance_after: Balance,
        transfer_id: Uuid,
    ) -> Self {
        Self {
            kind: TransactionKind::TransferOut,
            amount,
            from_account_id: Some(from),
            to_account_id: Some(to),
            balance_after,
            transfer_id: Some(transfer_id),
            description: None,
        }
    }

    /// Credit leg; `balance_after` is the destination's balance
    pub fn transfer_in(
        from: AccountId,
        to: AccountId,
        amount: Amount,
        balance_after: Balance,
        transfer_id: Uuid,
    ) -> Self {
        Self {
            kind: TransactionKind::TransferIn,
            amount,
            from_account_id: Some(from),
            to_account_id: Some(to),
            balance_after,
            transfer_id: Some(transfer_id),
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

pub struct TransactionRecorder;

impl TransactionRecorder {
    /// Validate a request and turn it into an unnumbered record
    pub fn prepare(request: RecordRequest) -> LedgerResult<NewTransaction> {
        let account_id = match request.kind {
            TransactionKind::Deposit => request.to_account_id,
            TransactionKind::Withdrawal => request.from_account_id,
            TransactionKind::TransferOut => request.from_account_id,
            TransactionKind::TransferIn => request.to_account_id,
        }
        .ok_or_else(|| {
            LedgerError::InvalidRequest(format!(
                "{} record needs an account reference",
                request.kind
            ))
        })?;

        if request.kind.is_transfer_leg()
            && (request.from_account_id.is_none() || request.to_account_id.is_none())
        {
            return Err(LedgerError::InvalidRequest(
                "transfer records need both accounts".to_string(),
            ));
        }

        let description = normalize_description(
            request.description.as_deref(),
            request.kind,
            request.from_account_id,
            request.to_account_id,
        );

        Ok(NewTransaction {
            kind: request.kind,
            amount: request.amount,
            account_id,
            from_account_id: request.from_account_id,
            to_account_id: request.to_account_id,
            balance_after: request.balance_after,
            transfer_id: request.transfer_id,
            description,
        })
    }

    /// Append a record through `tx`
    pub async fn record(tx: &mut dyn LedgerTx, request: RecordRequest) -> LedgerResult<Transaction> {
        let new = Self::prepare(request)?;
        let record = tx.insert_transaction(new).await?;

        tracing::debug!(
            transaction_id = %record.id,
            kind = %record.kind,
            account_id = %record.account_id,
            amount = %record.amount,
            "Transaction recorded"
        );
        Ok(record)
    }
}

fn normalize_description(
    description: Option<&str>,
    kind: TransactionKind,
    from: Option<AccountId>,
    to: Option<AccountId>,
) -> String {
    let trimmed = description.map(str::trim).unwrap_or_default();
    if !trimmed.is_empty() {
        return trimmed.chars().take(MAX_DESCRIPTION_LEN).collect();
    }

    match (kind, from, to) {
        (TransactionKind::TransferOut, _, Some(to)) => format!("Transfer to account {}", to),
        (TransactionKind::TransferIn, Some(from), _) => format!("Transfer from account {}", from),
        (TransactionKind::Withdrawal, _, _) => "Withdrawal".to_string(),
        _ => "Deposit".to_string(),
    }
}
