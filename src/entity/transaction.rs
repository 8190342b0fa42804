//! Transaction records
//!
//! Immutable, append-only entries correlated to balance changes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{AccountId, Amount, Balance, TransactionId};

/// Transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::TransferIn => "transfer_in",
        }
    }

    /// Whether the record increased its account's balance
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionKind::Deposit | TransactionKind::TransferIn)
    }

    /// Whether the record belongs to a transfer pair
    pub fn is_transfer_leg(&self) -> bool {
        matches!(self, TransactionKind::TransferOut | TransactionKind::TransferIn)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer_out" => Ok(TransactionKind::TransferOut),
            "transfer_in" => Ok(TransactionKind::TransferIn),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

/// Transaction status. The engine only ever writes `Completed`; `Failed` exists
/// so externally written rows still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A committed transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    /// Account whose balance this record moved
    pub account_id: AccountId,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    /// Balance of `account_id` right after this record
    pub balance_after: Decimal,
    /// Shared by both legs of a transfer
    pub transfer_id: Option<Uuid>,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect on `account_id`'s balance
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

/// A validated record waiting for its store-assigned id
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Amount,
    pub account_id: AccountId,
    pub from_account_id: Option<AccountId>,
    pub to_account_id: Option<AccountId>,
    pub balance_after: Balance,
    pub transfer_id: Option<Uuid>,
    pub description: String,
}

impl NewTransaction {
    /// Every account id this record points at, for referential checks
    pub fn referenced_accounts(&self) -> Vec<AccountId> {
        let mut ids = vec![self.account_id];
        ids.extend(self.from_account_id);
        ids.extend(self.to_account_id);
        ids.sort();
        ids.dedup();
        ids
    }

    /// Materialize the record once the store has numbered it
    pub fn into_transaction(self, id: TransactionId, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            kind: self.kind,
            amount: self.amount.value(),
            account_id: self.account_id,
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            balance_after: self.balance_after.value(),
            transfer_id: self.transfer_id,
            description: self.description,
            status: TransactionStatus::Completed,
            created_at,
        }
    }
}
