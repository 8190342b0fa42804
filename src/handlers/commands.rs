//! Command definitions
//!
//! Commands represent intentions to change the system state. Results are the
//! receipts handed back to callers and stored for idempotent replay.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::{AccountId, TransactionId, UserId};
use crate::entity::{Account, AccountType};

// =========================================================================
// Funds movement
// =========================================================================

/// Command to credit an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl DepositCommand {
    pub fn new(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            description: None,
        }
    }

    /// Same request with the amount in canonical form, so `50` and `50.00`
    /// fingerprint alike
    pub fn normalized(mut self) -> Self {
        self.amount = self.amount.normalize();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Command to debit an account; the requesting user comes from the context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl WithdrawCommand {
    pub fn new(account_id: AccountId, amount: Decimal) -> Self {
        Self {
            account_id,
            amount,
            description: None,
        }
    }

    /// See [`DepositCommand::normalized`]
    pub fn normalized(mut self) -> Self {
        self.amount = self.amount.normalize();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Command to move funds between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(from_account_id: AccountId, to_account_id: AccountId, amount: Decimal) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
            description: None,
        }
    }

    /// See [`DepositCommand::normalized`]
    pub fn normalized(mut self) -> Self {
        self.amount = self.amount.normalize();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of a deposit or withdrawal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementReceipt {
    pub account_id: AccountId,
    pub new_balance: Decimal,
    pub transaction_id: TransactionId,
}

/// Result of a successful transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub new_from_balance: Decimal,
    pub debit_transaction_id: TransactionId,
    pub credit_transaction_id: TransactionId,
}

// =========================================================================
// Account lifecycle
// =========================================================================

/// Command to open an account for an existing user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountCommand {
    pub owner_id: UserId,
    pub account_type: AccountType,
    pub initial_balance: Decimal,
    /// Falls back to the configured default currency
    pub currency: Option<String>,
}

impl OpenAccountCommand {
    pub fn new(owner_id: UserId, account_type: AccountType, initial_balance: Decimal) -> Self {
        Self {
            owner_id,
            account_type,
            initial_balance,
            currency: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn normalized(mut self) -> Self {
        self.initial_balance = self.initial_balance.normalize();
        self
    }
}

/// Result of opening an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAccountResult {
    pub account: Account,
    /// Set when a positive opening balance was recorded
    pub initial_transaction_id: Option<TransactionId>,
}

/// Command addressing a single account (close, freeze, unfreeze)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCommand {
    pub account_id: AccountId,
}

impl AccountCommand {
    pub fn new(account_id: AccountId) -> Self {
        Self { account_id }
    }
}

// =========================================================================
// User registry
// =========================================================================

/// Command to register a user. The password arrives already hashed.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterUserCommand {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl RegisterUserCommand {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
        }
    }
}

impl fmt::Debug for RegisterUserCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterUserCommand")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterUserResult {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Command to deactivate a user and close everything it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveUserCommand {
    pub user_id: UserId,
}

impl RemoveUserCommand {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Result of removing a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveUserResult {
    pub user_id: UserId,
    pub closed_accounts: Vec<AccountId>,
}
