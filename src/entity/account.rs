//! Account Entity
//!
//! A balance-holding account. Balance arithmetic is enforced here; persistence
//! and history are the handlers' job.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{AccountId, Amount, Balance, DomainError, UserId};

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[default]
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}

/// Account category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    Savings,
    Checking,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

/// Account
///
/// The stored balance is authoritative. Values of this type handed out by the
/// store are snapshots; mutating one never affects stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account number
    id: AccountId,

    /// Owner user ID
    owner_id: UserId,

    account_type: AccountType,

    balance: Balance,

    /// ISO-4217 style currency code
    currency: String,

    status: AccountStatus,

    created_at: DateTime<Utc>,
}

/// Values for an account the store has not numbered yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub owner_id: UserId,
    pub account_type: AccountType,
    pub balance: Balance,
    pub currency: String,
}

impl NewAccount {
    /// Validate the opening balance; it may be zero but never negative.
    pub fn new(
        owner_id: UserId,
        account_type: AccountType,
        initial_balance: Decimal,
        currency: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let balance = Balance::new(initial_balance)?;
        Ok(Self {
            owner_id,
            account_type,
            balance,
            currency: currency.into(),
        })
    }
}

impl Account {
    /// Rebuild an account from stored state
    pub fn from_db_state(
        id: AccountId,
        owner_id: UserId,
        account_type: AccountType,
        balance: Balance,
        currency: String,
        status: AccountStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            account_type,
            balance,
            currency,
            status,
            created_at,
        }
    }

    /// Materialize a freshly numbered account
    pub fn from_new(id: AccountId, new: NewAccount, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: new.owner_id,
            account_type: new.account_type,
            balance: new.balance,
            currency: new.currency,
            status: AccountStatus::Active,
            created_at,
        }
    }

    // =========================================================================
    // Balance arithmetic
    // =========================================================================

    /// Credit the account. No upper bound beyond decimal overflow.
    pub fn deposit(&mut self, amount: Decimal) -> Result<Balance, DomainError> {
        let amount = Amount::new(amount)?;
        self.balance = self.balance.credit(&amount)?;
        Ok(self.balance)
    }

    /// Debit the account; never lets the balance go below zero.
    pub fn withdraw(&mut self, amount: Decimal) -> Result<Balance, DomainError> {
        let amount = Amount::new(amount)?;

        if !self.balance.is_sufficient_for(&amount) {
            return Err(DomainError::insufficient_funds(
                amount.value(),
                self.balance.value(),
            ));
        }

        self.balance = self.balance.debit(&amount)?;
        Ok(self.balance)
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    /// Close the account permanently. Requires an empty balance.
    pub fn close(&mut self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Closed {
            return Err(DomainError::AccountInactive {
                status: self.status.to_string(),
            });
        }
        if !self.balance.is_zero() {
            return Err(DomainError::NonZeroBalance(self.balance.value()));
        }
        self.status = AccountStatus::Closed;
        Ok(())
    }

    /// Administrative close used when the owner is removed; balance is kept.
    pub(crate) fn force_close(&mut self) {
        self.status = AccountStatus::Closed;
    }

    pub fn freeze(&mut self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Closed {
            return Err(DomainError::AccountInactive {
                status: self.status.to_string(),
            });
        }
        self.status = AccountStatus::Frozen;
        Ok(())
    }

    pub fn unfreeze(&mut self) -> Result<(), DomainError> {
        if self.status == AccountStatus::Closed {
            return Err(DomainError::AccountInactive {
                status: self.status.to_string(),
            });
        }
        self.status = AccountStatus::Active;
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account_with(balance: Decimal) -> Account {
        let new = NewAccount::new(UserId(1), AccountType::Savings, balance, "USD").unwrap();
        Account::from_new(AccountId(1000), new, Utc::now())
    }

    #[test]
    fn test_open_account() {
        let account = account_with(dec!(0));

        assert_eq!(account.id(), AccountId(1000));
        assert_eq!(account.owner_id(), UserId(1));
        assert_eq!(account.account_type(), AccountType::Savings);
        assert_eq!(account.balance().value(), Decimal::ZERO);
        assert!(account.is_active());
    }

    #[test]
    fn test_negative_opening_balance_rejected() {
        let result = NewAccount::new(UserId(1), AccountType::Checking, dec!(-1), "USD");
        assert!(matches!(result, Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_deposit() {
        let mut account = account_with(dec!(1000));
        let balance = account.deposit(dec!(500)).unwrap();
        assert_eq!(balance.value(), dec!(1500));
        assert_eq!(account.balance().value(), dec!(1500));
    }

    #[test]
    fn test_deposit_rejects_non_positive() {
        let mut account = account_with(dec!(10));
        assert!(matches!(account.deposit(dec!(0)), Err(DomainError::InvalidAmount(_))));
        assert!(matches!(account.deposit(dec!(-5)), Err(DomainError::InvalidAmount(_))));
        assert_eq!(account.balance().value(), dec!(10));
    }

    #[test]
    fn test_withdraw() {
        let mut account = account_with(dec!(100));
        let balance = account.withdraw(dec!(30)).unwrap();
        assert_eq!(balance.value(), dec!(70));
    }

    #[test]
    fn test_withdraw_exact_balance() {
        let mut account = account_with(dec!(100));
        assert!(account.withdraw(dec!(100)).unwrap().is_zero());
    }

    #[test]
    fn test_withdraw_insufficient_funds() {
        let mut account = account_with(dec!(1000));
        let result = account.withdraw(dec!(1500));

        assert_eq!(
            result,
            Err(DomainError::insufficient_funds(dec!(1500), dec!(1000)))
        );
        assert_eq!(account.balance().value(), dec!(1000));
    }

    #[test]
    fn test_close_requires_zero_balance() {
        let mut account = account_with(dec!(5));
        assert!(matches!(account.close(), Err(DomainError::NonZeroBalance(_))));

        account.withdraw(dec!(5)).unwrap();
        account.close().unwrap();
        assert_eq!(account.status(), AccountStatus::Closed);
        assert!(matches!(account.close(), Err(DomainError::AccountInactive { .. })));
    }

    #[test]
    fn test_freeze_and_unfreeze() {
        let mut account = account_with(dec!(5));
        account.freeze().unwrap();
        assert_eq!(account.status(), AccountStatus::Frozen);
        assert!(!account.is_active());

        account.unfreeze().unwrap();
        assert!(account.is_active());
    }

    #[test]
    fn test_closed_account_cannot_be_unfrozen() {
        let mut account = account_with(dec!(0));
        account.close().unwrap();
        assert!(account.unfreeze().is_err());
        assert!(account.freeze().is_err());
    }

    #[test]
    fn test_status_and_type_parse() {
        assert_eq!("frozen".parse::<AccountStatus>(), Ok(AccountStatus::Frozen));
        assert_eq!("Checking".parse::<AccountType>(), Ok(AccountType::Checking));
        assert!("brokerage".parse::<AccountType>().is_err());
    }
}
