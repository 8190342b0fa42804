//! User Handler
//!
//! Registration and administrative removal of users.

use std::sync::Arc;

use crate::domain::OperationContext;
use crate::entity::{AccountStatus, NewUser};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::IdempotencyGuard;
use crate::store::LedgerStore;

use super::support::{commit, log_rejection};
use super::{RegisterUserCommand, RegisterUserResult, RemoveUserCommand, RemoveUserResult};

/// Handler for the user registry
pub struct UserHandler {
    store: Arc<dyn LedgerStore>,
}

impl UserHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register a user; username and email must both be unused
    pub async fn register(
        &self,
        command: RegisterUserCommand,
        context: &OperationContext,
    ) -> LedgerResult<RegisterUserResult> {
        let result = self.apply_register(command, context).await;
        if let Err(e) = &result {
            log_rejection("register_user", context, e);
        }
        result
    }

    async fn apply_register(
        &self,
        command: RegisterUserCommand,
        context: &OperationContext,
    ) -> LedgerResult<RegisterUserResult> {
        let new_user = NewUser::new(
            command.username.as_str(),
            command.email.as_str(),
            command.password_hash.as_str(),
        )?;
        let guard = IdempotencyGuard::maybe(context.idempotency_key, "register_user", &command)?;

        let mut tx = self.store.begin().await?;

        if let Some(guard) = &guard {
            if let Some(result) = guard.replay(&mut *tx).await? {
                return Ok(result);
            }
        }

        let user = tx.insert_user(new_user).await?;
        let result = RegisterUserResult {
            user_id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        };

        if let Some(guard) = &guard {
            guard.save(&mut *tx, &result).await?;
        }
        commit(tx, "register_user").await?;

        tracing::info!(
            user_id = %result.user_id,
            username = %result.username,
            "User registered"
        );

        Ok(result)
    }

    /// Deactivate a user and close every account it owns in one unit.
    /// Balances and history are kept.
    pub async fn remove(
        &self,
        command: RemoveUserCommand,
        context: &OperationContext,
    ) -> LedgerResult<RemoveUserResult> {
        let result = self.apply_remove(command, context).await;
        if let Err(e) = &result {
            log_rejection("remove_user", context, e);
        }
        result
    }

    async fn apply_remove(
        &self,
        command: RemoveUserCommand,
        context: &OperationContext,
    ) -> LedgerResult<RemoveUserResult> {
        let guard = IdempotencyGuard::maybe(context.idempotency_key, "remove_user", &command)?;

        let mut tx = self.store.begin().await?;
        let user = tx
            .lock_user(command.user_id)
            .await?
            .ok_or(LedgerError::UserNotFound(command.user_id))?;

        if let Some(guard) = &guard {
            if let Some(result) = guard.replay(&mut *tx).await? {
                return Ok(result);
            }
        }

        if user.active {
            tx.set_user_active(user.id, false).await?;
        }

        let mut closed_accounts = Vec::new();
        for mut account in tx.lock_owner_accounts(user.id).await? {
            if account.status() == AccountStatus::Closed {
                continue;
            }
            account.force_close();
            tx.update_account(&account).await?;
            closed_accounts.push(account.id());
        }

        let result = RemoveUserResult {
            user_id: user.id,
            closed_accounts,
        };

        if let Some(guard) = &guard {
            guard.save(&mut *tx, &result).await?;
        }
        commit(tx, "remove_user").await?;

        tracing::info!(
            user_id = %result.user_id,
            closed_accounts = result.closed_accounts.len(),
            "User removed"
        );

        Ok(result)
    }
}
