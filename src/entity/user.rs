//! User entity
//!
//! Account owners. Credentials arrive already hashed from the auth layer;
//! this crate never sees or stores plaintext passwords.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::UserId;
use crate::error::LedgerError;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const EMAIL_MAX: usize = 255;

/// A registered user
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("active", &self.active)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Registration data, validated
#[derive(Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    /// Validate registration fields. Emails are stored lowercased so the
    /// uniqueness check is case-insensitive.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        let username = username.into().trim().to_string();
        let email = email.into().trim().to_ascii_lowercase();
        let password_hash = password_hash.into();

        let len = username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
            return Err(LedgerError::InvalidRequest(format!(
                "username must be {}-{} characters",
                USERNAME_MIN, USERNAME_MAX
            )));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(LedgerError::InvalidRequest(
                "username may only contain letters, digits, '_', '.' and '-'".to_string(),
            ));
        }

        if !is_plausible_email(&email) {
            return Err(LedgerError::InvalidRequest("invalid email address".to_string()));
        }

        if password_hash.trim().is_empty() {
            return Err(LedgerError::InvalidRequest(
                "password hash is required".to_string(),
            ));
        }

        Ok(Self {
            username,
            email,
            password_hash,
        })
    }

    pub fn into_user(self, id: UserId, created_at: DateTime<Utc>) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            active: true,
            created_at,
        }
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.len() > EMAIL_MAX || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
