//! Idempotency records
//!
//! A record ties a caller-supplied key to the fingerprint of the request that
//! first used it and the receipt that request produced. Records are looked up
//! and saved inside the same store transaction as the mutation they guard.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::{LedgerTx, StoreError};

/// Stored idempotency key information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: Uuid,
    pub operation: String,
    /// Hex SHA-256 of the operation name and the request body
    pub request_hash: String,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn matches(&self, operation: &str, request_hash: &str) -> bool {
        self.operation == operation && self.request_hash == request_hash
    }

    /// Decode the stored receipt
    pub fn receipt<R: DeserializeOwned>(&self) -> Result<R, serde_json::Error> {
        serde_json::from_value(self.response_body.clone())
    }
}

/// SHA-256 over `operation` and the JSON encoding of `request`
pub fn request_fingerprint<C: Serialize>(
    operation: &str,
    request: &C,
) -> Result<String, serde_json::Error> {
    let body = serde_json::to_vec(request)?;

    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(&body);
    Ok(hex::encode(hasher.finalize()))
}

// =========================================================================
// IdempotencyGuard
// =========================================================================

/// Per-call helper: replays a stored receipt or saves a fresh one.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    key: Uuid,
    operation: &'static str,
    request_hash: String,
}

impl IdempotencyGuard {
    pub fn new<C: Serialize>(key: Uuid, operation: &'static str, request: &C) -> LedgerResult<Self> {
        let request_hash = request_fingerprint(operation, request)
            .map_err(|e| LedgerError::Storage(StoreError::Serialization(e)))?;

        Ok(Self {
            key,
            operation,
            request_hash,
        })
    }

    /// Build a guard only when the caller supplied a key
    pub fn maybe<C: Serialize>(
        key: Option<Uuid>,
        operation: &'static str,
        request: &C,
    ) -> LedgerResult<Option<Self>> {
        key.map(|k| Self::new(k, operation, request)).transpose()
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    /// Look the key up inside `tx`.
    ///
    /// Returns the stored receipt when the same request already committed,
    /// `IdempotencyConflict` when the key was used for a different request,
    /// and `None` when the key is new.
    pub async fn replay<R: DeserializeOwned>(&self, tx: &mut dyn LedgerTx) -> LedgerResult<Option<R>> {
        let Some(existing) = tx.find_idempotency(self.key).await? else {
            return Ok(None);
        };

        if !existing.matches(self.operation, &self.request_hash) {
            tracing::warn!(
                idempotency_key = %self.key,
                operation = self.operation,
                stored_operation = %existing.operation,
                "Idempotency key reused for a different request"
            );
            return Err(LedgerError::IdempotencyConflict(self.key));
        }

        let receipt = existing
            .receipt()
            .map_err(|e| LedgerError::Storage(StoreError::Serialization(e)))?;

        tracing::info!(
            idempotency_key = %self.key,
            operation = self.operation,
            "Replaying stored receipt"
        );
        Ok(Some(receipt))
    }

    /// Save `receipt` under the key in the same transaction as the mutation
    pub async fn save<R: Serialize>(&self, tx: &mut dyn LedgerTx, receipt: &R) -> LedgerResult<()> {
        let response_body = serde_json::to_value(receipt)
            .map_err(|e| LedgerError::Storage(StoreError::Serialization(e)))?;

        tx.save_idempotency(IdempotencyRecord {
            key: self.key,
            operation: self.operation.to_string(),
            request_hash: self.request_hash.clone(),
            response_body,
            created_at: Utc::now(),
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_stable() {
        let body = json!({"account_id": 1, "amount": "10.00"});
        let a = request_fingerprint("deposit", &body).unwrap();
        let b = request_fingerprint("deposit", &body).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_depends_on_operation_and_body() {
        let body = json!({"account_id": 1, "amount": "10.00"});
        let deposit = request_fingerprint("deposit", &body).unwrap();
        let withdraw = request_fingerprint("withdraw", &body).unwrap();
        let other = request_fingerprint("deposit", &json!({"account_id": 1, "amount": "10.01"})).unwrap();

        assert_ne!(deposit, withdraw);
        assert_ne!(deposit, other);
    }

    #[test]
    fn test_record_matches() {
        let hash = request_fingerprint("transfer", &json!({"x": 1})).unwrap();
        let record = IdempotencyRecord {
            key: Uuid::new_v4(),
            operation: "transfer".to_string(),
            request_hash: hash.clone(),
            response_body: json!({"ok": true}),
            created_at: Utc::now(),
        };

        assert!(record.matches("transfer", &hash));
        assert!(!record.matches("deposit", &hash));
        assert!(!record.matches("transfer", "deadbeef"));
    }
}
