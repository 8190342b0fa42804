//! Idempotency module
//!
//! Prevents duplicate request processing using idempotency keys.

mod record;

pub use record::{request_fingerprint, IdempotencyGuard, IdempotencyRecord};
