//! Backing store adapter.
//!
//! The rest of the crate talks to its key-value backend exclusively through
//! [`KeyValueStore`]: string get/set, existence, delete, list push/range/
//! trim/length, set add/remove/membership, atomic increment, expiry/TTL, and
//! one batched counter operation ([`KeyValueStore::incr_with_ttl`]) that
//! pipelines INCR + TTL into a single round trip.
//!
//! Two implementations share identical observable semantics, including TTL
//! expiry: [`RedisStore`] against a networked Redis, and [`MemoryStore`], an
//! in-process substitute used by tests and standalone runs. The
//! implementation is chosen once at startup from configuration and injected
//! into every component; nothing in this crate reaches for an ambient store.

mod memory;
pub mod keys;
mod redis_store;

use std::future::Future;

use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

// ============================================================================
// Error Types
// ============================================================================

/// Failures raised by a backing-store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the Redis driver (network, protocol, server-side).
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store cannot be reached or refused the operation.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// An operation hit a key holding the wrong data type
    /// (e.g. INCR on a list).
    #[error("wrong value type at key '{0}'")]
    WrongType(String),

    /// A stored record could not be decoded.
    #[error("corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Store Interface
// ============================================================================

/// Key-value primitives required by the registry, ledger, and rate limiter.
///
/// List indices follow Redis conventions: zero-based, negative counts from
/// the tail (`-1` is the last element), and ranges are inclusive on both
/// ends. [`KeyValueStore::ttl`] returns `-2` for a missing key and `-1` for a
/// key with no expiry, matching the Redis TTL contract.
///
/// Implementations must be cheaply cloneable; each component holds its own
/// handle (a `ConnectionManager` clone for Redis, an `Arc` for the in-memory
/// substitute).
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;
    fn set(&self, key: &str, value: &str) -> impl Future<Output = StoreResult<()>> + Send;
    fn exists(&self, key: &str) -> impl Future<Output = StoreResult<bool>> + Send;
    fn del(&self, keys: &[&str]) -> impl Future<Output = StoreResult<()>> + Send;

    fn lpush(&self, key: &str, value: &str) -> impl Future<Output = StoreResult<()>> + Send;
    fn lrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> impl Future<Output = StoreResult<Vec<String>>> + Send;
    fn ltrim(&self, key: &str, start: i64, stop: i64)
        -> impl Future<Output = StoreResult<()>> + Send;
    fn llen(&self, key: &str) -> impl Future<Output = StoreResult<usize>> + Send;

    fn sadd(&self, key: &str, member: &str) -> impl Future<Output = StoreResult<()>> + Send;
    fn srem(&self, key: &str, members: &[String])
        -> impl Future<Output = StoreResult<()>> + Send;
    fn sismember(&self, key: &str, member: &str)
        -> impl Future<Output = StoreResult<bool>> + Send;
    fn smembers(&self, key: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    fn incr(&self, key: &str) -> impl Future<Output = StoreResult<i64>> + Send;
    fn expire(&self, key: &str, seconds: i64) -> impl Future<Output = StoreResult<()>> + Send;
    fn ttl(&self, key: &str) -> impl Future<Output = StoreResult<i64>> + Send;

    /// Increment a counter and read its remaining TTL in one batched
    /// (pipelined) round trip. Returns `(count, ttl_seconds)` with TTL
    /// following the same `-2` / `-1` convention as [`KeyValueStore::ttl`].
    fn incr_with_ttl(&self, key: &str) -> impl Future<Output = StoreResult<(i64, i64)>> + Send;
}
