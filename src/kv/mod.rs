// =============================================================================
// KV Store
// =============================================================================
//
// Namespaced durable store contract (spec §4.1). Every key is prefixed with
// the configured namespace by the caller via `namespaced()`; implementations
// operate on the already-prefixed key. Two implementations: `memory` (used
// for paper/test mode and as the backing the hot cache falls through to in
// tests) and `redis_store` (production, grounded on the teacher pack's
// `db/redis.rs` connection-manager pattern).

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

use crate::error::EngineError;

/// Build a namespaced key: `{ns}:{rest}`.
pub fn namespaced(ns: &str, rest: &str) -> String {
    format!("{ns}:{rest}")
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError>;
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), EngineError>;
    async fn del(&self, key: &str) -> Result<(), EngineError>;
    async fn exists(&self, key: &str) -> Result<bool, EngineError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), EngineError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, EngineError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, EngineError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), EngineError>;
    async fn srem(&self, key: &str, member: &str) -> Result<(), EngineError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, EngineError>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, EngineError>;

    async fn lpush(&self, key: &str, value: &str) -> Result<(), EngineError>;
    async fn ltrim(&self, key: &str, max_len: usize) -> Result<(), EngineError>;
    async fn lrange(&self, key: &str, count: usize) -> Result<Vec<String>, EngineError>;

    /// Set `key` to `owner_token` with `ttl_secs`, but only if absent.
    /// Returns `true` if the lock was acquired.
    async fn setnx(&self, key: &str, owner_token: &str, ttl_secs: u64) -> Result<bool, EngineError>;

    /// Release a `setnx` lock: deletes `key` only if its current value is
    /// `owner_token` (compare-and-delete).
    async fn release(&self, key: &str, owner_token: &str) -> Result<(), EngineError>;

    /// Returns `true` at most once per `interval_secs`, storing `last_time`
    /// with TTL = interval.
    async fn throttle(&self, name: &str, interval_secs: u64) -> Result<bool, EngineError>;

    /// Connectivity check used at startup; a failing ping is always
    /// `StoreUnavailable`, never masked as success.
    async fn ping(&self) -> Result<(), EngineError>;
}
