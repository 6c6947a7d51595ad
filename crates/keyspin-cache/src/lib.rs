//! The counter/cache capability behind key rotation.
//!
//! Any store that can atomically increment an int64 satisfies
//! [`Counter`]; the in-process implementation is the correctness
//! reference, the Redis one exists for multi-process deployments.

use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCounter;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("counter value for {key} is not an integer")]
    NotAnInteger { key: String },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Atomic counter plus the small KV surface the proxy needs.
#[async_trait]
pub trait Counter: Send + Sync {
    /// Atomic increment; returns the post-increment value. Missing and
    /// expired keys restart at 1.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `ttl = None` stores without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Returns how many of `keys` existed and were removed.
    async fn del(&self, keys: &[&str]) -> CacheResult<i64>;

    async fn ping(&self) -> CacheResult<()>;
}
