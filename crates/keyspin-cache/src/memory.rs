use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{CacheError, CacheResult, Counter};

const SHARD_COUNT: usize = 16;
const SCAVENGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

type Shard = RwLock<HashMap<String, Entry>>;

/// In-process counter store: key-hash sharded map with per-key TTLs,
/// swept by a background scavenger once a minute.
pub struct MemoryCache {
    shards: Arc<Vec<Shard>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Must be called from within a tokio runtime (the scavenger is a
    /// spawned task).
    pub fn new() -> Self {
        let shards: Arc<Vec<Shard>> = Arc::new(
            (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        );

        let sweep = Arc::clone(&shards);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCAVENGE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                for shard in sweep.iter() {
                    let mut guard = shard.write().expect("cache shard poisoned");
                    guard.retain(|_, entry| !entry.is_expired(now));
                }
            }
        });

        Self { shards }
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }
}

#[async_trait]
impl Counter for MemoryCache {
    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut guard = self.shard(key).write().expect("cache shard poisoned");
        let now = Instant::now();

        let current = match guard.get(key) {
            Some(entry) if !entry.is_expired(now) => entry
                .value
                .as_int()
                .ok_or_else(|| CacheError::NotAnInteger {
                    key: key.to_string(),
                })?,
            _ => 0,
        };

        let next = current + 1;
        // Counter entries never expire; a floating modulus needs the
        // full sequence, not a window of it.
        guard.insert(
            key.to_string(),
            Entry {
                value: Value::Int(next),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let guard = self.shard(key).read().expect("cache shard poisoned");
        let now = Instant::now();
        Ok(guard.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                return None;
            }
            Some(match &entry.value {
                Value::Int(n) => n.to_string(),
                Value::Text(s) => s.clone(),
            })
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut guard = self.shard(key).write().expect("cache shard poisoned");
        guard.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> CacheResult<i64> {
        let mut removed = 0;
        for key in keys {
            let mut guard = self.shard(key).write().expect("cache shard poisoned");
            if guard.remove(*key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
